use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::registry::RoomRegistry;

/// Drive one authenticated live-update connection until the client goes
/// away. Authorization already happened at the upgrade layer; this loop
/// only relays room events outward. Clients send nothing the server acts
/// on — liveness pings are answered by the protocol layer and everything
/// else is ignored.
pub async fn serve(socket: WebSocket, registry: RoomRegistry, quest_id: Uuid, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let (conn_id, mut events) = registry.subscribe(quest_id, user_id).await;
    info!("{} watching quest {}", user_id, quest_id);

    // Forward room events to the socket. The registry never touches the
    // socket directly, so a slow client only ever backs up its own queue.
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to encode room event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Drain the client side purely to notice the disconnect.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unsubscribe(quest_id, user_id, conn_id).await;
    info!("{} stopped watching quest {}", user_id, quest_id);
}

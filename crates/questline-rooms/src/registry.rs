use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use questline_types::events::RoomEvent;

/// One subscriber's outbound event queue. The conn id distinguishes a
/// stale connection from the one that replaced it, so teardown of the old
/// connection cannot evict the new entry.
struct Subscriber {
    conn_id: Uuid,
    tx: mpsc::UnboundedSender<RoomEvent>,
}

/// Tracks live scoreboard subscribers per quest and fans out change
/// events. Rooms are ephemeral: a room exists exactly as long as it has
/// subscribers. Handles are queue senders, never the socket itself, so no
/// lock is ever held across network I/O.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, Subscriber>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `user_id` as the live subscriber of `quest_id`. A newer
    /// connection for the same pair overwrites the old entry; the stale
    /// connection observes its queue closing and tears down on its own.
    /// Returns the connection id and the event receiver to drain.
    pub async fn subscribe(
        &self,
        quest_id: Uuid,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<RoomEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(quest_id)
            .or_default()
            .insert(user_id, Subscriber { conn_id, tx });

        (conn_id, rx)
    }

    /// Remove the mapping for (quest, user) if `conn_id` still owns it.
    /// Idempotent; unknown pairs are a no-op. Empty rooms are dropped so
    /// reconnect churn does not accumulate entries.
    pub async fn unsubscribe(&self, quest_id: Uuid, user_id: Uuid, conn_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&quest_id) else {
            return;
        };

        if room.get(&user_id).is_some_and(|s| s.conn_id == conn_id) {
            room.remove(&user_id);
        }
        if room.is_empty() {
            rooms.remove(&quest_id);
        }
    }

    /// Deliver `event` to every subscriber of `quest_id`, skipping
    /// `exclude_user_id` when given. Best effort: delivery failures never
    /// surface to the caller, and a subscriber whose queue is gone is
    /// dropped from the room so later broadcasts skip it entirely.
    pub async fn broadcast(&self, quest_id: Uuid, event: RoomEvent, exclude_user_id: Option<Uuid>) {
        // Snapshot under the read lock, send after releasing it.
        let targets: Vec<(Uuid, Uuid, mpsc::UnboundedSender<RoomEvent>)> = {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(&quest_id) else {
                return;
            };
            room.iter()
                .filter(|(user_id, _)| Some(**user_id) != exclude_user_id)
                .map(|(user_id, sub)| (*user_id, sub.conn_id, sub.tx.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (user_id, conn_id, tx) in targets {
            if tx.send(event.clone()).is_err() {
                dead.push((user_id, conn_id));
            }
        }

        for (user_id, conn_id) in dead {
            debug!("evicting stale subscriber {} from quest {}", user_id, quest_id);
            self.unsubscribe(quest_id, user_id, conn_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(quest_id: Uuid) -> RoomEvent {
        RoomEvent::ScoreboardUpdate { quest_id }
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_is_noop() {
        let registry = RoomRegistry::new();
        let quest = Uuid::new_v4();

        registry.broadcast(quest, event(quest), None).await;
        assert!(registry.rooms.read().await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let registry = RoomRegistry::new();
        let quest = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (_, mut alice_rx) = registry.subscribe(quest, alice).await;
        let (_, mut bob_rx) = registry.subscribe(quest, bob).await;

        registry.broadcast(quest, event(quest), None).await;

        assert!(matches!(
            alice_rx.try_recv(),
            Ok(RoomEvent::ScoreboardUpdate { quest_id }) if quest_id == quest
        ));
        assert!(bob_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn excluded_user_is_skipped() {
        let registry = RoomRegistry::new();
        let quest = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (_, mut alice_rx) = registry.subscribe(quest, alice).await;
        let (_, mut bob_rx) = registry.subscribe(quest, bob).await;

        registry.broadcast(quest, event(quest), Some(alice)).await;

        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dead_subscriber_is_evicted_on_failed_send() {
        let registry = RoomRegistry::new();
        let quest = Uuid::new_v4();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

        let (_, alice_rx) = registry.subscribe(quest, alice).await;
        let (_, mut bob_rx) = registry.subscribe(quest, bob).await;
        drop(alice_rx);

        registry.broadcast(quest, event(quest), None).await;

        // The dead entry is gone; the healthy one still got the event.
        assert!(bob_rx.try_recv().is_ok());
        let rooms = registry.rooms.read().await;
        let room = rooms.get(&quest).unwrap();
        assert!(!room.contains_key(&alice));
        assert!(room.contains_key(&bob));
    }

    #[tokio::test]
    async fn room_is_removed_with_its_last_subscriber() {
        let registry = RoomRegistry::new();
        let quest = Uuid::new_v4();
        let alice = Uuid::new_v4();

        let (conn_id, _rx) = registry.subscribe(quest, alice).await;
        registry.unsubscribe(quest, alice, conn_id).await;

        assert!(registry.rooms.read().await.is_empty());

        // Unsubscribing an unknown pair stays a no-op.
        registry.unsubscribe(quest, alice, conn_id).await;
    }

    #[tokio::test]
    async fn resubscribe_replaces_the_old_handle() {
        let registry = RoomRegistry::new();
        let quest = Uuid::new_v4();
        let alice = Uuid::new_v4();

        let (old_conn, mut old_rx) = registry.subscribe(quest, alice).await;
        let (_, mut new_rx) = registry.subscribe(quest, alice).await;

        registry.broadcast(quest, event(quest), None).await;
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err(), "replaced handle gets nothing");

        // The stale connection's teardown must not evict its replacement.
        registry.unsubscribe(quest, alice, old_conn).await;
        registry.broadcast(quest, event(quest), None).await;
        assert!(new_rx.try_recv().is_ok());
    }
}

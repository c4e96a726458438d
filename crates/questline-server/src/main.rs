use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use questline_api::auth::{self, AppState, AppStateInner};
use questline_api::checkins;
use questline_api::middleware::{decode_token, require_auth};
use questline_api::quests;
use questline_rooms::RoomRegistry;
use questline_rooms::connection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "questline=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("QUESTLINE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("QUESTLINE_DB_PATH").unwrap_or_else(|_| "questline.db".into());
    let host = std::env::var("QUESTLINE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("QUESTLINE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = questline_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let registry = RoomRegistry::new();
    let state: AppState = Arc::new(AppStateInner {
        db,
        registry,
        jwt_secret,
    });

    // Routes
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/quests", post(quests::create_quest).get(quests::list_quests))
        .route("/quests/join", post(quests::join_quest))
        .route("/quests/{quest_id}", get(quests::get_quest))
        .route(
            "/quests/{quest_id}/checkins",
            post(checkins::increment).get(checkins::list_checkins),
        )
        .route(
            "/quests/{quest_id}/checkins/decrement",
            post(checkins::decrement),
        )
        .route("/quests/{quest_id}/stats", get(checkins::stats))
        .layer(middleware::from_fn(require_auth))
        .with_state(state.clone());

    let live_routes = Router::new()
        .route("/quests/{quest_id}/live", get(live_upgrade))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(live_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Questline server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct LiveQuery {
    token: String,
}

/// Live scoreboard subscription. The token and the participant check run
/// before the upgrade completes, so non-participants never reach a room.
async fn live_upgrade(
    State(state): State<AppState>,
    Path(quest_id): Path<Uuid>,
    Query(query): Query<LiveQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, StatusCode> {
    let claims =
        decode_token(&state.jwt_secret, &query.token).ok_or(StatusCode::UNAUTHORIZED)?;

    let participant = state
        .db
        .get_participant(&quest_id.to_string(), &claims.sub.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if participant.is_none() {
        return Err(StatusCode::FORBIDDEN);
    }

    let registry = state.registry.clone();
    let user_id = claims.sub;
    Ok(ws.on_upgrade(move |socket| connection::serve(socket, registry, quest_id, user_id)))
}

//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::app::AppState;
use crate::game::weapon::WeaponTable;
use crate::util::time::uptime_secs;
use crate::ws::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.client_origin.as_deref());

    Router::new()
        .route("/health", get(health_handler))
        .route("/weapons", get(weapons_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS for the configured origins (comma separated), permissive when unset
fn cors_layer(client_origin: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let Some(origins) = client_origin else {
        return base.allow_origin(Any);
    };

    let allowed: Vec<HeaderValue> = origins
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            let parsed = s.parse::<HeaderValue>().ok();
            if parsed.is_none() && !s.is_empty() {
                warn!(origin = %s, "Ignoring unparsable CORS origin");
            }
            parsed
        })
        .collect();
    base.allow_origin(allowed)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    alive_players: usize,
    connected_sessions: usize,
    queue_size: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue_size = state.lobby.queue_size().await;

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        alive_players: state.match_registry.alive_players(),
        connected_sessions: state.lobby.connected_sessions(),
        queue_size,
    })
}

// ============================================================================
// Weapon table
// ============================================================================

async fn weapons_handler(State(state): State<AppState>) -> Json<WeaponTable> {
    Json(state.weapons.as_ref().clone())
}

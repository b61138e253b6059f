use crate::{handlers::{get_room, health_check, room_ws}, AppState};
use axum::{routing::get, Router};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/health", get(health_check))
        .route("/rooms/:id", get(get_room))
        .route("/rooms/:id/ws", get(room_ws))
        .with_state(state)
}

use axum::{extract::{Path, State}, http::StatusCode, Json};
use crate::{models::{ErrorResponse, RoomResponse}, AppState};

/// Current state of a room
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, (StatusCode, Json<ErrorResponse>)> {
    let not_found = || ErrorResponse::reply(StatusCode::NOT_FOUND, "room not found");

    let room = state.registry.get(&room_id).await.ok_or_else(not_found)?;
    // The actor may have terminated since the lookup.
    let snapshot = room.snapshot().await.map_err(|_| not_found())?;
    Ok(Json(snapshot.into()))
}

use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Current state of a room
#[utoipa::path(
    get,
    path = "/api/rooms/{id}",
    params(
        ("id" = String, Path, description = "Room id")
    ),
    responses(
        (status = 200, description = "Room found", body = RoomResponse),
        (status = 404, description = "No such room", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn get_room_doc() {}

/// Join a room over WebSocket
#[utoipa::path(
    get,
    path = "/api/rooms/{id}/ws",
    params(
        ("id" = String, Path, description = "Room id, at most ROOM_ID_MAX_LEN bytes")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol"),
        (status = 400, description = "Invalid room id", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn room_ws_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        get_room_doc,
        room_ws_doc,
    ),
    components(
        schemas(HealthResponse, RoomResponse, MemberResponse, ErrorResponse)
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;

use std::net::SocketAddr;

use axum::{
    extract::{ws::{WebSocket, WebSocketUpgrade}, ConnectInfo, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    models::ErrorResponse,
    relay::{read_pump, write_pump, PumpExit},
    utils::drop_guard::DropGuard,
    AppState,
};

/// WebSocket endpoint for a room
pub async fn room_ws(
    Path(room_id): Path<String>,
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if let Err(message) = validate_room_id(&room_id, state.config.room_id_max_len) {
        return ErrorResponse::reply(StatusCode::BAD_REQUEST, message).into_response();
    }

    let session_id = Uuid::new_v4().to_string();
    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let ip = connect_info.map(|ConnectInfo(addr)| addr.ip().to_string()).unwrap_or_default();
    info!(room_id = %room_id, session_id = %session_id, ip = %ip, referer, "New WebSocket request");

    let max_size = state.registry.config().max_message_size;
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| handle_socket(socket, room_id, session_id, state))
}

/// Room ids come from the URL; anything empty or overly long is refused before upgrading.
pub fn validate_room_id(room_id: &str, max_len: usize) -> Result<(), String> {
    if room_id.is_empty() || room_id.len() > max_len {
        return Err("invalid room id".to_string());
    }
    Ok(())
}

async fn handle_socket(socket: WebSocket, room_id: String, session_id: String, state: AppState) {
    let _live = state.registry.track_session();
    let config = state.registry.config().clone();
    let (sink, stream) = socket.split();

    let (room, session, outbound) = state.registry.join(&room_id, &session_id).await;

    let _unregister = {
        let room = room.clone();
        let session = session.clone();
        DropGuard::new(move || {
            session.close();
            let _ = room.unregister(session.id());
        })
    };

    let writer = {
        let session = session.clone();
        let config = config.clone();
        tokio::spawn(async move { write_pump(&session, sink, outbound, &config).await })
    };

    let read_exit = read_pump(&session, &room, stream, &config).await;
    session.close();
    log_exit(&room_id, &session_id, &read_exit);

    match writer.await {
        Ok(write_exit) => log_exit(&room_id, &session_id, &write_exit),
        Err(e) => error!(room_id = %room_id, session_id = %session_id, "Write pump failed: {}", e),
    }
    info!(room_id = %room_id, session_id = %session_id, "WebSocket connection terminated");
}

fn log_exit(room_id: &str, session_id: &str, exit: &PumpExit) {
    if exit.is_clean() {
        debug!(room_id, session_id, "Pump stopped: {}", exit);
    } else {
        info!(room_id, session_id, error = %exit, "Session error");
    }
}

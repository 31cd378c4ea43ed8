//! Host-only command handlers
//!
//! Authorization is checked in the dispatch layer before calling these,
//! except for room creation, which is what makes a connection the host.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::RoomId;
use std::sync::Arc;

/// True when the connection holds the room's host seat
pub async fn is_host(state: &Arc<AppState>, room_id: RoomId, connection_id: &str) -> bool {
    let rooms = state.rooms.read().await;
    rooms
        .get(&room_id)
        .and_then(|room| room.host_connection())
        .map(|conn| conn == connection_id)
        .unwrap_or(false)
}

pub async fn handle_create_room(
    state: &Arc<AppState>,
    connection_id: &str,
    quiz_id: String,
) -> Option<ServerMessage> {
    tracing::info!("Room creation requested for quiz {}", quiz_id);
    match state.create_room(&quiz_id, connection_id.to_string()).await {
        Ok(room_id) => Some(ServerMessage::RoomCreated { room_id }),
        Err(e) => Some(ServerMessage::Error {
            code: "CREATE_ROOM_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_start(state: &Arc<AppState>, room_id: RoomId) -> Option<ServerMessage> {
    tracing::info!("Host starting game in room {}", room_id);
    match state.start_game(room_id).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "START_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_next_question(state: &Arc<AppState>, room_id: RoomId) -> Option<ServerMessage> {
    tracing::info!("Host advancing room {}", room_id);
    match state.next_question(room_id).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "NEXT_QUESTION_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_pause_timer(state: &Arc<AppState>, room_id: RoomId) -> Option<ServerMessage> {
    match state.pause_timer(room_id).await {
        Ok(paused) => {
            state
                .send_to_room(room_id, ServerMessage::TimerPaused { paused })
                .await;
            None
        }
        Err(e) => Some(ServerMessage::Error {
            code: "PAUSE_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_panic_mode(state: &Arc<AppState>, room_id: RoomId) -> Option<ServerMessage> {
    match state.panic_timer(room_id).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "PANIC_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_toggle_lock(state: &Arc<AppState>, room_id: RoomId) -> Option<ServerMessage> {
    match state.toggle_lock(room_id).await {
        Ok(is_locked) => Some(ServerMessage::RoomValidation {
            is_room: true,
            is_locked,
        }),
        Err(e) => Some(ServerMessage::Error {
            code: "LOCK_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_ban_player(
    state: &Arc<AppState>,
    room_id: RoomId,
    username: String,
) -> Option<ServerMessage> {
    tracing::info!("Host banning {} from room {}", username, room_id);
    match state.ban_player(room_id, &username).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "BAN_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_score_answer(
    state: &Arc<AppState>,
    room_id: RoomId,
    multiplier: f32,
) -> Option<ServerMessage> {
    match state.score_answer(room_id, multiplier).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "SCORE_FAILED".to_string(),
            msg: e,
        }),
    }
}

//! Player message handlers: joining, answering and chat.

use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::types::RoomId;
use std::sync::Arc;

/// Resolve the username seated on this connection in the given room.
async fn seat_in_room(
    state: &Arc<AppState>,
    connection_id: &str,
    room_id: RoomId,
) -> Result<String, ServerMessage> {
    match state.find_player_by_connection(connection_id).await {
        Some((seated_room, username)) if seated_room == room_id => Ok(username),
        _ => Err(ServerMessage::Error {
            code: "NOT_IN_ROOM".to_string(),
            msg: "You are not in this room".to_string(),
        }),
    }
}

pub async fn handle_join(
    state: &Arc<AppState>,
    connection_id: &str,
    room_id: RoomId,
    username: String,
) -> Option<ServerMessage> {
    tracing::info!("{} attempting to join room {}", username, room_id);
    match state
        .add_player(room_id, &username, connection_id.to_string())
        .await
    {
        Ok(()) => {
            state
                .send_to_room(room_id, ServerMessage::PlayerJoined {
                    username: username.clone(),
                })
                .await;
            Some(ServerMessage::UsernameValidation {
                is_valid: true,
                error: None,
            })
        }
        Err(e) => Some(ServerMessage::UsernameValidation {
            is_valid: false,
            error: Some(e.to_string()),
        }),
    }
}

pub async fn handle_validate_room(state: &Arc<AppState>, room_id: RoomId) -> Option<ServerMessage> {
    let (is_room, is_locked) = state.validate_room(room_id).await;
    Some(ServerMessage::RoomValidation { is_room, is_locked })
}

pub async fn handle_leave(
    state: &Arc<AppState>,
    connection_id: &str,
    room_id: RoomId,
) -> Option<ServerMessage> {
    let username = match seat_in_room(state, connection_id, room_id).await {
        Ok(name) => name,
        Err(e) => return Some(e),
    };
    state.leave_room(room_id, &username).await;
    None
}

/// QCM choice update. The state-level operation is a toggle; only apply it
/// when the client's intent differs from the current set, so duplicate
/// deliveries of the same event are idempotent.
pub async fn handle_update_selection(
    state: &Arc<AppState>,
    connection_id: &str,
    room_id: RoomId,
    choice_index: usize,
    is_selected: bool,
) -> Option<ServerMessage> {
    let username = match seat_in_room(state, connection_id, room_id).await {
        Ok(name) => name,
        Err(e) => return Some(e),
    };

    let current = match state.current_selection(room_id, &username).await {
        Ok(set) => set,
        Err(e) => {
            return Some(ServerMessage::Error {
                code: "SELECTION_FAILED".to_string(),
                msg: e,
            })
        }
    };
    if current.contains(&choice_index) == is_selected {
        return None;
    }

    match state.toggle_selection(room_id, &username, choice_index).await {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "SELECTION_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_submit_answer(
    state: &Arc<AppState>,
    connection_id: &str,
    room_id: RoomId,
    qrl_text: Option<String>,
) -> Option<ServerMessage> {
    let username = match seat_in_room(state, connection_id, room_id).await {
        Ok(name) => name,
        Err(e) => return Some(e),
    };

    match state.submit_answer(room_id, &username, qrl_text).await {
        Ok(()) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "SUBMIT_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_new_message(
    state: &Arc<AppState>,
    connection_id: &str,
    room_id: RoomId,
    text: String,
) -> Option<ServerMessage> {
    let username = match seat_in_room(state, connection_id, room_id).await {
        Ok(name) => name,
        Err(e) => return Some(e),
    };

    match state.post_message(room_id, username, text).await {
        Ok(_) => None,
        Err(e) => Some(ServerMessage::Error {
            code: "MESSAGE_FAILED".to_string(),
            msg: e,
        }),
    }
}

pub async fn handle_get_messages(
    state: &Arc<AppState>,
    connection_id: &str,
    room_id: RoomId,
) -> Option<ServerMessage> {
    if seat_in_room(state, connection_id, room_id).await.is_err() {
        return Some(ServerMessage::Error {
            code: "NOT_IN_ROOM".to_string(),
            msg: "You are not in this room".to_string(),
        });
    }
    match state.get_messages(room_id).await {
        Ok(list) => Some(ServerMessage::Messages { list }),
        Err(e) => Some(ServerMessage::Error {
            code: "MESSAGE_FAILED".to_string(),
            msg: e,
        }),
    }
}

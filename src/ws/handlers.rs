//! WebSocket message dispatch
//!
//! The single entry point for inbound client messages: one exhaustive match
//! over the typed protocol. Host authorization is checked here, then the
//! message is routed to the role-specific handler modules.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use std::sync::Arc;

use super::{host, player};

/// Macro to check that the sending connection holds the room's host seat
macro_rules! check_host {
    ($state:expr, $room_id:expr, $connection_id:expr, $action:expr) => {
        if !host::is_host($state, $room_id, $connection_id).await {
            return Some(ServerMessage::Error {
                code: "UNAUTHORIZED".to_string(),
                msg: format!("Only the host can {}", $action),
            });
        }
    };
}

/// Handle client messages and return optional direct response
pub async fn handle_message(
    msg: ClientMessage,
    connection_id: &str,
    state: &Arc<AppState>,
) -> Option<ServerMessage> {
    match msg {
        // Room access
        ClientMessage::CreateRoom { quiz_id } => {
            host::handle_create_room(state, connection_id, quiz_id).await
        }
        ClientMessage::JoinGame { room_id, username } => {
            player::handle_join(state, connection_id, room_id, username).await
        }
        ClientMessage::ValidateRoomId { room_id } => {
            player::handle_validate_room(state, room_id).await
        }
        ClientMessage::LeaveGame { room_id } => {
            player::handle_leave(state, connection_id, room_id).await
        }

        // Answering
        ClientMessage::UpdateSelection {
            room_id,
            choice_index,
            is_selected,
        } => {
            player::handle_update_selection(state, connection_id, room_id, choice_index, is_selected)
                .await
        }
        ClientMessage::SubmitAnswer { room_id, qrl_text } => {
            player::handle_submit_answer(state, connection_id, room_id, qrl_text).await
        }

        // Chat
        ClientMessage::NewMessage { room_id, text } => {
            player::handle_new_message(state, connection_id, room_id, text).await
        }
        ClientMessage::GetMessages { room_id } => {
            player::handle_get_messages(state, connection_id, room_id).await
        }

        // Host-only commands (authorization checked before dispatch)
        ClientMessage::Start { room_id } => {
            check_host!(state, room_id, connection_id, "start the game");
            host::handle_start(state, room_id).await
        }
        ClientMessage::NextQuestion { room_id } => {
            check_host!(state, room_id, connection_id, "advance the game");
            host::handle_next_question(state, room_id).await
        }
        ClientMessage::PauseTimer { room_id } => {
            check_host!(state, room_id, connection_id, "pause the timer");
            host::handle_pause_timer(state, room_id).await
        }
        ClientMessage::PanicMode { room_id } => {
            check_host!(state, room_id, connection_id, "start panic mode");
            host::handle_panic_mode(state, room_id).await
        }
        ClientMessage::ToggleRoomLock { room_id } => {
            check_host!(state, room_id, connection_id, "lock the room");
            host::handle_toggle_lock(state, room_id).await
        }
        ClientMessage::BanPlayer { room_id, username } => {
            check_host!(state, room_id, connection_id, "ban players");
            host::handle_ban_player(state, room_id, username).await
        }
        ClientMessage::ScoreAnswer { room_id, multiplier } => {
            check_host!(state, room_id, connection_id, "score answers");
            host::handle_score_answer(state, room_id, multiplier).await
        }
    }
}

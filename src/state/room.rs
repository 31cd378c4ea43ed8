use crate::protocol::ServerMessage;
use crate::state::AppState;
use crate::state::game::Game;
use crate::types::*;
use std::collections::{HashMap, HashSet};

/// One live quiz session. Owned exclusively by the registry; the countdown
/// task for a room lives in the scheduler arena, keyed by room id, never here.
#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub quiz_id: QuizId,
    /// username -> connection id; usernames are unique case-insensitively.
    /// The host sits here too, under the reserved name.
    pub players: HashMap<String, ConnectionId>,
    pub locked: bool,
    /// Banned names, stored lowercase
    pub banned: HashSet<String>,
    pub messages: Vec<ChatMessage>,
    pub game: Option<Game>,
}

impl Room {
    pub fn new(id: RoomId, quiz_id: QuizId, host_connection: ConnectionId) -> Self {
        let mut players = HashMap::new();
        players.insert(HOST_NAME.to_string(), host_connection);
        Self {
            id,
            quiz_id,
            players,
            locked: false,
            banned: HashSet::new(),
            messages: Vec::new(),
            game: None,
        }
    }

    pub fn has_player(&self, username: &str) -> bool {
        self.players
            .keys()
            .any(|name| name.eq_ignore_ascii_case(username))
    }

    pub fn host_connection(&self) -> Option<&ConnectionId> {
        self.players.get(HOST_NAME)
    }

    /// Usernames of everyone except the host seat.
    pub fn player_names(&self) -> Vec<String> {
        self.players
            .keys()
            .filter(|name| !is_host_name(name))
            .cloned()
            .collect()
    }
}

impl AppState {
    /// Append a chat message (server-side timestamp) and relay it to the room.
    pub async fn post_message(
        &self,
        room_id: RoomId,
        author: String,
        text: String,
    ) -> Result<ChatMessage, String> {
        let message = ChatMessage {
            author,
            text,
            time: chrono::Utc::now().to_rfc3339(),
        };

        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(&room_id).ok_or("Room not found")?;
        room.messages.push(message.clone());
        drop(rooms);

        self.send_to_room(room_id, ServerMessage::ReceivedMessage {
            message: message.clone(),
        })
        .await;
        Ok(message)
    }

    pub async fn get_messages(&self, room_id: RoomId) -> Result<Vec<ChatMessage>, String> {
        let rooms = self.rooms.read().await;
        let room = rooms.get(&room_id).ok_or("Room not found")?;
        Ok(room.messages.clone())
    }
}

pub mod evaluation;
pub mod game;
pub mod room;

pub use room::Room;

use crate::catalog::{HistorySink, QuizCatalog};
use crate::protocol::ServerMessage;
use crate::timer::TimerTask;
use crate::types::*;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};

/// Admission failures reported to joining players as a structured
/// `{ is_valid: false, error }` payload, never as a fault.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("This name is already taken in this room")]
    DuplicateUsername,
    #[error("This name has been banned from this room")]
    NameBanned,
    #[error("This room is locked")]
    RoomLocked,
    #[error("Room not found")]
    RoomNotFound,
    #[error("This name is reserved")]
    ReservedName,
}

/// Shared application state: the room registry, the connection registry and
/// the timer arena. The single source of truth for which rooms/players exist.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RwLock<HashMap<RoomId, Room>>>,
    /// connection id -> outbound message channel
    pub connections: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>>,
    /// One countdown task per active room, keyed by room id
    pub timers: Arc<RwLock<HashMap<RoomId, TimerTask>>>,
    pub catalog: Arc<dyn QuizCatalog>,
    pub history: Arc<dyn HistorySink>,
}

impl AppState {
    pub fn new(catalog: Arc<dyn QuizCatalog>, history: Arc<dyn HistorySink>) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            connections: Arc::new(RwLock::new(HashMap::new())),
            timers: Arc::new(RwLock::new(HashMap::new())),
            catalog,
            history,
        }
    }

    // --- connection registry ---

    pub async fn register_connection(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) {
        self.connections.write().await.insert(connection_id, sender);
    }

    pub async fn unregister_connection(&self, connection_id: &str) {
        self.connections.write().await.remove(connection_id);
    }

    pub async fn send_to_connection(&self, connection_id: &str, msg: ServerMessage) {
        if let Some(tx) = self.connections.read().await.get(connection_id) {
            // Send errors just mean the socket is already gone
            let _ = tx.send(msg);
        }
    }

    /// Broadcast to every connection seated in the room, host included.
    pub async fn send_to_room(&self, room_id: RoomId, msg: ServerMessage) {
        let targets: Vec<ConnectionId> = {
            let rooms = self.rooms.read().await;
            match rooms.get(&room_id) {
                Some(room) => room.players.values().cloned().collect(),
                None => return,
            }
        };
        let connections = self.connections.read().await;
        for id in targets {
            if let Some(tx) = connections.get(&id) {
                let _ = tx.send(msg.clone());
            }
        }
    }

    pub async fn send_to_host(&self, room_id: RoomId, msg: ServerMessage) {
        let host = {
            let rooms = self.rooms.read().await;
            rooms
                .get(&room_id)
                .and_then(|room| room.host_connection().cloned())
        };
        if let Some(connection_id) = host {
            self.send_to_connection(&connection_id, msg).await;
        }
    }

    // --- room registry ---

    /// Allocate a room with a unique 4-digit code and seat the host.
    pub async fn create_room(
        &self,
        quiz_id: &str,
        host_connection: ConnectionId,
    ) -> Result<RoomId, String> {
        self.catalog
            .get_quiz_by_id(quiz_id)
            .await
            .ok_or_else(|| format!("Quiz {} not found", quiz_id))?;

        let mut rooms = self.rooms.write().await;
        // Rejection sampling; expected O(1) retries at realistic occupancy
        let id = {
            let mut rng = rand::rng();
            loop {
                let candidate: RoomId = rng.random_range(1000..=9999);
                if !rooms.contains_key(&candidate) {
                    break candidate;
                }
            }
        };
        rooms.insert(id, Room::new(id, quiz_id.to_string(), host_connection));
        tracing::info!("Created room {} for quiz {}", id, quiz_id);
        Ok(id)
    }

    /// (is_room, is_locked) for the join screen
    pub async fn validate_room(&self, room_id: RoomId) -> (bool, bool) {
        let rooms = self.rooms.read().await;
        match rooms.get(&room_id) {
            Some(room) => (true, room.locked),
            None => (false, false),
        }
    }

    pub async fn add_player(
        &self,
        room_id: RoomId,
        username: &str,
        connection_id: ConnectionId,
    ) -> Result<(), JoinError> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(&room_id).ok_or(JoinError::RoomNotFound)?;

        if is_host_name(username) {
            return Err(JoinError::ReservedName);
        }
        if room.locked {
            return Err(JoinError::RoomLocked);
        }
        if room.banned.contains(&username.to_lowercase()) {
            return Err(JoinError::NameBanned);
        }
        if room.has_player(username) {
            return Err(JoinError::DuplicateUsername);
        }

        room.players.insert(username.to_string(), connection_id);
        tracing::info!("Player {} joined room {}", username, room_id);
        Ok(())
    }

    /// Remove a player from the room map. Returns the freed connection id.
    /// Deletes the room when nobody is left.
    pub async fn remove_player(
        &self,
        room_id: RoomId,
        username: &str,
    ) -> Result<ConnectionId, String> {
        let (connection_id, now_empty) = {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or("Room not found")?;
            let key = room
                .players
                .keys()
                .find(|name| name.eq_ignore_ascii_case(username))
                .cloned()
                .ok_or("Player not found")?;
            let connection_id = room.players.remove(&key).unwrap_or_default();
            (connection_id, room.players.is_empty())
        };
        if now_empty {
            self.delete_room(room_id).await;
        }
        Ok(connection_id)
    }

    /// Ban and remove atomically; the name can never rejoin this room.
    pub async fn ban_player(self: &Arc<Self>, room_id: RoomId, username: &str) -> Result<(), String> {
        {
            let mut rooms = self.rooms.write().await;
            let room = rooms.get_mut(&room_id).ok_or("Room not found")?;
            if !room.has_player(username) {
                return Err("Player not found".to_string());
            }
            room.banned.insert(username.to_lowercase());
        }
        let connection_id = self.remove_player(room_id, username).await?;
        let notice = ServerMessage::RemovedPlayer {
            username: username.to_string(),
        };
        // Removal already unseated the player, so the room broadcast no
        // longer reaches them; notify their connection directly.
        self.send_to_connection(&connection_id, notice.clone()).await;
        self.send_to_room(room_id, notice).await;
        self.player_exited(room_id, username).await;
        tracing::info!("Banned {} from room {}", username, room_id);
        Ok(())
    }

    /// Toggle the room lock; returns the new state.
    pub async fn toggle_lock(&self, room_id: RoomId) -> Result<bool, String> {
        let mut rooms = self.rooms.write().await;
        let room = rooms.get_mut(&room_id).ok_or("Room not found")?;
        room.locked = !room.locked;
        Ok(room.locked)
    }

    /// Drop the room. The countdown task is cancelled first, so no tick can
    /// reference the room once this returns.
    pub async fn delete_room(&self, room_id: RoomId) {
        self.cancel_timer(room_id).await;
        if self.rooms.write().await.remove(&room_id).is_some() {
            tracing::info!("Deleted room {}", room_id);
        }
    }

    /// Resolve the owning room from a connection id, for disconnect cleanup.
    pub async fn find_player_by_connection(
        &self,
        connection_id: &str,
    ) -> Option<(RoomId, String)> {
        let rooms = self.rooms.read().await;
        for (room_id, room) in rooms.iter() {
            for (username, conn) in &room.players {
                if conn == connection_id {
                    return Some((*room_id, username.clone()));
                }
            }
        }
        None
    }

    /// Explicit-leave path. Host leaving closes the whole room.
    pub async fn leave_room(self: &Arc<Self>, room_id: RoomId, username: &str) {
        if is_host_name(username) {
            self.send_to_room(room_id, ServerMessage::HostLeft).await;
            self.delete_room(room_id).await;
            return;
        }
        if self.remove_player(room_id, username).await.is_ok() {
            self.send_to_room(room_id, ServerMessage::PlayerLeft {
                username: username.to_string(),
            })
            .await;
            self.player_exited(room_id, username).await;
        }
    }

    /// Disconnects run the same removal path as an explicit leave.
    pub async fn handle_disconnect(self: &Arc<Self>, connection_id: &str) {
        self.unregister_connection(connection_id).await;
        if let Some((room_id, username)) = self.find_player_by_connection(connection_id).await {
            tracing::info!("Connection {} ({}) left room {}", connection_id, username, room_id);
            self.leave_room(room_id, &username).await;
        }
    }
}

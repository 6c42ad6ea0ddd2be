//! Presence registry: one room per user id, holding every live connection of that user.

use dashmap::DashMap;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use super::types::WsMessage;

pub type WsSender = mpsc::UnboundedSender<WsMessage>;
pub type ConnectionId = Uuid;

#[derive(Clone)]
pub struct ConnectionManager {
    rooms: Arc<DashMap<Uuid, HashMap<ConnectionId, WsSender>>>,
    closing: Arc<watch::Sender<bool>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            rooms: Arc::default(),
            closing: Arc::new(watch::channel(false).0),
        }
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips to `true` once `shutdown` has been called. Socket writers watch it to close.
    pub fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    /// Joins a connection to the user's room, creating the room if needed.
    pub fn add_connection(&self, user_id: Uuid, tx: WsSender) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        self.rooms.entry(user_id).or_default().insert(connection_id, tx);
        connection_id
    }

    /// Leaves the room. Returns `true` when this closed the user's last connection.
    pub fn remove_connection(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let now_empty = match self.rooms.get_mut(&user_id) {
            Some(mut room) => {
                room.remove(&connection_id);
                room.is_empty()
            }
            None => return false,
        };

        // Re-checked under the shard lock: a concurrent join may have refilled the room.
        now_empty && self.rooms.remove_if(&user_id, |_, room| room.is_empty()).is_some()
    }

    /// Delivers to every connection in the user's room. Offline users drop the event.
    pub fn emit(&self, user_id: Uuid, message: WsMessage) -> usize {
        let Some(room) = self.rooms.get(&user_id) else {
            debug!("Dropping {} for offline user {}", message.name(), user_id);
            return 0;
        };

        room.values()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }

    /// Emits to each participant except `exclude`. Returns the number of connections reached.
    pub fn broadcast_to_chat(
        &self,
        participants: &[Uuid],
        message: WsMessage,
        exclude: Option<Uuid>,
    ) -> usize {
        participants
            .iter()
            .filter(|id| Some(**id) != exclude)
            .map(|id| self.emit(*id, message.clone()))
            .sum()
    }

    #[cfg(test)]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.rooms.contains_key(&user_id)
    }

    #[cfg(test)]
    pub fn connection_count(&self, user_id: Uuid) -> usize {
        self.rooms.get(&user_id).map(|room| room.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn online_users(&self) -> usize {
        self.rooms.len()
    }

    /// Tells every socket writer to close, then drops every room.
    pub fn shutdown(&self) {
        self.closing.send_replace(true);
        let users = self.rooms.len();
        self.rooms.clear();
        debug!("Presence registry cleared ({} users)", users);
    }
}

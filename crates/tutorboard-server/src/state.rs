//! Session rooms shared by all connections.

use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tutorboard_core::sync::ServerMessage;

/// A relayed message tagged with the connection that published it.
pub type Envelope = (String, ServerMessage);

/// Room state. Nothing published is retained: late joiners start empty.
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<Envelope>,
    /// Connection id -> user id
    peers: HashMap<String, String>,
}

impl Room {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            peers: HashMap::new(),
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Active rooms keyed by session topic
    rooms: DashMap<String, Room>,
    channel_capacity: usize,
}

impl AppState {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            // broadcast::channel panics on zero
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Add a connection to a room, creating the room on first join.
    ///
    /// Returns the room receiver and the peer count including the new peer.
    pub fn join_room(
        &self,
        topic: &str,
        peer_id: &str,
        user_id: &str,
    ) -> (broadcast::Receiver<Envelope>, usize) {
        let capacity = self.channel_capacity;
        let mut room = self
            .rooms
            .entry(topic.to_string())
            .or_insert_with(|| Room::new(capacity));
        room.peers.insert(peer_id.to_string(), user_id.to_string());
        (room.tx.subscribe(), room.peers.len())
    }

    /// Remove a connection; returns its user id if it was in the room.
    pub fn leave_room(&self, topic: &str, peer_id: &str) -> Option<String> {
        let mut room = self.rooms.get_mut(topic)?;
        let user_id = room.peers.remove(peer_id);
        // Clean up empty rooms
        if room.peers.is_empty() {
            drop(room);
            self.rooms.remove(topic);
        }
        user_id
    }

    /// Broadcast message to room
    pub fn broadcast(&self, topic: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(topic) {
            let _ = room.tx.send((from.to_string(), msg));
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn peer_count(&self, topic: &str) -> usize {
        self.rooms.get(topic).map_or(0, |room| room.peers.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_counts_peers() {
        let state = AppState::new(8);
        let (_rx1, count1) = state.join_room("session:a", "c1", "u1");
        let (_rx2, count2) = state.join_room("session:a", "c2", "u2");
        let (_rx3, count3) = state.join_room("session:b", "c3", "u3");
        assert_eq!((count1, count2, count3), (1, 2, 1));
        assert_eq!(state.room_count(), 2);
    }

    #[test]
    fn test_broadcast_reaches_room_only() {
        let state = AppState::new(8);
        let (mut rx_a, _) = state.join_room("session:a", "c1", "u1");
        let (mut rx_b, _) = state.join_room("session:b", "c2", "u2");

        let msg = ServerMessage::Error {
            message: "hi".to_string(),
        };
        state.broadcast("session:a", "c1", msg.clone());
        assert_eq!(rx_a.try_recv().unwrap(), ("c1".to_string(), msg));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_leave_removes_empty_room() {
        let state = AppState::new(8);
        state.join_room("session:a", "c1", "u1");
        state.join_room("session:a", "c2", "u2");

        assert_eq!(state.leave_room("session:a", "c1"), Some("u1".to_string()));
        assert_eq!(state.peer_count("session:a"), 1);
        assert_eq!(state.leave_room("session:a", "c1"), None);

        state.leave_room("session:a", "c2");
        assert_eq!(state.room_count(), 0);
        assert_eq!(state.leave_room("session:a", "c2"), None);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let state = AppState::new(0);
        let (mut rx, _) = state.join_room("session:a", "c1", "u1");
        state.broadcast("session:a", "c2", ServerMessage::PeerLeft {
            user_id: "u2".to_string(),
        });
        assert!(rx.try_recv().is_ok());
    }
}

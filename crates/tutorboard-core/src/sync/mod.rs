//! Per-session broadcast channels carrying change events.
//!
//! A channel delivers every published event to all other participants of
//! the same session. Two transports are provided: an in-process hub and a
//! WebSocket client for the relay server.

mod memory;
mod relay;

pub use memory::{MemoryChannel, MemoryHub};
pub use relay::RelayChannel;

use crate::event::ChangeEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Broadcast event name for canvas changes.
pub const CANVAS_UPDATE_EVENT: &str = "canvas-update";

/// Topic name for a session.
pub fn session_topic(session_id: &str) -> String {
    format!("session:{session_id}")
}

/// Messages sent to the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a session topic
    Join { session: String, user_id: String },
    /// Leave the current session
    Leave,
    /// Broadcast a named event to every other subscriber
    Broadcast { event: String, payload: Value },
}

/// Messages received from the relay server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm the subscription
    Joined { session: String, peer_count: usize },
    /// Another participant subscribed
    PeerJoined { user_id: String },
    /// Another participant left
    PeerLeft { user_id: String },
    /// Event published by another participant
    Broadcast {
        from: String,
        event: String,
        payload: Value,
    },
    /// Error message
    Error { message: String },
}

/// Payload of a `canvas-update` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasUpdate {
    pub user_id: String,
    pub data: ChangeEvent,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events surfaced by a channel's `poll`.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Subscribed; `peer_count` includes us
    Connected { peer_count: usize },
    /// Connection lost or closed
    Disconnected,
    /// Change published by another participant
    Change(ChangeEvent),
    /// A participant subscribed to the session
    PeerJoined { user_id: String },
    /// A participant left the session
    PeerLeft { user_id: String },
    /// Transport or relay error
    Error { message: String },
}

/// Channel errors.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel is not connected")]
    NotConnected,
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Send failed: {0}")]
    Send(String),
}

/// A bidirectional broadcast link scoped to one session.
///
/// Publishing is fire-and-forget: `publish` returns once the event is handed
/// to the transport. Inbound events are buffered until `poll`. After
/// `unsubscribe` nothing more is delivered.
pub trait SyncChannel: Send {
    fn publish(&mut self, event: &ChangeEvent) -> Result<(), ChannelError>;

    /// Drain buffered inbound events (non-blocking).
    fn poll(&mut self) -> Vec<ChannelEvent>;

    /// Stop delivery and drop anything buffered.
    fn unsubscribe(&mut self);

    fn state(&self) -> ChannelState;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join {
            session: session_topic("abc"),
            user_id: "u1".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "join", "session": "session:abc", "user_id": "u1"}));
    }

    #[test]
    fn test_server_message_deserialize() {
        let json = r#"{"type":"joined","session":"session:abc","peer_count":2}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Joined {
                session: "session:abc".to_string(),
                peer_count: 2
            }
        );
    }

    #[test]
    fn test_canvas_update_field_names() {
        let update = CanvasUpdate {
            user_id: "u1".to_string(),
            data: ChangeEvent::clear("u1"),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["data"]["type"], "clear");
    }
}

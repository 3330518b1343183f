//! Connection entry and identity types
//!
//! This module defines the per-connection state stored in the registry and
//! the identifiers used on the wire.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::ServerMessage;

/// Unique identifier for a live connection
///
/// Assigned by the server when the channel opens, never by the client.
/// Serialized as a plain JSON number; clients treat it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Create a connection ID from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a room
///
/// Rooms are created implicitly by the first join that references them and
/// destroyed when their last member leaves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Create a room ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the room ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role a member holds within a room
///
/// Fixed at join time; changing role requires a full rejoin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Streams media to the room
    Publisher,
    /// Receives media from publishers
    Subscriber,
}

impl Role {
    /// Whether this role streams media
    pub fn is_publisher(self) -> bool {
        matches!(self, Role::Publisher)
    }
}

/// Handle for delivering server messages to one connection
///
/// Wraps the connection's outbound queue. Sends are fire-and-forget: a full
/// or closed queue drops the message for this recipient only, so a slow
/// receiver never stalls delivery to anyone else.
#[derive(Debug, Clone)]
pub struct PeerSender {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
}

impl PeerSender {
    /// Create a sender for a connection's outbound queue
    pub fn new(id: ConnectionId, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { id, tx }
    }

    /// The connection this sender delivers to
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue a message for delivery
    ///
    /// Returns `false` if the message was dropped.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(
                    connection_id = self.id.get(),
                    "Outbound queue full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    connection_id = self.id.get(),
                    "Outbound queue closed, dropping message"
                );
                false
            }
        }
    }
}

/// Room membership of a connection
#[derive(Debug, Clone)]
pub struct Membership {
    /// Room the connection belongs to
    pub room: RoomId,
    /// Role it holds there
    pub role: Role,
}

/// Entry for a single connection in the registry
#[derive(Debug)]
pub(super) struct ConnectionEntry {
    /// Caller-supplied display identity, set at join time.
    /// Presentation only, never used for security decisions.
    pub user_id: Option<String>,

    /// Current room membership (None before the first join)
    pub membership: Option<Membership>,

    /// Outbound delivery handle
    pub sender: PeerSender,

    /// When the channel opened
    pub connected_at: Instant,
}

impl ConnectionEntry {
    pub(super) fn new(sender: PeerSender) -> Self {
        Self {
            user_id: None,
            membership: None,
            sender,
            connected_at: Instant::now(),
        }
    }
}

/// Read-only snapshot of a connection's registry state
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// The connection's ID
    pub id: ConnectionId,
    /// Display identity, if the connection has joined a room
    pub user_id: Option<String>,
    /// Current membership, if any
    pub membership: Option<Membership>,
}

/// A publisher visible to discovery queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcasterInfo {
    /// The publisher's connection ID, usable as a signaling target
    pub connection_id: ConnectionId,
    /// The publisher's display identity
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.get(), 42);
    }

    #[test]
    fn test_role_is_publisher() {
        assert!(Role::Publisher.is_publisher());
        assert!(!Role::Subscriber.is_publisher());
    }

    #[tokio::test]
    async fn test_peer_sender_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        let sender = PeerSender::new(ConnectionId::new(1), tx);

        assert!(sender.send(ServerMessage::UserLeft {
            user_id: "a".into()
        }));
        // Queue full: dropped, not blocked
        assert!(!sender.send(ServerMessage::UserLeft {
            user_id: "b".into()
        }));

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, ServerMessage::UserLeft { user_id } if user_id == "a"));
    }
}

//! Signaling message vocabulary
//!
//! JSON text frames with an explicit `type` tag (kebab-case) and camelCase
//! fields. Handshake blobs (`payload`, `candidate`) are opaque values the
//! relay forwards without inspection.
//!
//! Addressing rules: `offer`, `answer`, and `ice-candidate` carry an
//! explicit `targetId` and are delivered to that one connection only, since
//! each is a leg of a specific pairwise handshake. Everything else is
//! scoped to the sender's room. `fromId` on relayed messages is always the
//! server-assigned connection ID of the originating socket; any
//! client-claimed value is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::{BroadcasterInfo, ConnectionId, RoomId, Role};

/// Messages a client sends to the relay
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a room with a declared identity and role, implicitly leaving
    /// any previous room
    JoinRoom {
        room_id: RoomId,
        user_id: String,
        role: Role,
    },

    /// Session description offer for one specific peer
    Offer {
        payload: Value,
        target_id: ConnectionId,
    },

    /// Session description answer for one specific peer
    Answer {
        payload: Value,
        target_id: ConnectionId,
    },

    /// Network candidate for one specific peer
    IceCandidate {
        candidate: Value,
        target_id: ConnectionId,
    },

    /// Chat message for the sender's whole room
    #[serde(rename = "chat-message")]
    Chat(ChatMessage),

    /// Publisher announcement that its media stream is live
    BroadcastStarted { room_id: RoomId, user_id: String },

    /// Ask for the current publishers of a room
    RequestBroadcasters { room_id: RoomId },
}

/// Messages the relay sends to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Join acknowledgement, with the member count including the joiner
    RoomJoined {
        room_id: RoomId,
        member_count: usize,
    },

    /// A new member joined the recipient's room
    UserJoined {
        user_id: String,
        role: Role,
        connection_id: ConnectionId,
    },

    /// A member left the recipient's room
    UserLeft { user_id: String },

    /// Current publishers of the queried room
    BroadcastersList {
        broadcasters: Vec<BroadcasterInfo>,
    },

    /// A publisher in the recipient's room went live
    BroadcastStarted {
        connection_id: ConnectionId,
        user_id: String,
    },

    /// Relayed offer; `from_id` is the server-assigned sender ID
    Offer {
        payload: Value,
        from_id: ConnectionId,
    },

    /// Relayed answer
    Answer {
        payload: Value,
        from_id: ConnectionId,
    },

    /// Relayed network candidate
    IceCandidate {
        candidate: Value,
        from_id: ConnectionId,
    },

    /// Chat message, forwarded verbatim to the whole room
    #[serde(rename = "chat-message")]
    Chat(ChatMessage),

    /// Local error acknowledgement, sent only to the offending sender
    Error { message: String },
}

/// A room-scoped chat message
///
/// Forwarded unmodified. Attachment metadata and any other fields this
/// relay does not know about ride along in `extra` and survive the trip
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Room hint supplied by some clients; the relay scopes delivery by the
    /// sender's registered room, not this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,

    /// Display identity of the author
    pub user_id: String,

    /// Message text
    pub message: String,

    /// Client-supplied timestamp, passed through untouched
    pub timestamp: String,

    /// Any additional fields (attachment name, size, data URL, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

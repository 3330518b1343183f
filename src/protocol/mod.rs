//! Wire protocol for the signaling relay
//!
//! Defines the logical message vocabulary exchanged over the per-client
//! WebSocket channel. Framing and reconnection policy belong to the
//! transport layer; this module only knows about JSON text payloads.

pub mod message;

pub use message::{ChatMessage, ClientMessage, ServerMessage};

//! Room-scoped WebRTC signaling relay
//!
//! One publisher's screen stream reaches many viewers in a shared room over
//! direct peer links; this crate is the third party that brokers the
//! connection-setup metadata. It tracks which connections occupy which
//! rooms, relays the offer/answer/candidate exchange between specific
//! peers, and fans out room-scoped presence and chat events. Media never
//! touches this process, nothing is persisted, and a restart forgets every
//! room.
//!
//! # Components
//!
//! - [`registry`]: connection registry with the embedded room directory,
//!   the single source of truth for membership
//! - [`router`]: stateless message dispatch (targeted handshake relay,
//!   room fan-out)
//! - [`presence`]: join/leave notifications and publisher discovery
//! - [`server`]: WebSocket accept loop and per-connection tasks
//! - [`protocol`]: the JSON message vocabulary
//!
//! # Example
//!
//! ```no_run
//! use roomcast::{ServerConfig, SignalServer};
//!
//! #[tokio::main]
//! async fn main() -> roomcast::Result<()> {
//!     let config = ServerConfig::with_addr("127.0.0.1:9090".parse().unwrap());
//!     let server = SignalServer::new(config);
//!     server.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```

pub mod error;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;

pub use error::{Error, Result};
pub use presence::PresenceService;
pub use protocol::{ChatMessage, ClientMessage, ServerMessage};
pub use registry::{
    BroadcasterInfo, ConnectionId, ConnectionRegistry, RegistryError, RoomId, Role,
};
pub use router::SignalingRouter;
pub use server::{ServerConfig, SignalServer};

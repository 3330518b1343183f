//! Connection registry and embedded room directory
//!
//! The registry is the single source of truth for "who is where": per
//! connected client it tracks identity, room, and role. The room directory
//! (room to member set) lives inside the same structure, behind the same
//! lock, so the one-room-per-connection invariant cannot drift from the
//! per-connection records.
//!
//! # Architecture
//!
//! ```text
//!                    Arc<ConnectionRegistry>
//!               ┌───────────────────────────────┐
//!               │ connections: HashMap<Id,      │
//!               │   ConnectionEntry {           │
//!               │     user_id, membership,      │
//!               │     sender: PeerSender,       │
//!               │   }                           │
//!               │ >                             │
//!               │ rooms: HashMap<RoomId,        │
//!               │   HashSet<ConnectionId>>      │
//!               └──────────────┬────────────────┘
//!                              │
//!            ┌─────────────────┼─────────────────┐
//!            │                 │                 │
//!            ▼                 ▼                 ▼
//!      [SignalingRouter] [PresenceService] [connection task]
//!      targeted relay    join/leave +      register /
//!      and room fan-out  discovery         unregister
//! ```
//!
//! Mutations return snapshots (member count, peer senders, publisher
//! roster) computed under the write lock, so the derived notifications the
//! presence layer emits are never computed against half-applied state.

pub mod connection;
pub mod error;
pub mod store;

pub use connection::{BroadcasterInfo, ConnectionId, ConnectionInfo, Membership, PeerSender, RoomId, Role};
pub use error::RegistryError;
pub use store::{ConnectionRegistry, Departure, JoinSnapshot};

//! Connection registry implementation
//!
//! The central registry that tracks which connections occupy which rooms.
//! It is the single source of truth for membership; the room directory is
//! embedded here, guarded by the same lock, so it can never drift from the
//! per-connection records.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};

use super::connection::{
    BroadcasterInfo, ConnectionEntry, ConnectionId, ConnectionInfo, Membership, PeerSender, RoomId,
    Role,
};
use super::error::RegistryError;
use crate::protocol::ServerMessage;

/// Everything a caller needs to announce a join, computed under the same
/// write lock as the membership mutation itself
///
/// The member count and rosters are read-after-write snapshots: they reflect
/// the just-joined member and can never observe a half-applied concurrent
/// join or leave.
#[derive(Debug)]
pub struct JoinSnapshot {
    /// The room that was joined
    pub room: RoomId,
    /// Member count including the joiner
    pub member_count: usize,
    /// The joiner's own sender, for the acknowledgement
    pub joiner: PeerSender,
    /// Senders for every other current room member
    pub peers: Vec<PeerSender>,
    /// Publishers currently in the room, excluding the joiner
    pub broadcasters: Vec<BroadcasterInfo>,
    /// Room implicitly left by this join, if the connection was elsewhere
    pub vacated: Option<RoomId>,
}

/// Everything a caller needs to announce a departure
#[derive(Debug)]
pub struct Departure {
    /// The room the connection vacated
    pub room: RoomId,
    /// The departing member's display identity
    pub user_id: String,
    /// Senders for the remaining room members (may be empty)
    pub remaining: Vec<PeerSender>,
}

/// Central registry for all live connections
///
/// Thread-safe via `RwLock`. Mutations (`join`, `unregister`) take the write
/// lock and return snapshots of the derived state callers broadcast from, so
/// membership mutation and notification computation form one logical
/// critical section. The registry itself emits no messages; wire-format
/// concerns stay out of the data layer.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

struct RegistryInner {
    /// Per-connection records
    connections: HashMap<ConnectionId, ConnectionEntry>,

    /// Room directory: room to member set. Mutated only by `join` and
    /// `unregister` under the same lock as `connections`. Invariant: a
    /// connection ID appears in at most one room's member set.
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl RegistryInner {
    /// Remove `id` from its current room, dropping the room if it empties.
    /// Returns the vacated room, if any.
    fn leave_current_room(&mut self, id: ConnectionId) -> Option<RoomId> {
        let membership = self.connections.get_mut(&id)?.membership.take()?;
        if let Some(members) = self.rooms.get_mut(&membership.room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(&membership.room);
                tracing::debug!(room = %membership.room, "Room emptied, removed");
            }
        }
        Some(membership.room)
    }

    /// Senders for members of `room`, optionally skipping `except`.
    fn room_senders(&self, room: &RoomId, except: Option<ConnectionId>) -> Vec<PeerSender> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|id| Some(*id) != except)
                    .filter_map(|id| self.connections.get(&id))
                    .map(|entry| entry.sender.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Publishers in `room`, optionally skipping `except`.
    ///
    /// A linear scan over the member set. Fine at expected room sizes; the
    /// cost is O(room size) per discovery query.
    fn broadcasters(&self, room: &RoomId, except: Option<ConnectionId>) -> Vec<BroadcasterInfo> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|id| Some(*id) != except)
                    .filter_map(|id| {
                        let entry = self.connections.get(&id)?;
                        let membership = entry.membership.as_ref()?;
                        if membership.role.is_publisher() {
                            Some(BroadcasterInfo {
                                connection_id: id,
                                user_id: entry.user_id.clone().unwrap_or_default(),
                            })
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                connections: HashMap::new(),
                rooms: HashMap::new(),
            }),
        }
    }

    /// Register a connection when its channel opens
    ///
    /// Room and role are unset until the first join. Returns the delivery
    /// handle for the new connection.
    pub async fn register(
        &self,
        id: ConnectionId,
        tx: mpsc::Sender<ServerMessage>,
    ) -> PeerSender {
        let sender = PeerSender::new(id, tx);
        let mut inner = self.inner.write().await;
        inner
            .connections
            .insert(id, ConnectionEntry::new(sender.clone()));

        tracing::debug!(
            connection_id = id.get(),
            connections = inner.connections.len(),
            "Connection registered"
        );
        sender
    }

    /// Join a room, implicitly leaving any previous one first
    ///
    /// A connection is a member of at most one room at a time; the old
    /// membership is replaced atomically, so no observer can see the
    /// connection in two rooms. The implicit leave is silent (no departure
    /// notification), matching a rejoin's semantics of replacement rather
    /// than departure.
    pub async fn join(
        &self,
        id: ConnectionId,
        room: RoomId,
        user_id: String,
        role: Role,
    ) -> Result<JoinSnapshot, RegistryError> {
        let mut inner = self.inner.write().await;

        if !inner.connections.contains_key(&id) {
            return Err(RegistryError::ConnectionNotFound(id));
        }

        let vacated = inner
            .leave_current_room(id)
            .filter(|prev| *prev != room);

        inner.rooms.entry(room.clone()).or_default().insert(id);

        let entry = inner
            .connections
            .get_mut(&id)
            .ok_or(RegistryError::ConnectionNotFound(id))?;
        entry.user_id = Some(user_id.clone());
        entry.membership = Some(Membership {
            room: room.clone(),
            role,
        });
        let joiner = entry.sender.clone();

        let member_count = inner.rooms.get(&room).map_or(0, HashSet::len);
        let peers = inner.room_senders(&room, Some(id));
        let broadcasters = inner.broadcasters(&room, Some(id));

        tracing::info!(
            connection_id = id.get(),
            room = %room,
            user_id = %user_id,
            role = ?role,
            members = member_count,
            "Joined room"
        );

        Ok(JoinSnapshot {
            room,
            member_count,
            joiner,
            peers,
            broadcasters,
            vacated,
        })
    }

    /// Remove a connection from the registry and from any room it belonged to
    ///
    /// Unconditional cleanup on channel close; never retried since the
    /// channel cannot be resumed under the same identifier. Returns the
    /// departure details if the connection had joined a room, or `None` if
    /// it disconnected before ever joining (in which case no notification is
    /// owed to anyone).
    pub async fn unregister(&self, id: ConnectionId) -> Option<Departure> {
        let mut inner = self.inner.write().await;

        let entry = inner.connections.remove(&id)?;
        let session_secs = entry.connected_at.elapsed().as_secs();
        let membership = match entry.membership {
            Some(m) => m,
            None => {
                tracing::debug!(connection_id = id.get(), "Unregistered (never joined a room)");
                return None;
            }
        };

        if let Some(members) = inner.rooms.get_mut(&membership.room) {
            members.remove(&id);
            if members.is_empty() {
                inner.rooms.remove(&membership.room);
                tracing::debug!(room = %membership.room, "Room emptied, removed");
            }
        }

        let remaining = inner.room_senders(&membership.room, None);

        tracing::info!(
            connection_id = id.get(),
            room = %membership.room,
            remaining = remaining.len(),
            session_secs,
            "Left room on disconnect"
        );

        Some(Departure {
            room: membership.room,
            user_id: entry.user_id.unwrap_or_default(),
            remaining,
        })
    }

    /// Look up a connection's current state
    pub async fn lookup(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let inner = self.inner.read().await;
        let entry = inner.connections.get(&id)?;
        Some(ConnectionInfo {
            id,
            user_id: entry.user_id.clone(),
            membership: entry.membership.clone(),
        })
    }

    /// Get the delivery handle for a connection, if it is still registered
    pub async fn sender(&self, id: ConnectionId) -> Option<PeerSender> {
        let inner = self.inner.read().await;
        inner.connections.get(&id).map(|e| e.sender.clone())
    }

    /// Member IDs of a room (empty if the room does not exist)
    pub async fn members_of(&self, room: &RoomId) -> HashSet<ConnectionId> {
        let inner = self.inner.read().await;
        inner.rooms.get(room).cloned().unwrap_or_default()
    }

    /// Number of members in a room (zero if the room does not exist)
    pub async fn member_count(&self, room: &RoomId) -> usize {
        let inner = self.inner.read().await;
        inner.rooms.get(room).map_or(0, HashSet::len)
    }

    /// Publishers currently in a room
    ///
    /// Computed fresh on every call; the roster never caches across
    /// requests, so a publisher that disconnected a moment ago is already
    /// absent. Empty if the room does not exist.
    pub async fn broadcasters_of(&self, room: &RoomId) -> Vec<BroadcasterInfo> {
        let inner = self.inner.read().await;
        inner.broadcasters(room, None)
    }

    /// Senders for every member of the room `id` currently belongs to
    ///
    /// With `include_self` false, the connection's own sender is skipped.
    /// Empty if the connection is unknown or has not joined a room.
    pub async fn room_peers(&self, id: ConnectionId, include_self: bool) -> Vec<PeerSender> {
        let inner = self.inner.read().await;
        let Some(entry) = inner.connections.get(&id) else {
            return Vec::new();
        };
        let Some(membership) = entry.membership.as_ref() else {
            return Vec::new();
        };
        let except = if include_self { None } else { Some(id) };
        inner.room_senders(&membership.room, except)
    }

    /// Total number of live connections
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Total number of non-empty rooms
    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn register(registry: &ConnectionRegistry, raw: u64) -> ConnectionId {
        let id = ConnectionId::new(raw);
        let (tx, _rx) = mpsc::channel(8);
        registry.register(id, tx).await;
        id
    }

    #[tokio::test]
    async fn test_join_creates_room_and_counts_joiner() {
        let registry = ConnectionRegistry::new();
        let a = register(&registry, 1).await;
        let room = RoomId::new("r1");

        let snapshot = registry
            .join(a, room.clone(), "alice".into(), Role::Publisher)
            .await
            .unwrap();

        // Count reflects the just-joined member
        assert_eq!(snapshot.member_count, 1);
        assert!(snapshot.peers.is_empty());
        assert!(snapshot.vacated.is_none());
        assert_eq!(registry.member_count(&room).await, 1);
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_count_matches_membership_at_every_step() {
        let registry = ConnectionRegistry::new();
        let room = RoomId::new("r1");

        for raw in 1..=4 {
            let id = register(&registry, raw).await;
            registry
                .join(id, room.clone(), format!("user{raw}"), Role::Subscriber)
                .await
                .unwrap();
            assert_eq!(
                registry.member_count(&room).await,
                registry.members_of(&room).await.len()
            );
        }

        for raw in 1..=4 {
            registry.unregister(ConnectionId::new(raw)).await;
            assert_eq!(
                registry.member_count(&room).await,
                registry.members_of(&room).await.len()
            );
        }

        // Last member gone: room is destroyed, not left empty
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejoin_replaces_membership_atomically() {
        let registry = ConnectionRegistry::new();
        let a = register(&registry, 1).await;
        let b = register(&registry, 2).await;
        let r1 = RoomId::new("r1");
        let r2 = RoomId::new("r2");

        registry
            .join(a, r1.clone(), "alice".into(), Role::Publisher)
            .await
            .unwrap();
        registry
            .join(b, r1.clone(), "bob".into(), Role::Subscriber)
            .await
            .unwrap();

        let snapshot = registry
            .join(a, r2.clone(), "alice".into(), Role::Publisher)
            .await
            .unwrap();

        assert_eq!(snapshot.vacated, Some(r1.clone()));
        // Old room shrank, new room grew, and no ID is in both member sets
        assert_eq!(registry.member_count(&r1).await, 1);
        assert_eq!(registry.member_count(&r2).await, 1);
        assert!(!registry.members_of(&r1).await.contains(&a));
        assert!(registry.members_of(&r2).await.contains(&a));
    }

    #[tokio::test]
    async fn test_rejoin_same_room_does_not_vacate() {
        let registry = ConnectionRegistry::new();
        let a = register(&registry, 1).await;
        let room = RoomId::new("r1");

        registry
            .join(a, room.clone(), "alice".into(), Role::Subscriber)
            .await
            .unwrap();
        let snapshot = registry
            .join(a, room.clone(), "alice".into(), Role::Publisher)
            .await
            .unwrap();

        assert!(snapshot.vacated.is_none());
        assert_eq!(snapshot.member_count, 1);
        // Role was replaced by the rejoin
        let info = registry.lookup(a).await.unwrap();
        assert_eq!(info.membership.unwrap().role, Role::Publisher);
    }

    #[tokio::test]
    async fn test_unregister_before_join_vacates_nothing() {
        let registry = ConnectionRegistry::new();
        let a = register(&registry, 1).await;

        assert!(registry.unregister(a).await.is_none());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_unregister_returns_remaining_members() {
        let registry = ConnectionRegistry::new();
        let a = register(&registry, 1).await;
        let b = register(&registry, 2).await;
        let c = register(&registry, 3).await;
        let room = RoomId::new("r1");

        for (id, name) in [(a, "alice"), (b, "bob"), (c, "carol")] {
            registry
                .join(id, room.clone(), name.into(), Role::Subscriber)
                .await
                .unwrap();
        }

        let departure = registry.unregister(a).await.unwrap();
        assert_eq!(departure.room, room);
        assert_eq!(departure.user_id, "alice");
        assert_eq!(departure.remaining.len(), 2);

        // Departed connection is fully gone
        assert!(registry.lookup(a).await.is_none());
        assert!(registry.sender(a).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcasters_reflect_current_registration_only() {
        let registry = ConnectionRegistry::new();
        let a = register(&registry, 1).await;
        let b = register(&registry, 2).await;
        let c = register(&registry, 3).await;
        let room = RoomId::new("r1");

        registry
            .join(a, room.clone(), "alice".into(), Role::Publisher)
            .await
            .unwrap();
        registry
            .join(b, room.clone(), "bob".into(), Role::Publisher)
            .await
            .unwrap();
        registry
            .join(c, room.clone(), "carol".into(), Role::Subscriber)
            .await
            .unwrap();

        let mut roster = registry.broadcasters_of(&room).await;
        roster.sort_by_key(|b| b.connection_id.get());
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].user_id, "alice");
        assert_eq!(roster[1].user_id, "bob");

        // A publisher that disconnects is absent from the next query
        registry.unregister(a).await;
        let roster = registry.broadcasters_of(&room).await;
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, "bob");
    }

    #[tokio::test]
    async fn test_queries_on_missing_room_are_empty() {
        let registry = ConnectionRegistry::new();
        let ghost = RoomId::new("nowhere");

        assert_eq!(registry.member_count(&ghost).await, 0);
        assert!(registry.members_of(&ghost).await.is_empty());
        assert!(registry.broadcasters_of(&ghost).await.is_empty());
    }

    #[tokio::test]
    async fn test_join_unknown_connection_fails() {
        let registry = ConnectionRegistry::new();
        let result = registry
            .join(
                ConnectionId::new(99),
                RoomId::new("r1"),
                "ghost".into(),
                Role::Subscriber,
            )
            .await;
        assert_eq!(
            result.unwrap_err(),
            RegistryError::ConnectionNotFound(ConnectionId::new(99))
        );
    }

    #[tokio::test]
    async fn test_join_snapshot_contains_existing_broadcasters() {
        let registry = ConnectionRegistry::new();
        let a = register(&registry, 1).await;
        let b = register(&registry, 2).await;
        let room = RoomId::new("r1");

        registry
            .join(a, room.clone(), "alice".into(), Role::Publisher)
            .await
            .unwrap();
        let snapshot = registry
            .join(b, room.clone(), "bob".into(), Role::Subscriber)
            .await
            .unwrap();

        assert_eq!(snapshot.member_count, 2);
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.broadcasters.len(), 1);
        assert_eq!(snapshot.broadcasters[0].connection_id, a);
        assert_eq!(snapshot.broadcasters[0].user_id, "alice");
    }
}

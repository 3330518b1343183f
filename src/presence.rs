//! Presence and discovery service
//!
//! Computes room membership counts, publisher discovery lists, and
//! join/leave notifications on top of the registry. All derived state comes
//! from the snapshots the registry returns under its own lock, so a member
//! count or publisher roster is never computed against a half-applied
//! concurrent join or leave.

use std::sync::Arc;

use crate::protocol::ServerMessage;
use crate::registry::{ConnectionId, ConnectionRegistry, RoomId, Role};

/// Announces joins and departures and answers discovery queries
///
/// Per-connection lifecycle is `open (no room)` -> `joined(room, role)`,
/// with rejoins replacing the membership in place and disconnect terminal.
pub struct PresenceService {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceService {
    /// Create a presence service over a shared registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Handle a join request
    ///
    /// Acknowledges the joiner with the post-join member count, notifies
    /// every other room member, and, for a subscriber, immediately sends the
    /// current publisher roster so it can start the offer exchange without a
    /// separate discovery round trip.
    pub async fn handle_join(
        &self,
        id: ConnectionId,
        room: RoomId,
        user_id: String,
        role: Role,
    ) {
        let snapshot = match self.registry.join(id, room, user_id.clone(), role).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // The connection disconnected while the request was in flight
                tracing::debug!(connection_id = id.get(), error = %e, "Join raced with disconnect");
                return;
            }
        };

        if let Some(vacated) = &snapshot.vacated {
            tracing::debug!(
                connection_id = id.get(),
                from = %vacated,
                to = %snapshot.room,
                "Moved rooms"
            );
        }

        snapshot.joiner.send(ServerMessage::RoomJoined {
            room_id: snapshot.room.clone(),
            member_count: snapshot.member_count,
        });

        for peer in &snapshot.peers {
            peer.send(ServerMessage::UserJoined {
                user_id: user_id.clone(),
                role,
                connection_id: id,
            });
        }

        if role == Role::Subscriber {
            snapshot.joiner.send(ServerMessage::BroadcastersList {
                broadcasters: snapshot.broadcasters,
            });
        }
    }

    /// Handle a publisher discovery request
    ///
    /// The roster is a fresh scan of current membership, delivered only to
    /// the requester. A room that no longer exists yields an empty list.
    pub async fn send_broadcasters(&self, id: ConnectionId, room: RoomId) {
        let broadcasters = self.registry.broadcasters_of(&room).await;

        tracing::debug!(
            connection_id = id.get(),
            room = %room,
            publishers = broadcasters.len(),
            "Discovery request"
        );

        if let Some(sender) = self.registry.sender(id).await {
            sender.send(ServerMessage::BroadcastersList { broadcasters });
        }
    }

    /// Handle a channel close
    ///
    /// Evicts the connection and, only if it had joined a room, announces
    /// the departure to the remaining members. A connection that never
    /// joined produces zero notifications.
    pub async fn handle_disconnect(&self, id: ConnectionId) {
        let Some(departure) = self.registry.unregister(id).await else {
            return;
        };

        for peer in &departure.remaining {
            peer.send(ServerMessage::UserLeft {
                user_id: departure.user_id.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::ServerMessage;

    struct TestClient {
        id: ConnectionId,
        rx: mpsc::Receiver<ServerMessage>,
    }

    impl TestClient {
        async fn connect(registry: &ConnectionRegistry, raw: u64) -> Self {
            let id = ConnectionId::new(raw);
            let (tx, rx) = mpsc::channel(16);
            registry.register(id, tx).await;
            Self { id, rx }
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut messages = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                messages.push(msg);
            }
            messages
        }
    }

    fn service() -> (Arc<ConnectionRegistry>, PresenceService) {
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = PresenceService::new(Arc::clone(&registry));
        (registry, presence)
    }

    #[tokio::test]
    async fn test_join_acks_with_fresh_member_count() {
        let (registry, presence) = service();
        let mut a = TestClient::connect(&registry, 1).await;
        let mut b = TestClient::connect(&registry, 2).await;

        presence
            .handle_join(a.id, RoomId::new("r1"), "alice".into(), Role::Publisher)
            .await;
        presence
            .handle_join(b.id, RoomId::new("r1"), "bob".into(), Role::Publisher)
            .await;

        let acks = a.drain();
        assert_eq!(
            acks[0],
            ServerMessage::RoomJoined {
                room_id: RoomId::new("r1"),
                member_count: 1,
            }
        );
        // Alice also hears about Bob joining
        assert_eq!(
            acks[1],
            ServerMessage::UserJoined {
                user_id: "bob".into(),
                role: Role::Publisher,
                connection_id: b.id,
            }
        );

        // Bob's own ack already counts Bob
        assert_eq!(
            b.drain()[0],
            ServerMessage::RoomJoined {
                room_id: RoomId::new("r1"),
                member_count: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_subscriber_join_gets_automatic_roster() {
        let (registry, presence) = service();
        let a = TestClient::connect(&registry, 1).await;
        let mut b = TestClient::connect(&registry, 2).await;

        presence
            .handle_join(a.id, RoomId::new("r1"), "alice".into(), Role::Publisher)
            .await;
        presence
            .handle_join(b.id, RoomId::new("r1"), "bob".into(), Role::Subscriber)
            .await;

        let messages = b.drain();
        let roster = messages
            .iter()
            .find_map(|m| match m {
                ServerMessage::BroadcastersList { broadcasters } => Some(broadcasters),
                _ => None,
            })
            .expect("subscriber should receive a roster on join");
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].connection_id, a.id);
    }

    #[tokio::test]
    async fn test_publisher_join_gets_no_automatic_roster() {
        let (registry, presence) = service();
        let a = TestClient::connect(&registry, 1).await;
        let mut b = TestClient::connect(&registry, 2).await;

        presence
            .handle_join(a.id, RoomId::new("r1"), "alice".into(), Role::Publisher)
            .await;
        presence
            .handle_join(b.id, RoomId::new("r1"), "bob".into(), Role::Publisher)
            .await;

        assert!(!b
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::BroadcastersList { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_before_join_is_silent() {
        let (registry, presence) = service();
        let a = TestClient::connect(&registry, 1).await;
        let mut b = TestClient::connect(&registry, 2).await;

        presence
            .handle_join(b.id, RoomId::new("r1"), "bob".into(), Role::Subscriber)
            .await;
        b.drain();

        presence.handle_disconnect(a.id).await;
        assert!(b.drain().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_notifies_remaining_members_once() {
        let (registry, presence) = service();
        let a = TestClient::connect(&registry, 1).await;
        let mut b = TestClient::connect(&registry, 2).await;
        let mut c = TestClient::connect(&registry, 3).await;

        for (client, name, role) in [
            (&a, "alice", Role::Publisher),
            (&b, "bob", Role::Subscriber),
            (&c, "carol", Role::Subscriber),
        ] {
            presence
                .handle_join(client.id, RoomId::new("r1"), name.into(), role)
                .await;
        }
        b.drain();
        c.drain();

        presence.handle_disconnect(a.id).await;

        for client in [&mut b, &mut c] {
            let left: Vec<_> = client
                .drain()
                .into_iter()
                .filter(|m| matches!(m, ServerMessage::UserLeft { .. }))
                .collect();
            assert_eq!(
                left,
                vec![ServerMessage::UserLeft {
                    user_id: "alice".into()
                }]
            );
        }
    }

    #[tokio::test]
    async fn test_roster_excludes_disconnected_publisher() {
        let (registry, presence) = service();
        let a = TestClient::connect(&registry, 1).await;
        let mut b = TestClient::connect(&registry, 2).await;

        presence
            .handle_join(a.id, RoomId::new("r1"), "alice".into(), Role::Publisher)
            .await;
        presence
            .handle_join(b.id, RoomId::new("r1"), "bob".into(), Role::Subscriber)
            .await;
        b.drain();

        presence.handle_disconnect(a.id).await;
        b.drain();

        presence.send_broadcasters(b.id, RoomId::new("r1")).await;
        assert_eq!(
            b.drain(),
            vec![ServerMessage::BroadcastersList {
                broadcasters: vec![]
            }]
        );
    }
}

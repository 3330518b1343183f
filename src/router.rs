//! Signaling router
//!
//! Stateless dispatch over the registry: given a decoded client message,
//! delivers it to the correct recipients. Targeted handshake messages
//! (`offer`, `answer`, `ice-candidate`) go to exactly one connection and are
//! silently dropped if the target disconnected; the initiating client's own
//! peer-link timeout is the failure signal, so no error flows back. Room
//! messages fan out to the sender's current room, each recipient delivered
//! independently.

use std::sync::Arc;

use crate::presence::PresenceService;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionId, ConnectionRegistry, RoomId};

/// Routes decoded client messages to their recipients
///
/// Owns no state of its own beyond references to the registry and the
/// presence service.
pub struct SignalingRouter {
    registry: Arc<ConnectionRegistry>,
    presence: PresenceService,
}

impl SignalingRouter {
    /// Create a router over a shared registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        let presence = PresenceService::new(Arc::clone(&registry));
        Self { registry, presence }
    }

    /// Dispatch one message from `from` to its recipients
    pub async fn dispatch(&self, from: ConnectionId, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom {
                room_id,
                user_id,
                role,
            } => {
                self.presence.handle_join(from, room_id, user_id, role).await;
            }

            ClientMessage::Offer { payload, target_id } => {
                self.relay(
                    from,
                    target_id,
                    ServerMessage::Offer {
                        payload,
                        from_id: from,
                    },
                )
                .await;
            }

            ClientMessage::Answer { payload, target_id } => {
                self.relay(
                    from,
                    target_id,
                    ServerMessage::Answer {
                        payload,
                        from_id: from,
                    },
                )
                .await;
            }

            ClientMessage::IceCandidate {
                candidate,
                target_id,
            } => {
                self.relay(
                    from,
                    target_id,
                    ServerMessage::IceCandidate {
                        candidate,
                        from_id: from,
                    },
                )
                .await;
            }

            ClientMessage::Chat(chat) => {
                // Delivered to every member of the sender's room, the
                // sender's own sessions included, so all observers see the
                // same stream of messages.
                let members = self.registry.room_peers(from, true).await;
                tracing::debug!(
                    connection_id = from.get(),
                    recipients = members.len(),
                    "Chat fan-out"
                );
                for member in &members {
                    member.send(ServerMessage::Chat(chat.clone()));
                }
            }

            ClientMessage::BroadcastStarted { room_id, user_id } => {
                self.broadcast_started(from, room_id, user_id).await;
            }

            ClientMessage::RequestBroadcasters { room_id } => {
                self.presence.send_broadcasters(from, room_id).await;
            }
        }
    }

    /// Handle a channel close: evict the connection and announce departure
    pub async fn connection_closed(&self, id: ConnectionId) {
        self.presence.handle_disconnect(id).await;
    }

    /// Deliver a handshake message to one specific target
    async fn relay(&self, from: ConnectionId, target: ConnectionId, msg: ServerMessage) {
        match self.registry.sender(target).await {
            Some(peer) => {
                tracing::debug!(
                    from = from.get(),
                    target = target.get(),
                    "Relaying signaling message"
                );
                peer.send(msg);
            }
            None => {
                // Expected when the target disconnected mid-handshake;
                // recoverable at the peer-link layer
                tracing::debug!(
                    from = from.get(),
                    target = target.get(),
                    "Signaling target gone, dropping"
                );
            }
        }
    }

    /// Announce a live stream to the rest of the sender's room
    ///
    /// Only a member holding the `publisher` role may announce; anything
    /// else is a client protocol error acknowledged to the sender alone.
    /// The relay substitutes the sender's connection ID so subscribers get
    /// a usable signaling target.
    async fn broadcast_started(&self, from: ConnectionId, room_id: RoomId, user_id: String) {
        let is_publisher = self
            .registry
            .lookup(from)
            .await
            .and_then(|info| info.membership)
            .is_some_and(|m| m.role.is_publisher());

        if !is_publisher {
            tracing::warn!(
                connection_id = from.get(),
                room = %room_id,
                "broadcast-started from non-publisher"
            );
            if let Some(sender) = self.registry.sender(from).await {
                sender.send(ServerMessage::Error {
                    message: "broadcast-started requires the publisher role".into(),
                });
            }
            return;
        }

        let peers = self.registry.room_peers(from, false).await;
        tracing::info!(
            connection_id = from.get(),
            room = %room_id,
            user_id = %user_id,
            notified = peers.len(),
            "Broadcast started"
        );
        for peer in &peers {
            peer.send(ServerMessage::BroadcastStarted {
                connection_id: from,
                user_id: user_id.clone(),
            });
        }
    }
}

//! Per-connection WebSocket handler
//!
//! One task per client channel. The task owns the socket's sink half and a
//! bounded outbound queue other components deliver into; the read half feeds
//! decoded messages to the router. Channel close, for any reason, always
//! ends in `unregister` plus the departure notification.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::router::SignalingRouter;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Drive a single client connection to completion
pub(crate) async fn run_connection(
    ws: WebSocketStream<TcpStream>,
    id: ConnectionId,
    peer_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    router: Arc<SignalingRouter>,
    outbound_queue: usize,
) {
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(outbound_queue);
    registry.register(id, tx).await;

    tracing::info!(connection_id = id.get(), peer = %peer_addr, "Client connected");

    loop {
        tokio::select! {
            // Queued deliveries for this client
            Some(msg) = rx.recv() => {
                if send_message(&mut sink, &msg).await.is_err() {
                    break;
                }
            }

            // Frames from this client
            frame = stream.next() => {
                match handle_frame(frame, id, &mut sink, &router).await {
                    FrameOutcome::Continue => {}
                    FrameOutcome::Closed => break,
                }
            }
        }
    }

    // Unconditional cleanup; the channel cannot resume under this ID
    router.connection_closed(id).await;
    tracing::info!(connection_id = id.get(), peer = %peer_addr, "Client disconnected");
}

enum FrameOutcome {
    Continue,
    Closed,
}

async fn handle_frame(
    frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
    id: ConnectionId,
    sink: &mut WsSink,
    router: &SignalingRouter,
) -> FrameOutcome {
    match frame {
        Some(Ok(Message::Text(text))) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(msg) => router.dispatch(id, msg).await,
                Err(e) => {
                    // Malformed request: acknowledged to the sender only,
                    // never propagated to other members
                    tracing::warn!(
                        connection_id = id.get(),
                        error = %e,
                        "Malformed message"
                    );
                    let ack = ServerMessage::Error {
                        message: format!("malformed message: {e}"),
                    };
                    if send_message(sink, &ack).await.is_err() {
                        return FrameOutcome::Closed;
                    }
                }
            }
            FrameOutcome::Continue
        }
        Some(Ok(Message::Ping(data))) => {
            let _ = sink.send(Message::Pong(data)).await;
            FrameOutcome::Continue
        }
        Some(Ok(Message::Binary(_))) => {
            tracing::warn!(connection_id = id.get(), "Ignoring binary frame");
            FrameOutcome::Continue
        }
        Some(Ok(Message::Close(_))) | None => FrameOutcome::Closed,
        Some(Err(e)) => {
            tracing::debug!(connection_id = id.get(), error = %e, "WebSocket read error");
            FrameOutcome::Closed
        }
        Some(Ok(_)) => FrameOutcome::Continue,
    }
}

async fn send_message(
    sink: &mut WsSink,
    msg: &ServerMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server message");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}

//! roomcast: standalone signaling relay binary
//!
//! Accepts WebSocket connections, tracks room membership, and relays
//! offer/answer/candidate exchange plus room-scoped presence and chat.

use std::net::SocketAddr;

use clap::Parser;

use roomcast::{ServerConfig, SignalServer};

#[derive(Parser)]
#[command(name = "roomcast", about = "Room-scoped WebRTC signaling relay")]
struct Args {
    /// Address to listen on.
    #[arg(short, long, default_value = "0.0.0.0:9090")]
    bind: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> roomcast::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomcast=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = ServerConfig::with_addr(args.bind).max_connections(args.max_connections);
    let server = SignalServer::new(config);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

//! WebSocket signaling server
//!
//! Accept loop, per-connection handler tasks, and configuration.

pub mod config;
pub(crate) mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::SignalServer;

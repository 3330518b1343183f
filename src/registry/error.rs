//! Registry error types

use super::connection::ConnectionId;

/// Error type for registry operations
///
/// The registry has exactly one failure mode: operating on a connection that
/// is no longer (or never was) registered. This can race legitimately with a
/// disconnect, so callers treat it as a stale sender, never as fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The connection is not registered
    ConnectionNotFound(ConnectionId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::ConnectionNotFound(id) => {
                write!(f, "Connection not registered: {}", id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

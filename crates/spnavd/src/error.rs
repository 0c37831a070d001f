//! Error types for the spacenav daemon.

use crate::registry::RegistryError;

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Invalid config: {0}")]
    Config(String),

    /// Client registration rejected
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl DaemonError {
    /// Returns true if this error means another daemon owns the socket
    #[must_use]
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::AddrInUse)
    }
}

/// Result type alias using `DaemonError`
pub type Result<T> = std::result::Result<T, DaemonError>;

//! Error types for the device layer.

/// Errors raised by device backends and hotplug monitors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// I/O error while opening or reading a device node
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation is not supported by this backend
    #[error("Not available on this platform: {0}")]
    Unavailable(&'static str),

    /// None of the descriptor's paths could be opened
    #[error("Device not found: {0}")]
    NotFound(String),

    /// The discovery service itself failed
    #[error("Device discovery failed: {0}")]
    Discovery(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),
}

/// Result type alias using `DeviceError`
pub type Result<T> = std::result::Result<T, DeviceError>;

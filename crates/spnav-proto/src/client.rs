//! Consumer-side helper for talking to the spacenav daemon.
//!
//! Wraps a UNIX stream in the event and request codecs so applications can
//! read canonical events and adjust their sensitivity without touching the
//! raw frame layout.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use spnav_types::DeviceEvent;

use crate::frame::{EventFrame, FrameError};
use crate::transport::{CodecError, EventCodec, RequestCodec};

/// Default location of the daemon's listening socket
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/spnav.sock";

/// Environment variable overriding the socket location
pub const SOCKET_ENV: &str = "SPNAV_SOCKET";

/// Resolve the socket path from an optional override value.
///
/// An empty override is ignored.
#[must_use]
pub fn resolve_socket_path(env_value: Option<OsString>) -> PathBuf {
    env_value
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH), PathBuf::from)
}

/// Get the socket path for the spacenav daemon.
///
/// Honors `$SPNAV_SOCKET`, falling back to [`DEFAULT_SOCKET_PATH`].
#[must_use]
pub fn socket_path() -> PathBuf {
    resolve_socket_path(std::env::var_os(SOCKET_ENV))
}

/// Errors that can occur with the daemon client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),
}

/// Client connection to the spacenav daemon
pub struct SpnavClient {
    reader: FramedRead<OwnedReadHalf, EventCodec>,
    writer: FramedWrite<OwnedWriteHalf, RequestCodec>,
}

impl SpnavClient {
    /// Connect to the daemon at the default socket path.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the socket connection fails.
    pub async fn connect() -> Result<Self, ClientError> {
        Self::connect_to(socket_path()).await
    }

    /// Connect to the daemon at a custom socket path.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Io` if the socket connection fails.
    pub async fn connect_to(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).await?;
        debug!("Connected to daemon at {}", path.display());
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already connected stream.
    #[must_use]
    pub fn from_stream(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FramedRead::new(read_half, EventCodec::new()),
            writer: FramedWrite::new(write_half, RequestCodec::new()),
        }
    }

    /// Ask the daemon to scale future motion events by `sensitivity`.
    ///
    /// The daemon sends no acknowledgment. Non-positive or non-finite values
    /// make the daemon drop the connection.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` if the request cannot be written.
    pub async fn set_sensitivity(&mut self, sensitivity: f32) -> Result<(), ClientError> {
        self.writer.send(sensitivity).await?;
        Ok(())
    }

    /// Read the next raw frame. Returns `None` once the daemon closes the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` on a read error or a truncated frame.
    pub async fn next_frame(&mut self) -> Result<Option<EventFrame>, ClientError> {
        match self.reader.next().await {
            Some(frame) => Ok(Some(frame?)),
            None => Ok(None),
        }
    }

    /// Read and interpret the next event.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Codec` on a read error and `ClientError::Frame`
    /// if the daemon sent a frame that does not describe an event.
    pub async fn next_event(&mut self) -> Result<Option<DeviceEvent>, ClientError> {
        match self.next_frame().await? {
            Some(frame) => Ok(Some(frame.to_event()?)),
            None => Ok(None),
        }
    }
}

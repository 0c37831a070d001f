//! Registry of connected clients.
//!
//! Clients are owned by the registry and addressed by an opaque [`ClientId`]
//! that is never reused. Iteration order is newest first. Removing a client
//! never disturbs a traversal in progress: callers walk a [`ClientCursor`]
//! snapshot that skips clients removed after it was taken.
//!
//! Socket input is polled round robin, so a client that never stops writing
//! cannot keep the others from being read.

use std::collections::{HashMap, VecDeque};
use std::future::poll_fn;
use std::task::Poll;

use futures_util::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use spnav_proto::{CodecError, EventCodec, RequestCodec};

use crate::magellan::WindowId;

/// Sensitivity assigned to new clients
pub const DEFAULT_SENSITIVITY: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which dialect a client speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Unix,
    Window,
}

impl ClientKind {
    /// Whether this build accepts clients of this kind
    #[must_use]
    pub const fn is_supported(self) -> bool {
        match self {
            Self::Unix => true,
            Self::Window => cfg!(feature = "magellan"),
        }
    }
}

impl std::fmt::Display for ClientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unix => write!(f, "unix"),
            Self::Window => write!(f, "window"),
        }
    }
}

/// A connected UNIX-socket client, split into framed halves
#[derive(Debug)]
pub struct SocketTransport {
    pub(crate) reader: FramedRead<OwnedReadHalf, RequestCodec>,
    pub(crate) writer: FramedWrite<OwnedWriteHalf, EventCodec>,
}

impl SocketTransport {
    #[must_use]
    pub fn new(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FramedRead::new(read_half, RequestCodec::new()),
            writer: FramedWrite::new(write_half, EventCodec::new()),
        }
    }
}

/// How the daemon reaches a client
#[derive(Debug)]
pub enum Transport {
    Unix(SocketTransport),
    Window(WindowId),
}

impl Transport {
    #[must_use]
    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(SocketTransport::new(stream))
    }

    #[must_use]
    pub const fn kind(&self) -> ClientKind {
        match self {
            Self::Unix(_) => ClientKind::Unix,
            Self::Window(_) => ClientKind::Window,
        }
    }
}

/// One connected consumer
#[derive(Debug)]
pub struct Client {
    transport: Transport,
    sensitivity: f32,
    device_index: usize,
}

impl Client {
    fn new(transport: Transport) -> Self {
        Self {
            transport,
            sensitivity: DEFAULT_SENSITIVITY,
            device_index: 0,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ClientKind {
        self.transport.kind()
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    #[must_use]
    pub fn sensitivity(&self) -> f32 {
        self.sensitivity
    }

    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.sensitivity = sensitivity;
    }

    #[must_use]
    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn set_device_index(&mut self, device_index: usize) {
        self.device_index = device_index;
    }

    /// Window identifier for legacy-dialect clients
    #[must_use]
    pub fn window(&self) -> Option<WindowId> {
        match self.transport {
            Transport::Window(window) => Some(window),
            Transport::Unix(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Snapshot of the client order at the time it was taken.
///
/// Each traversal owns its cursor, so independent traversals never interfere.
#[derive(Debug)]
pub struct ClientCursor {
    ids: std::vec::IntoIter<ClientId>,
}

impl ClientCursor {
    /// Next client from the snapshot that is still registered
    pub fn next(&mut self, registry: &ClientRegistry) -> Option<ClientId> {
        self.ids.by_ref().find(|id| registry.contains(*id))
    }
}

/// Owner of every connected client
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<ClientId, Client>,
    // Newest first
    order: VecDeque<ClientId>,
    // Position in `order` where the next input scan starts
    scan_start: usize,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client reached through `transport`.
    ///
    /// The new client starts with sensitivity 1.0 and device index 0 and is
    /// placed at the head of the iteration order.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidArgument` if `kind` is not supported in
    /// this build, the transport is missing, or the transport does not match
    /// `kind`. The registry is left unchanged.
    pub fn register(
        &mut self,
        kind: ClientKind,
        transport: Option<Transport>,
    ) -> Result<ClientId, RegistryError> {
        if !kind.is_supported() {
            return Err(RegistryError::InvalidArgument(
                "client kind not supported in this build",
            ));
        }
        let Some(transport) = transport else {
            return Err(RegistryError::InvalidArgument("missing transport"));
        };
        if transport.kind() != kind {
            return Err(RegistryError::InvalidArgument(
                "transport does not match client kind",
            ));
        }

        let id = ClientId::new();
        self.clients.insert(id, Client::new(transport));
        self.order.push_front(id);
        debug!("Registered {} client {}", kind, id);
        Ok(id)
    }

    /// Remove a client from any position, handing back ownership.
    /// Dropping the returned client closes its connection.
    pub fn unregister(&mut self, id: ClientId) -> Option<Client> {
        let client = self.clients.remove(&id)?;
        self.order.retain(|other| *other != id);
        debug!("Unregistered {} client {}", client.kind(), id);
        Some(client)
    }

    #[must_use]
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Live client ids, newest first
    pub fn ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.order.iter().copied()
    }

    /// Snapshot the current order for a traversal that may remove clients
    #[must_use]
    pub fn cursor(&self) -> ClientCursor {
        ClientCursor {
            ids: self.order.iter().copied().collect::<Vec<_>>().into_iter(),
        }
    }

    /// Find a window client by its window id
    #[must_use]
    pub fn find_window(&self, window: WindowId) -> Option<ClientId> {
        self.ids()
            .find(|id| self.get(*id).and_then(Client::window) == Some(window))
    }

    /// Wait for a UNIX client with input.
    ///
    /// Clients are scanned in registry order starting after the one served
    /// last, so every readable client is served once before any is served
    /// twice. Resolves with the decoded request, `None` for end-of-stream,
    /// or the read error. Pending while no client is readable. Cancel-safe.
    pub async fn next_request(&mut self) -> (ClientId, Option<Result<f32, CodecError>>) {
        poll_fn(|cx| {
            let count = self.order.len();
            for step in 0..count {
                let position = (self.scan_start + step) % count;
                let id = self.order[position];
                let Some(client) = self.clients.get_mut(&id) else {
                    continue;
                };
                if let Transport::Unix(socket) = &mut client.transport
                    && let Poll::Ready(item) = socket.reader.poll_next_unpin(cx)
                {
                    self.scan_start = position + 1;
                    return Poll::Ready((id, item));
                }
            }
            Poll::Pending
        })
        .await
    }

    /// Wait until a client's queued output has been fully written, or its
    /// write failed. Pending while no client has queued output. Cancel-safe.
    pub async fn flush_pending(&mut self) -> (ClientId, Result<(), CodecError>) {
        poll_fn(|cx| {
            for id in &self.order {
                let Some(client) = self.clients.get_mut(id) else {
                    continue;
                };
                if let Transport::Unix(socket) = &mut client.transport
                    && !socket.writer.write_buffer().is_empty()
                    && let Poll::Ready(result) = socket.writer.poll_flush_unpin(cx)
                {
                    return Poll::Ready((*id, result));
                }
            }
            Poll::Pending
        })
        .await
    }
}

//! UNIX-socket protocol broker.
//!
//! Owns the listening socket. Accepted connections are handed to the
//! [`ClientRegistry`]; requests read by the registry are applied here, and
//! device events are encoded per client and written out.
//!
//! Writes never wait on a client. A frame the socket cannot take right away
//! stays in that client's send queue and is flushed by the dispatch loop;
//! once the queue is full, further frames for that client are dropped.

use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::task::{Context, Poll};

use futures_util::SinkExt;
use futures_util::task::noop_waker_ref;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, trace, warn};

use spnav_proto::{CodecError, EventFrame, FRAME_SIZE};
use spnav_types::DeviceEvent;

use crate::error::{DaemonError, Result};
use crate::registry::{ClientId, ClientKind, ClientRegistry, SocketTransport, Transport};

/// Pending-connection queue length of the listening socket
pub const LISTEN_BACKLOG: i32 = 8;

#[derive(Debug, Clone, Copy)]
pub struct BrokerOptions {
    /// Frames held for a client whose socket is full
    pub send_queue_frames: usize,
    pub max_sensitivity: f32,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            send_queue_frames: 64,
            max_sensitivity: 100.0,
        }
    }
}

impl BrokerOptions {
    fn send_queue_bytes(&self) -> usize {
        self.send_queue_frames.max(1) * FRAME_SIZE
    }
}

/// What happened to a client after servicing its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Connected,
    Disconnected,
}

/// Per-event delivery counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Frames written or queued
    pub delivered: usize,
    /// Frames skipped because the client's send queue was full
    pub dropped: usize,
    pub failed: usize,
}

/// What happened to one frame offered to one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Offer {
    Queued,
    Dropped,
}

/// Apply the sensitivity policy: finite and strictly positive, clamped to
/// `max`. Anything else is a protocol violation.
#[must_use]
pub fn sanitize_sensitivity(value: f32, max: f32) -> Option<f32> {
    (value.is_finite() && value > 0.0).then(|| value.min(max))
}

pub struct UnixBroker {
    listener: UnixListener,
    path: PathBuf,
    options: BrokerOptions,
}

impl UnixBroker {
    /// Create the listening socket at `path`.
    ///
    /// The socket is made accessible to every local user and any stale
    /// entry at `path` is replaced.
    ///
    /// # Errors
    ///
    /// Returns an `AddrInUse` I/O error if a live daemon already answers on
    /// `path`, or any error from creating the socket.
    pub async fn bind(path: impl Into<PathBuf>, options: BrokerOptions) -> Result<Self> {
        let path = path.into();
        cleanup_stale_socket(&path).await?;

        let listener = bind_world_accessible(&path)?;
        listener.set_nonblocking(true)?;
        let listener = UnixListener::from_std(listener)?;
        info!("Listening on {}", path.display());

        Ok(Self {
            listener,
            path,
            options,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }

    /// Wait for one pending connection. Cancel-safe.
    ///
    /// # Errors
    ///
    /// Returns the accept error; the listener stays usable.
    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Register an accepted connection. Failures are logged and the stream
    /// is closed.
    pub fn register_accepted(
        &self,
        registry: &mut ClientRegistry,
        accepted: io::Result<UnixStream>,
    ) -> Option<ClientId> {
        let stream = match accepted {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                return None;
            }
        };

        match registry.register(ClientKind::Unix, Some(Transport::unix(stream))) {
            Ok(id) => {
                info!("Client {} connected ({} total)", id, registry.len());
                Some(id)
            }
            Err(e) => {
                warn!("Failed to add client: {}", e);
                None
            }
        }
    }

    /// Apply one read result from a client: a new sensitivity, or a
    /// disconnect on end-of-stream, read error or invalid value.
    pub fn service_client(
        &self,
        registry: &mut ClientRegistry,
        id: ClientId,
        request: Option<std::result::Result<f32, CodecError>>,
    ) -> ClientStatus {
        let requested = match request {
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                debug!("Read error from client {}: {}", id, e);
                return disconnect(registry, id);
            }
            None => {
                debug!("Client {} closed the connection", id);
                return disconnect(registry, id);
            }
        };

        let Some(sensitivity) = sanitize_sensitivity(requested, self.options.max_sensitivity)
        else {
            warn!(
                "Client {} requested invalid sensitivity {}, disconnecting",
                id, requested
            );
            return disconnect(registry, id);
        };

        let Some(client) = registry.get_mut(id) else {
            return ClientStatus::Disconnected;
        };
        client.set_sensitivity(sensitivity);
        debug!("Client {} sensitivity set to {}", id, sensitivity);
        ClientStatus::Connected
    }

    /// Send `event` to every UNIX client bound to `device_index`, scaled by
    /// each client's sensitivity.
    ///
    /// Never waits on a client. A client whose send queue is full misses this
    /// frame. A failed write is only counted here; the dispatch loop drops
    /// the client once its queued output fails to flush.
    pub fn broadcast(
        &self,
        registry: &mut ClientRegistry,
        event: &DeviceEvent,
        device_index: usize,
    ) -> BroadcastStats {
        let mut stats = BroadcastStats::default();
        let limit = self.options.send_queue_bytes();
        let mut cursor = registry.cursor();

        while let Some(id) = cursor.next(registry) {
            let Some(client) = registry.get_mut(id) else {
                continue;
            };
            if client.device_index() != device_index {
                continue;
            }
            let sensitivity = client.sensitivity();
            let Transport::Unix(socket) = client.transport_mut() else {
                continue;
            };

            let frame = EventFrame::encode(event, sensitivity);
            match offer_frame(socket, frame, limit) {
                Ok(Offer::Queued) => stats.delivered += 1,
                Ok(Offer::Dropped) => {
                    trace!("Send queue of client {} is full, dropping frame", id);
                    stats.dropped += 1;
                }
                Err(e) => {
                    debug!("Failed to write to client {}: {}", id, e);
                    stats.failed += 1;
                }
            }
        }

        if stats.dropped > 0 {
            debug!("{} backlogged clients missed an event", stats.dropped);
        }
        stats
    }
}

/// Queue one frame and push out as much of the queue as the socket takes
/// without blocking. The dispatch loop flushes whatever remains.
fn offer_frame(
    socket: &mut SocketTransport,
    frame: EventFrame,
    limit: usize,
) -> std::result::Result<Offer, CodecError> {
    let mut cx = Context::from_waker(noop_waker_ref());

    if let Poll::Ready(Err(e)) = socket.writer.poll_flush_unpin(&mut cx) {
        return Err(e);
    }
    if socket.writer.write_buffer().len() + FRAME_SIZE > limit {
        return Ok(Offer::Dropped);
    }

    match socket.writer.poll_ready_unpin(&mut cx) {
        Poll::Ready(Ok(())) => {}
        Poll::Ready(Err(e)) => return Err(e),
        Poll::Pending => return Ok(Offer::Dropped),
    }
    socket.writer.start_send_unpin(frame)?;

    match socket.writer.poll_flush_unpin(&mut cx) {
        Poll::Ready(Err(e)) => Err(e),
        Poll::Ready(Ok(())) | Poll::Pending => Ok(Offer::Queued),
    }
}

impl Drop for UnixBroker {
    fn drop(&mut self) {
        if self.path.exists()
            && let Err(e) = std::fs::remove_file(&self.path)
        {
            warn!("Failed to remove socket file {:?}: {}", self.path, e);
        }
    }
}

fn disconnect(registry: &mut ClientRegistry, id: ClientId) -> ClientStatus {
    if registry.unregister(id).is_some() {
        info!("Client {} disconnected ({} remaining)", id, registry.len());
    }
    ClientStatus::Disconnected
}

async fn cleanup_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        if UnixStream::connect(path).await.is_ok() {
            return Err(DaemonError::Io(io::Error::new(
                io::ErrorKind::AddrInUse,
                "Another daemon is already running",
            )));
        }
        info!("Removing stale socket at {}", path.display());
        std::fs::remove_file(path)?;
    }
    Ok(())
}

/// Bind with an empty umask so every local user can connect, then restore
/// the previous mask and shrink the backlog.
fn bind_world_accessible(path: &Path) -> io::Result<std::os::unix::net::UnixListener> {
    let previous = unsafe { libc::umask(0) };
    let result = std::os::unix::net::UnixListener::bind(path);
    unsafe {
        libc::umask(previous);
    }
    let listener = result?;

    // Re-listening on a bound socket only updates the backlog
    if unsafe { libc::listen(listener.as_raw_fd(), LISTEN_BACKLOG) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(listener)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)] // Exact float comparisons are intentional in tests

    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tokio::io::AsyncReadExt;

    fn socket_in(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("spnav.sock")
    }

    /// Read one frame from `peer` while the registry flushes queued output
    async fn read_while_flushing(
        registry: &mut ClientRegistry,
        peer: &mut UnixStream,
    ) -> EventFrame {
        let mut buf = [0u8; FRAME_SIZE];
        {
            let read = peer.read_exact(&mut buf);
            tokio::pin!(read);

            loop {
                tokio::select! {
                    result = &mut read => {
                        result.unwrap();
                        break;
                    }
                    _ = registry.flush_pending() => {}
                }
            }
        }
        EventFrame::from_bytes(&buf)
    }

    #[test]
    fn test_sanitize_sensitivity() {
        assert_eq!(sanitize_sensitivity(2.5, 100.0), Some(2.5));
        assert_eq!(sanitize_sensitivity(500.0, 100.0), Some(100.0));
        assert_eq!(sanitize_sensitivity(0.0, 100.0), None);
        assert_eq!(sanitize_sensitivity(-1.0, 100.0), None);
        assert_eq!(sanitize_sensitivity(f32::NAN, 100.0), None);
        assert_eq!(sanitize_sensitivity(f32::INFINITY, 100.0), None);
    }

    #[tokio::test]
    async fn test_bind_creates_world_accessible_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_in(&dir);

        let broker = UnixBroker::bind(&path, BrokerOptions::default())
            .await
            .unwrap();
        let mode = std::fs::metadata(broker.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o666, 0o666);
    }

    #[tokio::test]
    async fn test_bind_refuses_live_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_in(&dir);

        let _first = UnixBroker::bind(&path, BrokerOptions::default())
            .await
            .unwrap();
        let second = UnixBroker::bind(&path, BrokerOptions::default()).await;

        assert!(second.is_err_and(|e| e.is_addr_in_use()));
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_in(&dir);
        std::fs::write(&path, b"").unwrap();

        let broker = UnixBroker::bind(&path, BrokerOptions::default()).await;
        assert!(broker.is_ok());
    }

    #[tokio::test]
    async fn test_drop_removes_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = socket_in(&dir);

        let broker = UnixBroker::bind(&path, BrokerOptions::default())
            .await
            .unwrap();
        assert!(path.exists());
        drop(broker);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_service_client_sets_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let broker = UnixBroker::bind(socket_in(&dir), BrokerOptions::default())
            .await
            .unwrap();
        let mut registry = ClientRegistry::new();
        let (daemon_side, _peer) = UnixStream::pair().unwrap();
        let id = broker
            .register_accepted(&mut registry, Ok(daemon_side))
            .unwrap();

        let status = broker.service_client(&mut registry, id, Some(Ok(2.5)));
        assert_eq!(status, ClientStatus::Connected);
        assert_eq!(registry.get(id).unwrap().sensitivity(), 2.5);

        broker.service_client(&mut registry, id, Some(Ok(1e6)));
        assert_eq!(registry.get(id).unwrap().sensitivity(), 100.0);
    }

    #[tokio::test]
    async fn test_service_client_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let broker = UnixBroker::bind(socket_in(&dir), BrokerOptions::default())
            .await
            .unwrap();
        let mut registry = ClientRegistry::new();

        for request in [
            None,
            Some(Ok(f32::NAN)),
            Some(Ok(-2.0)),
            Some(Err(CodecError::Truncated {
                expected: 4,
                received: 1,
            })),
        ] {
            let (daemon_side, _peer) = UnixStream::pair().unwrap();
            let id = broker
                .register_accepted(&mut registry, Ok(daemon_side))
                .unwrap();
            let status = broker.service_client(&mut registry, id, request);
            assert_eq!(status, ClientStatus::Disconnected);
            assert!(!registry.contains(id));
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_accepted_error_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let broker = UnixBroker::bind(socket_in(&dir), BrokerOptions::default())
            .await
            .unwrap();
        let mut registry = ClientRegistry::new();

        let failed = io::Error::new(io::ErrorKind::ConnectionAborted, "aborted");
        assert!(broker.register_accepted(&mut registry, Err(failed)).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_filters_by_device_index() {
        let dir = tempfile::tempdir().unwrap();
        let broker = UnixBroker::bind(socket_in(&dir), BrokerOptions::default())
            .await
            .unwrap();
        let mut registry = ClientRegistry::new();

        let (a_side, mut a_peer) = UnixStream::pair().unwrap();
        let (b_side, _b_peer) = UnixStream::pair().unwrap();
        broker.register_accepted(&mut registry, Ok(a_side)).unwrap();
        let b = broker.register_accepted(&mut registry, Ok(b_side)).unwrap();
        registry.get_mut(b).unwrap().set_device_index(1);

        let stats = broker.broadcast(&mut registry, &DeviceEvent::button_press(4), 0);
        assert_eq!(
            stats,
            BroadcastStats {
                delivered: 1,
                dropped: 0,
                failed: 0
            }
        );

        let frame = read_while_flushing(&mut registry, &mut a_peer).await;
        assert_eq!(frame.words(), &[1, 4, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_broadcast_drops_for_full_client_only() {
        let dir = tempfile::tempdir().unwrap();
        let options = BrokerOptions {
            send_queue_frames: 4,
            ..BrokerOptions::default()
        };
        let broker = UnixBroker::bind(socket_in(&dir), options).await.unwrap();
        let mut registry = ClientRegistry::new();

        let (stalled_side, _stalled_peer) = UnixStream::pair().unwrap();
        let (healthy_side, mut healthy_peer) = UnixStream::pair().unwrap();
        let stalled = broker
            .register_accepted(&mut registry, Ok(stalled_side))
            .unwrap();
        broker
            .register_accepted(&mut registry, Ok(healthy_side))
            .unwrap();

        // Far more than the socket buffer holds; the stalled peer never reads
        let mut total = BroadcastStats::default();
        for number in 0..20_000u32 {
            let stats = broker.broadcast(&mut registry, &DeviceEvent::button_press(number), 0);
            total.delivered += stats.delivered;
            total.dropped += stats.dropped;
            total.failed += stats.failed;

            let frame = read_while_flushing(&mut registry, &mut healthy_peer).await;
            assert_eq!(frame.words()[1], i32::try_from(number).unwrap());
        }

        assert!(total.dropped > 0);
        assert_eq!(total.failed, 0);
        assert!(registry.contains(stalled));
    }
}

//! Seam for the legacy window-addressed dialect.
//!
//! Clients of this dialect are identified by a window id and receive events
//! through a [`WindowSink`] supplied by the embedding application. The
//! daemon only keeps their registry entries and hands each event to the
//! sink; the framing of the dialect lives entirely behind the sink.

use std::io;

use tracing::{debug, warn};

use spnav_types::DeviceEvent;

use crate::registry::{ClientId, ClientKind, ClientRegistry, RegistryError, Transport};

/// Identifier of a legacy client's window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(u64);

impl WindowId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Delivers events to windows of the legacy dialect
pub trait WindowSink: Send {
    /// Send one event to `window`, scaling motion by `sensitivity`.
    ///
    /// # Errors
    ///
    /// Returns the transport error; the daemon logs it and keeps the client.
    fn send(&mut self, window: WindowId, event: &DeviceEvent, sensitivity: f32) -> io::Result<()>;
}

/// Register a window client, or return the existing registration.
///
/// # Errors
///
/// Returns `RegistryError::InvalidArgument` when the build does not accept
/// window clients.
pub fn register_window(
    registry: &mut ClientRegistry,
    window: WindowId,
) -> Result<ClientId, RegistryError> {
    if let Some(id) = registry.find_window(window) {
        return Ok(id);
    }
    registry.register(ClientKind::Window, Some(Transport::Window(window)))
}

/// Remove a window client. Returns false for unknown windows.
pub fn unregister_window(registry: &mut ClientRegistry, window: WindowId) -> bool {
    registry
        .find_window(window)
        .and_then(|id| registry.unregister(id))
        .is_some()
}

/// Deliver an event to every window client bound to `device_index`.
/// Returns the number of successful sends.
pub fn deliver(
    registry: &ClientRegistry,
    sink: &mut dyn WindowSink,
    event: &DeviceEvent,
    device_index: usize,
) -> usize {
    let mut delivered = 0;
    let mut cursor = registry.cursor();

    while let Some(id) = cursor.next(registry) {
        let Some(client) = registry.get(id) else {
            continue;
        };
        let Some(window) = client.window() else {
            continue;
        };
        if client.device_index() != device_index {
            continue;
        }

        match sink.send(window, event, client.sensitivity()) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Failed to send event to window {}: {}", window, e),
        }
    }

    if delivered > 0 {
        debug!("Delivered event to {} window clients", delivered);
    }
    delivered
}

//! Backend traits implemented by every platform.
//!
//! The daemon only ever talks to these traits. A backend is picked once at
//! startup (see [`crate::select_backend`]) and injected into the daemon, so
//! tests can substitute an in-memory implementation.

use std::path::PathBuf;

use async_trait::async_trait;

use spnav_types::DeviceEvent;

use crate::descriptor::DeviceDescriptor;
use crate::error::Result;

/// Predicate applied to each enumerated candidate
pub type DeviceFilter<'a> = &'a dyn Fn(&DeviceDescriptor) -> bool;

/// Options shared by all backends
#[derive(Debug, Clone)]
pub struct BackendOptions {
    /// Directory holding the device nodes
    pub input_dir: PathBuf,
    /// Take exclusive access to opened devices
    pub grab: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("/dev/input"),
            grab: true,
        }
    }
}

/// Platform device discovery and access
pub trait DeviceBackend: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &'static str;

    /// Enumerate visible devices, keeping those accepted by `filter`.
    ///
    /// With no filter every candidate is returned. An empty list means no
    /// matching hardware; an error means enumeration itself failed.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Discovery` if the discovery service fails and
    /// `DeviceError::Unavailable` on platforms without support.
    fn find_devices(&self, filter: Option<DeviceFilter<'_>>) -> Result<Vec<DeviceDescriptor>>;

    /// Open the first viable path of `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::NotFound` if no path could be opened.
    fn open_device(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn InputDevice>>;

    /// Create this backend's hotplug monitor (not yet initialized)
    fn hotplug_monitor(&self) -> Box<dyn HotplugMonitor>;
}

/// An opened device producing canonical events
#[async_trait]
pub trait InputDevice: Send {
    fn descriptor(&self) -> &DeviceDescriptor;

    /// Wait for the next canonical event.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Io` once the device is gone or unreadable.
    async fn next_event(&mut self) -> Result<DeviceEvent>;
}

/// Device arrival/removal notifications
#[async_trait]
pub trait HotplugMonitor: Send {
    /// Start watching.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unavailable` where hotplug is unsupported.
    fn init(&mut self) -> Result<()>;

    /// Stop watching. Safe to call repeatedly.
    fn shutdown(&mut self);

    /// Whether [`wait`](Self::wait) can ever become ready
    fn is_available(&self) -> bool;

    /// Resolve once notifications are pending. Never resolves while the
    /// monitor is unavailable. Cancel-safe.
    async fn wait(&mut self);

    /// Drain pending notifications and report whether device topology
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns `DeviceError::Unavailable` where hotplug is unsupported.
    fn handle(&mut self) -> Result<bool>;
}

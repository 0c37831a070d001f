//! Backend for platforms without device support.
//!
//! Every operation exists so the daemon runs unchanged; it just never sees a
//! device and its hotplug monitor never becomes ready.

use async_trait::async_trait;
use tracing::warn;

use crate::backend::{DeviceBackend, DeviceFilter, HotplugMonitor, InputDevice};
use crate::descriptor::DeviceDescriptor;
use crate::error::{DeviceError, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl UnsupportedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DeviceBackend for UnsupportedBackend {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    fn find_devices(&self, _filter: Option<DeviceFilter<'_>>) -> Result<Vec<DeviceDescriptor>> {
        warn!("USB devices are not supported on this platform");
        Err(DeviceError::Unavailable("device discovery"))
    }

    fn open_device(&self, _descriptor: &DeviceDescriptor) -> Result<Box<dyn InputDevice>> {
        Err(DeviceError::Unavailable("device access"))
    }

    fn hotplug_monitor(&self) -> Box<dyn HotplugMonitor> {
        Box::new(UnsupportedHotplug)
    }
}

/// Hotplug monitor that is never available
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedHotplug;

#[async_trait]
impl HotplugMonitor for UnsupportedHotplug {
    fn init(&mut self) -> Result<()> {
        Err(DeviceError::Unavailable("hotplug"))
    }

    fn shutdown(&mut self) {}

    fn is_available(&self) -> bool {
        false
    }

    async fn wait(&mut self) {
        std::future::pending::<()>().await;
    }

    fn handle(&mut self) -> Result<bool> {
        Err(DeviceError::Unavailable("hotplug"))
    }
}

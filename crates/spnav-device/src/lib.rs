//! Device abstraction layer for 6-DoF input devices.
//!
//! The daemon talks to hardware exclusively through the traits in
//! [`backend`]. Each platform provides one implementation:
//!
//! - [`EvdevBackend`] on Linux, reading `/dev/input/event*` nodes
//! - [`UnsupportedBackend`] everywhere else
//!
//! Raw reports are translated into [`spnav_types::DeviceEvent`] by
//! [`MotionAccumulator`].

pub mod accumulator;
pub mod backend;
pub mod descriptor;
pub mod error;
#[cfg(target_os = "linux")]
pub mod evdev_backend;
pub mod hotplug;
pub mod unsupported;

pub use accumulator::MotionAccumulator;
pub use backend::{BackendOptions, DeviceBackend, DeviceFilter, HotplugMonitor, InputDevice};
pub use descriptor::{
    DeviceDescriptor, DeviceMatch, KNOWN_DEVICES, VENDOR_3DCONNEXION, VENDOR_LOGITECH,
    is_known_device, matches_any,
};
pub use error::{DeviceError, Result};
#[cfg(target_os = "linux")]
pub use evdev_backend::EvdevBackend;
pub use hotplug::NotifyHotplug;
pub use unsupported::{UnsupportedBackend, UnsupportedHotplug};

/// Pick the device backend for the running platform.
#[must_use]
pub fn select_backend(options: BackendOptions) -> Box<dyn DeviceBackend> {
    #[cfg(target_os = "linux")]
    {
        Box::new(EvdevBackend::new(options))
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = options;
        Box::new(UnsupportedBackend::new())
    }
}

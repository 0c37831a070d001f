//! Broker daemon for 6-DoF space mice.
//!
//! The daemon owns the physical devices and fans their events out to any
//! number of local clients, each with its own sensitivity and device
//! selection.
//!
//! - [`registry`]: connected clients, newest first, with removal-safe cursors
//! - [`broker`]: the UNIX-socket listener and per-client framing
//! - [`devices`]: open devices and the reader tasks pumping their events
//! - [`magellan`]: seam for window-addressed legacy clients
//! - [`dispatch`]: the single-task reactor tying everything together
//! - [`config`]: JSON configuration

pub mod broker;
pub mod config;
pub mod devices;
pub mod dispatch;
pub mod error;
pub mod magellan;
pub mod registry;

pub use broker::{BroadcastStats, BrokerOptions, ClientStatus, UnixBroker, sanitize_sensitivity};
pub use config::{Config, DeviceConfig, default_config_path};
pub use devices::{DeviceManager, DevicePredicate, DeviceUpdate};
pub use dispatch::{Daemon, DaemonOptions, HOTPLUG_SETTLE_DELAY, shutdown_signal};
pub use error::{DaemonError, Result};
pub use magellan::{WindowId, WindowSink};
pub use registry::{
    Client, ClientCursor, ClientId, ClientKind, ClientRegistry, RegistryError, Transport,
};

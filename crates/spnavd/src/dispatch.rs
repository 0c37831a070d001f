//! Event dispatch loop.
//!
//! A single task waits on every event source at once: the shutdown signal,
//! the listening socket, queued client output, the device channel, client
//! input, the hotplug monitor and a pending rescan deadline. Sources are
//! checked in that order whenever several are ready, so new connections are
//! registered first and device events are never held back by client input.
//! Handlers run to completion before the next wait, which keeps all registry
//! mutation on this one task.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use spnav_device::{DeviceBackend, HotplugMonitor};

use crate::broker::{BroadcastStats, BrokerOptions, UnixBroker};
use crate::config::Config;
use crate::devices::{DeviceManager, DeviceUpdate};
use crate::error::Result;
use crate::magellan::{self, WindowId, WindowSink};
use crate::registry::{ClientId, ClientRegistry};

/// Time between a hotplug notification and the rescan it triggers, so the
/// new node's permissions are in place before it is opened
pub const HOTPLUG_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
pub struct DaemonOptions {
    pub broker: BrokerOptions,
    pub hotplug: bool,
    pub settle_delay: Duration,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            broker: BrokerOptions::default(),
            hotplug: true,
            settle_delay: HOTPLUG_SETTLE_DELAY,
        }
    }
}

impl DaemonOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            broker: BrokerOptions {
                send_queue_frames: config.send_queue_frames,
                max_sensitivity: config.max_sensitivity,
            },
            hotplug: config.hotplug,
            settle_delay: HOTPLUG_SETTLE_DELAY,
        }
    }
}

pub struct Daemon {
    registry: ClientRegistry,
    broker: UnixBroker,
    devices: DeviceManager,
    hotplug: Box<dyn HotplugMonitor>,
    window_sink: Option<Box<dyn WindowSink>>,
    rescan_at: Option<Instant>,
    settle_delay: Duration,
}

impl Daemon {
    /// Bind the socket, start hotplug monitoring and open initial devices.
    ///
    /// # Errors
    ///
    /// Returns an error if the listening socket cannot be created. Device
    /// and hotplug problems are logged and the daemon starts without them.
    pub async fn start(
        socket_path: impl Into<PathBuf>,
        options: DaemonOptions,
        mut devices: DeviceManager,
    ) -> Result<Self> {
        let broker = UnixBroker::bind(socket_path, options.broker).await?;

        let mut hotplug = devices.hotplug_monitor();
        if options.hotplug {
            if let Err(e) = hotplug.init() {
                warn!("Hotplug monitoring unavailable: {}", e);
            }
        } else {
            debug!("Hotplug monitoring disabled");
        }

        info!(
            "Using {} device backend with {} device slots",
            devices.backend_name(),
            devices.max_devices()
        );
        devices.rescan();

        Ok(Self {
            registry: ClientRegistry::new(),
            broker,
            devices,
            hotplug,
            window_sink: None,
            rescan_at: None,
            settle_delay: options.settle_delay,
        })
    }

    /// Start a daemon configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listening socket cannot be created.
    pub async fn from_config(
        config: &Config,
        socket_override: Option<PathBuf>,
        backend: Box<dyn DeviceBackend>,
    ) -> Result<Self> {
        let devices = DeviceManager::from_config(backend, &config.devices);
        Self::start(
            config.socket_path(socket_override),
            DaemonOptions::from_config(config),
            devices,
        )
        .await
    }

    /// Install the sender for window-addressed clients
    #[must_use]
    pub fn with_window_sink(mut self, sink: Box<dyn WindowSink>) -> Self {
        self.window_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn socket_path(&self) -> &Path {
        self.broker.path()
    }

    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceManager {
        &self.devices
    }

    /// Register a legacy-dialect client.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::Registry` when window clients are not supported
    /// by this build.
    pub fn register_window(&mut self, window: WindowId) -> Result<ClientId> {
        let id = magellan::register_window(&mut self.registry, window)?;
        info!("Window client {} registered as {}", window, id);
        Ok(id)
    }

    pub fn unregister_window(&mut self, window: WindowId) -> bool {
        magellan::unregister_window(&mut self.registry, window)
    }

    /// Run until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Per-client and per-device failures are handled inside the loop; this
    /// currently always returns `Ok`.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);
        info!("Ready to accept connections");

        loop {
            let rescan_at = self.rescan_at;

            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!("Shutdown requested, stopping dispatch loop");
                    break;
                }
                accepted = self.broker.accept() => {
                    self.broker.register_accepted(&mut self.registry, accepted);
                }
                (id, flushed) = self.registry.flush_pending() => {
                    if let Err(e) = flushed {
                        debug!("Failed to flush output to client {}, disconnecting: {}", id, e);
                        self.registry.unregister(id);
                    }
                }
                update = self.devices.next_update() => {
                    self.handle_device_update(update);
                }
                (id, request) = self.registry.next_request() => {
                    self.broker.service_client(&mut self.registry, id, request);
                }
                () = self.hotplug.wait() => {
                    self.handle_hotplug();
                }
                () = rescan_deadline(rescan_at) => {
                    self.rescan_at = None;
                    self.devices.rescan();
                }
            }
        }

        self.hotplug.shutdown();
        self.devices.release_all();
        Ok(())
    }

    /// Forward one device event to every client bound to its device.
    pub fn dispatch_event(
        &mut self,
        event: &spnav_types::DeviceEvent,
        device_index: usize,
    ) -> BroadcastStats {
        let stats = self.broker.broadcast(&mut self.registry, event, device_index);
        trace!(
            "Event from device {} delivered to {} clients ({} dropped, {} failed)",
            device_index, stats.delivered, stats.dropped, stats.failed
        );

        if let Some(sink) = self.window_sink.as_mut() {
            magellan::deliver(&self.registry, sink.as_mut(), event, device_index);
        }
        stats
    }

    fn handle_device_update(&mut self, update: DeviceUpdate) {
        match update {
            DeviceUpdate::Event { index, event, .. } => {
                self.dispatch_event(&event, index);
            }
            DeviceUpdate::Lost { index, reason, .. } => {
                warn!("Lost device {}: {}", index, reason);
                self.devices.release(index);
            }
        }
    }

    fn handle_hotplug(&mut self) {
        match self.hotplug.handle() {
            Ok(true) => {
                debug!("Device topology changed, rescanning in {:?}", self.settle_delay);
                self.rescan_at = Some(Instant::now() + self.settle_delay);
            }
            Ok(false) => {}
            Err(e) => warn!("Failed to handle hotplug notification: {}", e),
        }
    }
}

async fn rescan_deadline(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Resolve on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}

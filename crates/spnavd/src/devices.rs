//! Open devices and their reader tasks.
//!
//! Each open device occupies a slot whose position is the logical device
//! index clients select. A reader task per device forwards canonical events
//! into one channel; the dispatch loop is the only consumer. Updates carry
//! the slot's generation so events from a released device are dropped even
//! if the slot has since been reused.
//!
//! The channel is bounded. When it is full, motion reports are dropped (a
//! later report carries the current axis state) while button and removal
//! updates wait for room.

use spnav_device::{DeviceBackend, DeviceDescriptor, HotplugMonitor, InputDevice};
use spnav_types::DeviceEvent;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::DeviceConfig;

/// Updates buffered between device readers and the dispatch loop
pub const DEVICE_QUEUE_LEN: usize = 64;

/// Predicate selecting which enumerated devices to open
pub type DevicePredicate = Box<dyn Fn(&DeviceDescriptor) -> bool + Send + Sync>;

/// Message from a device reader task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceUpdate {
    Event {
        index: usize,
        generation: u64,
        event: DeviceEvent,
    },
    Lost {
        index: usize,
        generation: u64,
        reason: String,
    },
}

impl DeviceUpdate {
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Event { index, .. } | Self::Lost { index, .. } => *index,
        }
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        match self {
            Self::Event { generation, .. } | Self::Lost { generation, .. } => *generation,
        }
    }
}

struct ActiveDevice {
    descriptor: DeviceDescriptor,
    generation: u64,
    reader: JoinHandle<()>,
}

impl Drop for ActiveDevice {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub struct DeviceManager {
    backend: Box<dyn DeviceBackend>,
    filter: DevicePredicate,
    slots: Vec<Option<ActiveDevice>>,
    next_generation: u64,
    tx: mpsc::Sender<DeviceUpdate>,
    rx: mpsc::Receiver<DeviceUpdate>,
}

impl DeviceManager {
    /// Create a manager with room for `max_devices` open devices.
    #[must_use]
    pub fn new(
        backend: Box<dyn DeviceBackend>,
        filter: DevicePredicate,
        max_devices: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(DEVICE_QUEUE_LEN);
        Self {
            backend,
            filter,
            slots: (0..max_devices.max(1)).map(|_| None).collect(),
            next_generation: 0,
            tx,
            rx,
        }
    }

    /// Create a manager that opens the devices listed in `config`.
    #[must_use]
    pub fn from_config(backend: Box<dyn DeviceBackend>, config: &DeviceConfig) -> Self {
        let accepted = config.clone();
        Self::new(
            backend,
            Box::new(move |descriptor: &DeviceDescriptor| accepted.accepts(descriptor)),
            config.max_devices,
        )
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    #[must_use]
    pub fn max_devices(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Open devices by slot index
    pub fn active(&self) -> impl Iterator<Item = (usize, &DeviceDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|active| (index, &active.descriptor)))
    }

    #[must_use]
    pub fn hotplug_monitor(&self) -> Box<dyn HotplugMonitor> {
        self.backend.hotplug_monitor()
    }

    /// Open newly matching devices into free slots. Returns how many were
    /// opened. Discovery and open failures are logged.
    pub fn rescan(&mut self) -> usize {
        if self.free_slot().is_none() {
            trace!("All device slots in use, skipping rescan");
            return 0;
        }

        let found = match self.backend.find_devices(Some(&*self.filter)) {
            Ok(found) => found,
            Err(e) => {
                warn!("Device discovery failed: {}", e);
                return 0;
            }
        };

        let mut opened = 0;
        for descriptor in found {
            if self.is_open(&descriptor) {
                continue;
            }
            let Some(index) = self.free_slot() else {
                debug!("No free slot for {}", descriptor);
                break;
            };
            match self.backend.open_device(&descriptor) {
                Ok(device) => {
                    self.attach(index, device);
                    opened += 1;
                }
                Err(e) => warn!("Failed to open {}: {}", descriptor, e),
            }
        }

        if self.active_count() == 0 {
            info!("No devices found");
        }
        opened
    }

    /// Close the device in `index`, returning its descriptor.
    pub fn release(&mut self, index: usize) -> Option<DeviceDescriptor> {
        let active = self.slots.get_mut(index)?.take()?;
        info!("Released device {}: {}", index, active.descriptor);
        Some(active.descriptor.clone())
    }

    pub fn release_all(&mut self) {
        for index in 0..self.slots.len() {
            self.release(index);
        }
    }

    /// Wait for the next update from a currently open device. Cancel-safe.
    pub async fn next_update(&mut self) -> DeviceUpdate {
        loop {
            // The manager holds a sender, so the channel never closes
            let Some(update) = self.rx.recv().await else {
                return std::future::pending().await;
            };
            if self.is_current(update.index(), update.generation()) {
                return update;
            }
            trace!("Dropping stale update from device slot {}", update.index());
        }
    }

    fn attach(&mut self, index: usize, device: Box<dyn InputDevice>) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let descriptor = device.descriptor().clone();
        info!("Device {} ready: {}", index, descriptor);

        let reader = tokio::spawn(pump(device, index, generation, self.tx.clone()));
        self.slots[index] = Some(ActiveDevice {
            descriptor,
            generation,
            reader,
        });
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    fn is_open(&self, descriptor: &DeviceDescriptor) -> bool {
        self.slots
            .iter()
            .flatten()
            .any(|active| active.descriptor.paths == descriptor.paths)
    }

    fn is_current(&self, index: usize, generation: u64) -> bool {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .is_some_and(|active| active.generation == generation)
    }
}

async fn pump(
    mut device: Box<dyn InputDevice>,
    index: usize,
    generation: u64,
    tx: mpsc::Sender<DeviceUpdate>,
) {
    loop {
        match device.next_event().await {
            Ok(event) => {
                let update = DeviceUpdate::Event {
                    index,
                    generation,
                    event,
                };
                let sent = if event.is_motion() {
                    match tx.try_send(update) {
                        Ok(()) => true,
                        Err(TrySendError::Full(_)) => {
                            trace!("Update queue full, dropping motion from device {}", index);
                            true
                        }
                        Err(TrySendError::Closed(_)) => false,
                    }
                } else {
                    tx.send(update).await.is_ok()
                };
                if !sent {
                    return;
                }
            }
            Err(e) => {
                let _ = tx
                    .send(DeviceUpdate::Lost {
                        index,
                        generation,
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        }
    }
}

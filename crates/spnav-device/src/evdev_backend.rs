//! Linux evdev backend.
//!
//! Enumerates `event*` nodes in the input directory, groups the nodes of one
//! physical device into a single descriptor and reads canonical events from
//! the opened node through [`MotionAccumulator`].

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use evdev::{Device, EventStream};
use tracing::{debug, info, warn};

use spnav_types::DeviceEvent;

use crate::accumulator::MotionAccumulator;
use crate::backend::{BackendOptions, DeviceBackend, DeviceFilter, HotplugMonitor, InputDevice};
use crate::descriptor::DeviceDescriptor;
use crate::error::{DeviceError, Result};
use crate::hotplug::NotifyHotplug;

/// What enumeration learned about one device node
#[derive(Debug, Clone)]
struct NodeInfo {
    path: PathBuf,
    vendor_id: u16,
    product_id: u16,
    name: Option<String>,
    phys: Option<String>,
    has_axes: bool,
}

impl NodeInfo {
    fn probe(path: &Path) -> io::Result<Self> {
        let device = Device::open(path)?;
        let id = device.input_id();
        let has_axes = device.supported_relative_axes().is_some()
            || device.supported_absolute_axes().is_some();
        Ok(Self {
            path: path.to_path_buf(),
            vendor_id: id.vendor(),
            product_id: id.product(),
            name: device.name().map(str::to_owned),
            phys: device.physical_path().map(str::to_owned),
            has_axes,
        })
    }

    /// Nodes of one physical device share vendor, product and the physical
    /// location up to the interface suffix.
    fn group_key(&self) -> (u16, u16, String) {
        let location = match (&self.phys, &self.name) {
            (Some(phys), _) => phys
                .rsplit_once("/input")
                .map_or(phys.as_str(), |(base, _)| base)
                .to_owned(),
            (None, Some(name)) => name.clone(),
            (None, None) => self.path.display().to_string(),
        };
        (self.vendor_id, self.product_id, location)
    }
}

/// Numeric suffix of an `eventN` node, for stable ordering
fn node_number(path: &Path) -> u32 {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix("event"))
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}

fn group_nodes(mut nodes: Vec<NodeInfo>) -> Vec<DeviceDescriptor> {
    // Axis-capable nodes first, then by node number
    nodes.sort_by_key(|node| (!node.has_axes, node_number(&node.path)));

    let mut groups: BTreeMap<(u16, u16, String), DeviceDescriptor> = BTreeMap::new();
    for node in nodes {
        let descriptor = groups.entry(node.group_key()).or_insert_with(|| DeviceDescriptor {
            paths: Vec::new(),
            vendor_id: node.vendor_id,
            product_id: node.product_id,
            name: node.name.clone(),
            phys: node.phys.clone(),
        });
        descriptor.paths.push(node.path);
    }

    let mut descriptors: Vec<_> = groups.into_values().collect();
    descriptors.sort_by_key(|d| d.primary_path().map_or(u32::MAX, |p| node_number(p)));
    descriptors
}

/// Device backend for Linux input event nodes
#[derive(Debug, Clone)]
pub struct EvdevBackend {
    options: BackendOptions,
}

impl EvdevBackend {
    #[must_use]
    pub fn new(options: BackendOptions) -> Self {
        Self { options }
    }

    fn scan_nodes(&self) -> Result<Vec<NodeInfo>> {
        let entries = std::fs::read_dir(&self.options.input_dir).map_err(|e| {
            DeviceError::Discovery(format!(
                "cannot read {}: {}",
                self.options.input_dir.display(),
                e
            ))
        })?;

        let mut nodes = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if node_number(&path) == u32::MAX {
                continue;
            }
            match NodeInfo::probe(&path) {
                Ok(node) => nodes.push(node),
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }
        Ok(nodes)
    }
}

impl DeviceBackend for EvdevBackend {
    fn name(&self) -> &'static str {
        "evdev"
    }

    fn find_devices(&self, filter: Option<DeviceFilter<'_>>) -> Result<Vec<DeviceDescriptor>> {
        let descriptors = group_nodes(self.scan_nodes()?);
        let total = descriptors.len();

        let matched: Vec<_> = descriptors
            .into_iter()
            .filter(|d| filter.is_none_or(|accept| accept(d)))
            .collect();

        debug!("Enumerated {} devices, {} matched", total, matched.len());
        Ok(matched)
    }

    fn open_device(&self, descriptor: &DeviceDescriptor) -> Result<Box<dyn InputDevice>> {
        let mut last_error = None;

        for path in &descriptor.paths {
            match open_node(path, self.options.grab) {
                Ok(stream) => {
                    info!("Opened {} at {}", descriptor, path.display());
                    return Ok(Box::new(EvdevDevice {
                        descriptor: descriptor.clone(),
                        stream,
                        accumulator: MotionAccumulator::new(),
                    }));
                }
                Err(e) => {
                    debug!("Failed to open {}: {}", path.display(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(DeviceError::NotFound(match last_error {
            Some(e) => format!("{descriptor}: {e}"),
            None => format!("{descriptor}: no device paths"),
        }))
    }

    fn hotplug_monitor(&self) -> Box<dyn HotplugMonitor> {
        Box::new(NotifyHotplug::new(&self.options.input_dir))
    }
}

fn open_node(path: &Path, grab: bool) -> io::Result<EventStream> {
    let mut device = Device::open(path)?;
    if grab && let Err(e) = device.grab() {
        warn!(
            "Failed to grab {}, other readers will see its events: {}",
            path.display(),
            e
        );
    }
    device.into_event_stream()
}

/// An opened evdev node
pub struct EvdevDevice {
    descriptor: DeviceDescriptor,
    stream: EventStream,
    accumulator: MotionAccumulator,
}

#[async_trait]
impl InputDevice for EvdevDevice {
    fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    async fn next_event(&mut self) -> Result<DeviceEvent> {
        loop {
            let raw = self.stream.next_event().await?;
            if let Some(event) =
                self.accumulator
                    .push(raw.event_type().0, raw.code(), raw.value(), raw.timestamp())
            {
                return Ok(event);
            }
        }
    }
}

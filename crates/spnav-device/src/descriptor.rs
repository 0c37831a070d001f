//! Device descriptors and vendor/product matching.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Logitech vendor id, used by older 3Dconnexion devices
pub const VENDOR_LOGITECH: u16 = 0x046d;

/// 3Dconnexion vendor id
pub const VENDOR_3DCONNEXION: u16 = 0x256f;

/// One logical device found by enumeration.
///
/// A single physical device may expose several device nodes; all of them are
/// listed in `paths` and the backend opens the first one that works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub paths: Vec<PathBuf>,
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phys: Option<String>,
}

impl DeviceDescriptor {
    #[must_use]
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            paths: Vec::new(),
            vendor_id,
            product_id,
            name: None,
            phys: None,
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn primary_path(&self) -> Option<&PathBuf> {
        self.paths.first()
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if let Some(path) = self.primary_path() {
            write!(f, " ({})", path.display())?;
        }
        Ok(())
    }
}

/// Vendor/product pair accepted by the device filter.
///
/// A missing product matches every product of the vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMatch {
    pub vendor: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product: Option<u16>,
}

impl DeviceMatch {
    #[must_use]
    pub const fn exact(vendor: u16, product: u16) -> Self {
        Self {
            vendor,
            product: Some(product),
        }
    }

    #[must_use]
    pub const fn vendor(vendor: u16) -> Self {
        Self {
            vendor,
            product: None,
        }
    }

    #[must_use]
    pub fn matches(&self, descriptor: &DeviceDescriptor) -> bool {
        self.vendor == descriptor.vendor_id
            && self.product.is_none_or(|product| product == descriptor.product_id)
    }
}

/// Known 6-DoF devices
pub const KNOWN_DEVICES: &[DeviceMatch] = &[
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc603), // SpaceMouse Plus XT
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc605), // CadMan
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc606), // SpaceMouse Classic
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc621), // SpaceBall 5000
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc623), // SpaceTraveller
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc625), // SpacePilot
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc626), // SpaceNavigator
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc627), // SpaceExplorer
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc628), // SpaceNavigator for Notebooks
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc629), // SpacePilot Pro
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc62b), // SpaceMouse Pro
    DeviceMatch::exact(VENDOR_LOGITECH, 0xc640), // NuLOOQ
    DeviceMatch::vendor(VENDOR_3DCONNEXION),
];

/// Returns true if the descriptor matches any entry in `matches`
#[must_use]
pub fn matches_any(matches: &[DeviceMatch], descriptor: &DeviceDescriptor) -> bool {
    matches.iter().any(|m| m.matches(descriptor))
}

/// Returns true if the descriptor is a known 6-DoF device
#[must_use]
pub fn is_known_device(descriptor: &DeviceDescriptor) -> bool {
    matches_any(KNOWN_DEVICES, descriptor)
}

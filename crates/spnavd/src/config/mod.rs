//! Daemon configuration.
//!
//! Loaded once at startup from a camelCase JSON file. A missing file means
//! defaults; unknown fields are warned about and otherwise ignored.

mod validation;

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use spnav_device::{BackendOptions, DeviceDescriptor, DeviceMatch, KNOWN_DEVICES, matches_any};

use crate::error::{DaemonError, Result};

pub use validation::{unknown_fields, warn_unknown_fields};

pub const CONFIG_FILENAME: &str = "config.json";

/// Default location of the config file (`~/.config/spnavd/config.json`)
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "spnavd").map(|dirs| dirs.config_dir().join(CONFIG_FILENAME))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Listening socket; `$SPNAV_SOCKET` or the built-in default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub hotplug: bool,

    /// Frames held for a client whose socket is full; newer frames are
    /// dropped for that client until it catches up
    #[serde(default = "default_send_queue_frames")]
    pub send_queue_frames: usize,

    /// Requests above this are clamped
    #[serde(default = "default_max_sensitivity")]
    pub max_sensitivity: f32,

    #[serde(default)]
    pub devices: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    /// Accepted vendor/product pairs
    #[serde(rename = "match", default = "default_matches")]
    pub matches: Vec<DeviceMatch>,

    #[serde(default = "default_max_devices")]
    pub max_devices: usize,

    #[serde(default = "default_true")]
    pub grab: bool,

    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_send_queue_frames() -> usize {
    64
}

fn default_max_sensitivity() -> f32 {
    100.0
}

fn default_matches() -> Vec<DeviceMatch> {
    KNOWN_DEVICES.to_vec()
}

fn default_max_devices() -> usize {
    1
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("/dev/input")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: None,
            hotplug: default_true(),
            send_queue_frames: default_send_queue_frames(),
            max_sensitivity: default_max_sensitivity(),
            devices: DeviceConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            matches: default_matches(),
            max_devices: default_max_devices(),
            grab: default_true(),
            input_dir: default_input_dir(),
        }
    }
}

impl Config {
    /// Load config from file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid JSON, or
    /// holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content, CONFIG_FILENAME)
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::Json` for malformed JSON and
    /// `DaemonError::Config` for out-of-range values.
    pub fn from_json(content: &str, config_name: &str) -> Result<Self> {
        warn_unknown_fields(content, config_name);
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `DaemonError::Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.send_queue_frames == 0 {
            return Err(DaemonError::Config(
                "sendQueueFrames must be at least 1".to_string(),
            ));
        }
        if !self.max_sensitivity.is_finite() || self.max_sensitivity <= 0.0 {
            return Err(DaemonError::Config(format!(
                "maxSensitivity must be a positive number, got {}",
                self.max_sensitivity
            )));
        }
        if self.devices.max_devices == 0 {
            return Err(DaemonError::Config(
                "devices.maxDevices must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Socket path with precedence: explicit override, config file,
    /// `$SPNAV_SOCKET`, built-in default.
    #[must_use]
    pub fn socket_path(&self, override_path: Option<PathBuf>) -> PathBuf {
        override_path
            .or_else(|| self.socket_path.clone())
            .unwrap_or_else(spnav_proto::socket_path)
    }

    #[must_use]
    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions {
            input_dir: self.devices.input_dir.clone(),
            grab: self.devices.grab,
        }
    }
}

impl DeviceConfig {
    /// Returns true if the descriptor is one of the configured devices
    #[must_use]
    pub fn accepts(&self, descriptor: &DeviceDescriptor) -> bool {
        matches_any(&self.matches, descriptor)
    }
}

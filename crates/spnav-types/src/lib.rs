//! Shared types for spacenav components.
//!
//! This crate provides the canonical, device-agnostic event produced by the
//! device layer and consumed by the daemon, the wire protocol and the CLI.
//! Axis values are always raw device units; per-client scaling happens only
//! when an event is encoded for a specific client.

use serde::{Deserialize, Serialize};

/// Number of motion axes reported by a 6-DoF device.
pub const AXIS_COUNT: usize = 6;

/// Short axis names in report order: translation X/Y/Z, rotation X/Y/Z.
pub const AXIS_NAMES: [&str; AXIS_COUNT] = ["tx", "ty", "tz", "rx", "ry", "rz"];

/// Canonical device event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// Six raw axis values plus the time since the previous motion report
    Motion {
        axes: [i32; AXIS_COUNT],
        period_ms: u32,
    },

    /// Button state change
    Button { number: u32, pressed: bool },
}

impl DeviceEvent {
    #[must_use]
    pub const fn motion(axes: [i32; AXIS_COUNT], period_ms: u32) -> Self {
        Self::Motion { axes, period_ms }
    }

    #[must_use]
    pub const fn button_press(number: u32) -> Self {
        Self::Button {
            number,
            pressed: true,
        }
    }

    #[must_use]
    pub const fn button_release(number: u32) -> Self {
        Self::Button {
            number,
            pressed: false,
        }
    }

    #[must_use]
    pub const fn is_motion(&self) -> bool {
        matches!(self, Self::Motion { .. })
    }
}

impl std::fmt::Display for DeviceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Motion { axes, period_ms } => {
                write!(f, "motion")?;
                for (name, value) in AXIS_NAMES.iter().zip(axes) {
                    write!(f, " {name}={value:>5}")?;
                }
                write!(f, " period={period_ms}ms")
            }
            Self::Button { number, pressed } => {
                let state = if *pressed { "press" } else { "release" };
                write!(f, "button {number} {state}")
            }
        }
    }
}

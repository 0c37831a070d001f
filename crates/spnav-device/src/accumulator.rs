//! Translation of evdev-style input reports into canonical events.
//!
//! Axis reports are buffered until the next sync report, which flushes one
//! motion event carrying all six axes. Button reports are emitted as soon as
//! they arrive. After the kernel reports dropped input, everything up to the
//! next sync report is discarded.

use std::time::SystemTime;

use spnav_types::{AXIS_COUNT, DeviceEvent};

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_REL: u16 = 0x02;
pub const EV_ABS: u16 = 0x03;

pub const SYN_REPORT: u16 = 0x00;
pub const SYN_DROPPED: u16 = 0x03;

/// First code of the generic button range; buttons are numbered from here
pub const BTN_MISC: u16 = 0x100;

/// Accumulates one device's axis state between sync reports
#[derive(Debug, Default, Clone)]
pub struct MotionAccumulator {
    axes: [i32; AXIS_COUNT],
    // Bit n set: axis n last came from a relative report
    relative: u8,
    dirty: bool,
    // Set between SYN_DROPPED and the next SYN_REPORT
    resyncing: bool,
    last_motion: Option<SystemTime>,
}

impl MotionAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw report, returning a canonical event when one is complete.
    pub fn push(
        &mut self,
        ev_type: u16,
        code: u16,
        value: i32,
        time: SystemTime,
    ) -> Option<DeviceEvent> {
        if ev_type == EV_SYN && code == SYN_DROPPED {
            self.discard();
            self.resyncing = true;
            return None;
        }
        if self.resyncing {
            if ev_type == EV_SYN && code == SYN_REPORT {
                self.resyncing = false;
            }
            return None;
        }

        match ev_type {
            EV_REL | EV_ABS => {
                let axis = usize::from(code);
                if axis < AXIS_COUNT {
                    self.axes[axis] = value;
                    if ev_type == EV_REL {
                        self.relative |= 1 << axis;
                    } else {
                        self.relative &= !(1 << axis);
                    }
                    self.dirty = true;
                }
                None
            }
            EV_KEY => {
                // 2 is autorepeat
                let pressed = match value {
                    0 => false,
                    1 => true,
                    _ => return None,
                };
                let number = if code >= BTN_MISC {
                    code - BTN_MISC
                } else {
                    code
                };
                Some(DeviceEvent::Button {
                    number: u32::from(number),
                    pressed,
                })
            }
            EV_SYN if code == SYN_REPORT && self.dirty => Some(self.flush(time)),
            _ => None,
        }
    }

    /// Current buffered axis values
    #[must_use]
    pub fn axes(&self) -> &[i32; AXIS_COUNT] {
        &self.axes
    }

    fn discard(&mut self) {
        self.axes = [0; AXIS_COUNT];
        self.relative = 0;
        self.dirty = false;
    }

    fn flush(&mut self, time: SystemTime) -> DeviceEvent {
        let period_ms = self
            .last_motion
            .and_then(|prev| time.duration_since(prev).ok())
            .map_or(0, |elapsed| u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX));
        self.last_motion = Some(time);

        let event = DeviceEvent::motion(self.axes, period_ms);

        for (axis, value) in self.axes.iter_mut().enumerate() {
            if self.relative & (1 << axis) != 0 {
                *value = 0;
            }
        }
        self.dirty = false;

        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn at(ms: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(ms)
    }

    #[test]
    fn test_sync_flushes_motion() {
        let mut acc = MotionAccumulator::new();
        assert!(acc.push(EV_REL, 0, 100, at(0)).is_none());
        assert!(acc.push(EV_REL, 5, -20, at(0)).is_none());

        let event = acc.push(EV_SYN, 0, 0, at(0)).unwrap();
        assert_eq!(event, DeviceEvent::motion([100, 0, 0, 0, 0, -20], 0));
    }

    #[test]
    fn test_period_measures_time_between_motions() {
        let mut acc = MotionAccumulator::new();
        acc.push(EV_REL, 1, 5, at(1000));
        acc.push(EV_SYN, 0, 0, at(1000));

        acc.push(EV_REL, 1, 6, at(1010));
        let event = acc.push(EV_SYN, 0, 0, at(1016)).unwrap();
        assert_eq!(event, DeviceEvent::motion([0, 6, 0, 0, 0, 0], 16));
    }

    #[test]
    fn test_relative_axes_reset_after_report() {
        let mut acc = MotionAccumulator::new();
        acc.push(EV_REL, 0, 40, at(0));
        acc.push(EV_SYN, 0, 0, at(0));
        assert_eq!(acc.axes(), &[0; AXIS_COUNT]);

        acc.push(EV_REL, 2, 3, at(8));
        let event = acc.push(EV_SYN, 0, 0, at(8)).unwrap();
        assert_eq!(event, DeviceEvent::motion([0, 0, 3, 0, 0, 0], 8));
    }

    #[test]
    fn test_absolute_axes_persist() {
        let mut acc = MotionAccumulator::new();
        acc.push(EV_ABS, 3, 200, at(0));
        acc.push(EV_SYN, 0, 0, at(0));

        acc.push(EV_ABS, 4, -7, at(4));
        let event = acc.push(EV_SYN, 0, 0, at(4)).unwrap();
        assert_eq!(event, DeviceEvent::motion([0, 0, 0, 200, -7, 0], 4));
    }

    #[test]
    fn test_sync_without_axis_change_is_silent() {
        let mut acc = MotionAccumulator::new();
        assert!(acc.push(EV_SYN, 0, 0, at(0)).is_none());

        acc.push(EV_REL, 0, 1, at(0));
        assert!(acc.push(EV_SYN, 0, 0, at(0)).is_some());
        assert!(acc.push(EV_SYN, 0, 0, at(5)).is_none());
    }

    #[test]
    fn test_out_of_range_axis_ignored() {
        let mut acc = MotionAccumulator::new();
        acc.push(EV_REL, 8, 99, at(0));
        assert!(acc.push(EV_SYN, 0, 0, at(0)).is_none());
    }

    #[test]
    fn test_buttons_emit_immediately() {
        let mut acc = MotionAccumulator::new();
        assert_eq!(
            acc.push(EV_KEY, BTN_MISC + 1, 1, at(0)),
            Some(DeviceEvent::button_press(1))
        );
        assert_eq!(
            acc.push(EV_KEY, BTN_MISC + 1, 0, at(3)),
            Some(DeviceEvent::button_release(1))
        );
    }

    #[test]
    fn test_button_autorepeat_ignored() {
        let mut acc = MotionAccumulator::new();
        assert!(acc.push(EV_KEY, BTN_MISC, 2, at(0)).is_none());
    }

    #[test]
    fn test_keyboard_range_keys_keep_code() {
        let mut acc = MotionAccumulator::new();
        assert_eq!(
            acc.push(EV_KEY, 0x1e, 1, at(0)),
            Some(DeviceEvent::button_press(0x1e))
        );
    }

    #[test]
    fn test_dropped_report_discards_partial_motion() {
        let mut acc = MotionAccumulator::new();
        acc.push(EV_REL, 0, 250, at(0));
        acc.push(EV_ABS, 3, 90, at(0));

        assert!(acc.push(EV_SYN, SYN_DROPPED, 0, at(1)).is_none());
        assert_eq!(acc.axes(), &[0; AXIS_COUNT]);

        // Reports up to the next sync belong to the lost packet
        assert!(acc.push(EV_REL, 1, 7, at(2)).is_none());
        assert!(acc.push(EV_KEY, BTN_MISC, 1, at(2)).is_none());
        assert!(acc.push(EV_SYN, SYN_REPORT, 0, at(2)).is_none());

        acc.push(EV_REL, 2, 4, at(10));
        assert_eq!(
            acc.push(EV_SYN, SYN_REPORT, 0, at(10)),
            Some(DeviceEvent::motion([0, 0, 4, 0, 0, 0], 0))
        );
    }

    #[test]
    fn test_button_does_not_flush_motion() {
        let mut acc = MotionAccumulator::new();
        acc.push(EV_REL, 0, 10, at(0));
        acc.push(EV_KEY, BTN_MISC, 1, at(0));
        assert_eq!(
            acc.push(EV_SYN, 0, 0, at(0)),
            Some(DeviceEvent::motion([10, 0, 0, 0, 0, 0], 0))
        );
    }
}

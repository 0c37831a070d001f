//! Fixed-size wire frames for the UNIX-socket dialect.
//!
//! Daemon to client, every event is eight native-endian 32-bit integers:
//! ```text
//! +-----+---------------------------+--------+
//! | tag | six axis values / button  | period |
//! |  0  |  1  2  3  4  5  6         |   7    |
//! +-----+---------------------------+--------+
//! ```
//! Client to daemon, a request is a single native-endian `f32` holding the
//! new sensitivity. There is no framing, acknowledgment or request id.

use spnav_types::{AXIS_COUNT, DeviceEvent};

/// Number of 32-bit words in an event frame
pub const FRAME_WORDS: usize = 8;

/// Size of an event frame in bytes
pub const FRAME_SIZE: usize = FRAME_WORDS * 4;

/// Size of a sensitivity request in bytes
pub const REQUEST_SIZE: usize = 4;

pub const TAG_MOTION: i32 = 0;
pub const TAG_PRESS: i32 = 1;
pub const TAG_RELEASE: i32 = 2;

/// Scale one raw axis value by a client's sensitivity.
///
/// Rounds to the nearest integer and saturates at the `i32` range; a NaN
/// product maps to 0.
// Float to int `as` casts saturate, which is the intended clamping here
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn scale_axis(raw: i32, sensitivity: f32) -> i32 {
    (f64::from(raw) * f64::from(sensitivity)).round() as i32
}

/// One encoded daemon-to-client frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventFrame(pub [i32; FRAME_WORDS]);

impl EventFrame {
    /// Encode a canonical event for a client with the given sensitivity.
    ///
    /// Only motion axes are scaled; button frames are independent of
    /// sensitivity.
    #[must_use]
    pub fn encode(event: &DeviceEvent, sensitivity: f32) -> Self {
        let mut words = [0i32; FRAME_WORDS];
        match *event {
            DeviceEvent::Motion { axes, period_ms } => {
                words[0] = TAG_MOTION;
                for (slot, raw) in words[1..=AXIS_COUNT].iter_mut().zip(axes) {
                    *slot = scale_axis(raw, sensitivity);
                }
                words[7] = i32::try_from(period_ms).unwrap_or(i32::MAX);
            }
            DeviceEvent::Button { number, pressed } => {
                words[0] = if pressed { TAG_PRESS } else { TAG_RELEASE };
                words[1] = i32::try_from(number).unwrap_or(i32::MAX);
            }
        }
        Self(words)
    }

    #[must_use]
    pub fn words(&self) -> &[i32; FRAME_WORDS] {
        &self.0
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.0) {
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        bytes
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8; FRAME_SIZE]) -> Self {
        let mut words = [0i32; FRAME_WORDS];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self(words)
    }

    /// Interpret a received frame as an event.
    ///
    /// Motion axes come back already scaled by the receiving client's
    /// sensitivity.
    ///
    /// # Errors
    ///
    /// Returns `FrameError` for an unknown tag or a negative period or button
    /// number.
    pub fn to_event(&self) -> Result<DeviceEvent, FrameError> {
        let words = &self.0;
        match words[0] {
            TAG_MOTION => {
                let mut axes = [0i32; AXIS_COUNT];
                axes.copy_from_slice(&words[1..=AXIS_COUNT]);
                let period_ms =
                    u32::try_from(words[7]).map_err(|_| FrameError::Negative("period"))?;
                Ok(DeviceEvent::Motion { axes, period_ms })
            }
            tag @ (TAG_PRESS | TAG_RELEASE) => {
                let number =
                    u32::try_from(words[1]).map_err(|_| FrameError::Negative("button number"))?;
                Ok(DeviceEvent::Button {
                    number,
                    pressed: tag == TAG_PRESS,
                })
            }
            other => Err(FrameError::UnknownTag(other)),
        }
    }
}

impl From<[i32; FRAME_WORDS]> for EventFrame {
    fn from(words: [i32; FRAME_WORDS]) -> Self {
        Self(words)
    }
}

/// Errors interpreting a received frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Unknown frame tag: {0}")]
    UnknownTag(i32),

    #[error("Negative {0} in frame")]
    Negative(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_motion_identity() {
        let event = DeviceEvent::motion([100, -20, 3, 0, 44, -350], 10);
        let frame = EventFrame::encode(&event, 1.0);
        assert_eq!(frame.words(), &[0, 100, -20, 3, 0, 44, -350, 10]);
    }

    #[test]
    fn test_encode_motion_scaled() {
        let event = DeviceEvent::motion([100, 0, 0, 0, 0, 0], 10);
        assert_eq!(
            EventFrame::encode(&event, 0.5).words(),
            &[0, 50, 0, 0, 0, 0, 0, 10]
        );
        assert_eq!(
            EventFrame::encode(&event, 2.5).words(),
            &[0, 250, 0, 0, 0, 0, 0, 10]
        );
    }

    #[test]
    fn test_encode_button_press() {
        let frame = EventFrame::encode(&DeviceEvent::button_press(5), 3.0);
        assert_eq!(frame.words(), &[1, 5, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_button_release() {
        let frame = EventFrame::encode(&DeviceEvent::button_release(5), 0.1);
        assert_eq!(frame.words(), &[2, 5, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_does_not_mutate_event() {
        let event = DeviceEvent::motion([7, 7, 7, 7, 7, 7], 1);
        let _ = EventFrame::encode(&event, 3.0);
        assert_eq!(event, DeviceEvent::motion([7, 7, 7, 7, 7, 7], 1));
    }

    #[test]
    fn test_scale_axis_rounds_to_nearest() {
        assert_eq!(scale_axis(3, 0.5), 2);
        assert_eq!(scale_axis(-3, 0.5), -2);
        assert_eq!(scale_axis(10, 0.33), 3);
        assert_eq!(scale_axis(10, 0.36), 4);
    }

    #[test]
    fn test_scale_axis_saturates() {
        assert_eq!(scale_axis(i32::MAX, 4.0), i32::MAX);
        assert_eq!(scale_axis(i32::MIN, 4.0), i32::MIN);
        assert_eq!(scale_axis(10, f32::NAN), 0);
    }

    #[test]
    fn test_bytes_are_native_endian() {
        let frame = EventFrame([0, 1, 2, 3, 4, 5, 6, 7]);
        let bytes = frame.to_bytes();
        assert_eq!(&bytes[4..8], &1i32.to_ne_bytes());
        assert_eq!(&bytes[28..32], &7i32.to_ne_bytes());
        assert_eq!(EventFrame::from_bytes(&bytes), frame);
    }

    #[test]
    fn test_to_event_motion() {
        let frame = EventFrame([0, 1, 2, 3, 4, 5, 6, 16]);
        assert_eq!(
            frame.to_event().unwrap(),
            DeviceEvent::motion([1, 2, 3, 4, 5, 6], 16)
        );
    }

    #[test]
    fn test_to_event_buttons() {
        assert_eq!(
            EventFrame([1, 9, 0, 0, 0, 0, 0, 0]).to_event().unwrap(),
            DeviceEvent::button_press(9)
        );
        assert_eq!(
            EventFrame([2, 9, 0, 0, 0, 0, 0, 0]).to_event().unwrap(),
            DeviceEvent::button_release(9)
        );
    }

    #[test]
    fn test_to_event_unknown_tag() {
        let err = EventFrame([3, 0, 0, 0, 0, 0, 0, 0]).to_event().unwrap_err();
        assert_eq!(err, FrameError::UnknownTag(3));
        assert_eq!(err.to_string(), "Unknown frame tag: 3");
    }

    #[test]
    fn test_to_event_negative_fields() {
        assert_eq!(
            EventFrame([0, 0, 0, 0, 0, 0, 0, -1]).to_event().unwrap_err(),
            FrameError::Negative("period")
        );
        assert_eq!(
            EventFrame([1, -4, 0, 0, 0, 0, 0, 0]).to_event().unwrap_err(),
            FrameError::Negative("button number")
        );
    }

    proptest! {
        #[test]
        fn prop_motion_scaling_matches_rounding(
            axes in prop::array::uniform6(-100_000i32..100_000),
            period in 0u32..10_000,
            sensitivity in 0.01f32..100.0,
        ) {
            let frame = EventFrame::encode(&DeviceEvent::motion(axes, period), sensitivity);
            let words = frame.words();
            prop_assert_eq!(words[0], TAG_MOTION);
            for (i, raw) in axes.iter().enumerate() {
                let expected = (f64::from(*raw) * f64::from(sensitivity)).round();
                prop_assert!((f64::from(words[i + 1]) - expected).abs() < f64::EPSILON);
            }
            prop_assert_eq!(words[7], i32::try_from(period).unwrap());
        }

        #[test]
        fn prop_unit_sensitivity_is_identity(
            axes in prop::array::uniform6(any::<i32>()),
            period in 0u32..=i32::MAX as u32,
        ) {
            let event = DeviceEvent::motion(axes, period);
            let frame = EventFrame::encode(&event, 1.0);
            prop_assert_eq!(frame.to_event().unwrap(), event);
        }
    }
}

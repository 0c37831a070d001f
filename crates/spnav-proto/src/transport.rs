//! tokio-util codecs for the UNIX-socket dialect.
//!
//! [`EventCodec`] frames the 32-byte daemon-to-client events and
//! [`RequestCodec`] the 4-byte client-to-daemon sensitivity requests. Both
//! directions are implemented for each codec so the daemon and consumers
//! share one definition of the wire format.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{EventFrame, FRAME_SIZE, REQUEST_SIZE};

/// Codec for fixed-size event frames
#[derive(Debug, Default, Clone, Copy)]
pub struct EventCodec;

impl EventCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for EventCodec {
    type Item = EventFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < FRAME_SIZE {
            src.reserve(FRAME_SIZE - src.len());
            return Ok(None);
        }

        let payload = src.split_to(FRAME_SIZE);
        let mut bytes = [0u8; FRAME_SIZE];
        bytes.copy_from_slice(&payload);
        Ok(Some(EventFrame::from_bytes(&bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(CodecError::Truncated {
                expected: FRAME_SIZE,
                received: src.len(),
            }),
        }
    }
}

impl Encoder<EventFrame> for EventCodec {
    type Error = CodecError;

    fn encode(&mut self, item: EventFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(FRAME_SIZE);
        dst.put_slice(&item.to_bytes());
        Ok(())
    }
}

/// Codec for sensitivity requests (one native-endian `f32` each)
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestCodec;

impl RequestCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RequestCodec {
    type Item = f32;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < REQUEST_SIZE {
            return Ok(None);
        }

        let payload = src.split_to(REQUEST_SIZE);
        Ok(Some(f32::from_ne_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ])))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(value) => Ok(Some(value)),
            None if src.is_empty() => Ok(None),
            None => Err(CodecError::Truncated {
                expected: REQUEST_SIZE,
                received: src.len(),
            }),
        }
    }
}

impl Encoder<f32> for RequestCodec {
    type Error = CodecError;

    fn encode(&mut self, item: f32, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(REQUEST_SIZE);
        dst.put_slice(&item.to_ne_bytes());
        Ok(())
    }
}

/// Errors that can occur during codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Stream ended mid-message: {received} of {expected} bytes")]
    Truncated { expected: usize, received: usize },
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)] // Exact float comparisons are intentional in tests

    use super::*;

    #[test]
    fn test_event_encode_layout() {
        let mut codec = EventCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(EventFrame([0, 50, 0, 0, 0, 0, 0, 10]), &mut buf)
            .unwrap();

        assert_eq!(buf.len(), FRAME_SIZE);
        assert_eq!(&buf[4..8], &50i32.to_ne_bytes());
        assert_eq!(&buf[28..32], &10i32.to_ne_bytes());
    }

    #[test]
    fn test_event_partial_decode() {
        let mut codec = EventCodec::new();
        let mut full = BytesMut::new();
        codec
            .encode(EventFrame([1, 3, 0, 0, 0, 0, 0, 0]), &mut full)
            .unwrap();

        let mut partial = BytesMut::new();
        partial.extend_from_slice(&full[..10]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full[10..]);
        let frame = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(frame.words(), &[1, 3, 0, 0, 0, 0, 0, 0]);
        assert!(partial.is_empty());
    }

    #[test]
    fn test_event_multiple_frames_in_buffer() {
        let mut codec = EventCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(EventFrame([1, 1, 0, 0, 0, 0, 0, 0]), &mut buf).unwrap();
        codec.encode(EventFrame([2, 1, 0, 0, 0, 0, 0, 0]), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().words()[0], 1);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().words()[0], 2);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_event_truncated_at_eof() {
        let mut codec = EventCodec::new();
        let mut buf = BytesMut::from(&[0u8; 12][..]);

        let result = codec.decode_eof(&mut buf);
        assert!(matches!(
            result,
            Err(CodecError::Truncated {
                expected: FRAME_SIZE,
                received: 12
            })
        ));
    }

    #[test]
    fn test_event_clean_eof() {
        let mut codec = EventCodec::new();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_request_decode_float() {
        let mut codec = RequestCodec::new();
        let mut buf = BytesMut::from(&2.5f32.to_ne_bytes()[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(2.5));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_request_decode_waits_for_four_bytes() {
        let mut codec = RequestCodec::new();
        let bytes = 0.5f32.to_ne_bytes();
        let mut buf = BytesMut::from(&bytes[..3]);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[3..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(0.5));
    }

    #[test]
    fn test_request_decode_nan_passes_through() {
        let mut codec = RequestCodec::new();
        let mut buf = BytesMut::from(&f32::NAN.to_ne_bytes()[..]);

        let value = codec.decode(&mut buf).unwrap().unwrap();
        assert!(value.is_nan());
    }

    #[test]
    fn test_request_encode() {
        let mut codec = RequestCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(1.25, &mut buf).unwrap();
        assert_eq!(&buf[..], &1.25f32.to_ne_bytes());
    }

    #[test]
    fn test_request_truncated_at_eof() {
        let mut codec = RequestCodec::new();
        let mut buf = BytesMut::from(&[1u8, 2][..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(CodecError::Truncated {
                expected: REQUEST_SIZE,
                received: 2
            })
        ));
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::Truncated {
            expected: 32,
            received: 5,
        };
        assert_eq!(err.to_string(), "Stream ended mid-message: 5 of 32 bytes");

        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "connection reset");
        let err = CodecError::Io(io_err);
        assert!(err.to_string().contains("I/O error"));
        assert!(err.to_string().contains("connection reset"));
    }
}

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use spnav_proto::EventCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes from the daemon side must decode to frames or errors, never panic
    let mut codec = EventCodec::new();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(frame)) = codec.decode(&mut buf) {
        let _ = frame.to_event();
    }
});

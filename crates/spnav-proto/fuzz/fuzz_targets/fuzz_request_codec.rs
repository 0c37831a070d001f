#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use spnav_proto::RequestCodec;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Client requests are raw floats; any byte pattern (NaN, inf) must decode cleanly
    let mut codec = RequestCodec::new();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(_sensitivity)) = codec.decode(&mut buf) {}
});

#![no_main]

use bytes::Bytes;
use fb_protocol::{EventBuffer, ParameterBuffer, StatusVector, info, segment};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = Bytes::copy_from_slice(data);
    let _ = info::parse_info(&raw);
    let _ = ParameterBuffer::parse(&raw);
    let _ = EventBuffer::parse(data);
    let _ = segment::unpack(&raw);
    let _ = StatusVector::decode(&mut &data[..]);
});

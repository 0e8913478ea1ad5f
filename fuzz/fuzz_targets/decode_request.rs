#![no_main]

use bytes::Bytes;
use fb_protocol::Request;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut payload = Bytes::copy_from_slice(data);
    let _ = Request::decode(&mut payload);
});

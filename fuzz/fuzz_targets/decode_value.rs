#![no_main]

use fb_types::{ByteOrder, DatatypeCoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    for order in [ByteOrder::BigEndian, ByteOrder::LittleEndian] {
        let coder = DatatypeCoder::new(order);
        let _ = coder.decode_i16(Some(data));
        let _ = coder.decode_i32(Some(data));
        let _ = coder.decode_i64(Some(data));
        let _ = coder.decode_f64(Some(data));
        let _ = coder.decode_date(Some(data));
        let _ = coder.decode_time(Some(data));
        let _ = coder.decode_decimal64(Some(data));
        let _ = coder.decode_decimal128(Some(data));
        let _ = coder.decode_string(Some(data));
    }
});

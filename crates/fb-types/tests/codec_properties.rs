//! Property tests for the datatype codec.
//!
//! Every value must survive encode/decode in both byte orders, and decimal
//! values must survive bit for bit, special values included.

#![allow(clippy::unwrap_used)]

use fb_types::{ByteOrder, DatatypeCoder, Decimal64, Decimal128, DecimalKind};
use proptest::prelude::*;

fn coders() -> [DatatypeCoder; 2] {
    [
        DatatypeCoder::new(ByteOrder::BigEndian),
        DatatypeCoder::new(ByteOrder::LittleEndian),
    ]
}

fn decimal64() -> impl Strategy<Value = Decimal64> {
    prop_oneof![
        8 => (any::<bool>(), 0u128..10u128.pow(16), -398i32..=369)
            .prop_map(|(neg, c, e)| Decimal64::from_parts(neg, c, e).unwrap()),
        1 => any::<bool>().prop_map(Decimal64::infinity),
        1 => any::<bool>().prop_map(Decimal64::nan),
        1 => any::<bool>().prop_map(Decimal64::signaling_nan),
    ]
}

fn decimal128() -> impl Strategy<Value = Decimal128> {
    prop_oneof![
        8 => (any::<bool>(), 0u128..10u128.pow(34), -6176i32..=6111)
            .prop_map(|(neg, c, e)| Decimal128::from_parts(neg, c, e).unwrap()),
        1 => any::<bool>().prop_map(Decimal128::infinity),
        1 => any::<bool>().prop_map(Decimal128::nan),
        1 => any::<bool>().prop_map(Decimal128::signaling_nan),
    ]
}

proptest! {
    #[test]
    fn integers_survive_both_orders(a in any::<i16>(), b in any::<i32>(), c in any::<i64>(), d in any::<i128>()) {
        for coder in coders() {
            prop_assert_eq!(coder.decode_i16(Some(&coder.encode_i16(a))).unwrap(), a);
            prop_assert_eq!(coder.decode_i32(Some(&coder.encode_i32(b))).unwrap(), b);
            prop_assert_eq!(coder.decode_i64(Some(&coder.encode_i64(c))).unwrap(), c);
            prop_assert_eq!(coder.decode_i128(Some(&coder.encode_i128(d))).unwrap(), d);
        }
    }

    #[test]
    fn floats_keep_their_bits(x in any::<f64>()) {
        for coder in coders() {
            let decoded = coder.decode_f64(Some(&coder.encode_f64(x))).unwrap();
            prop_assert_eq!(decoded.to_bits(), x.to_bits());
        }
    }

    #[test]
    fn decimal64_is_exact(value in decimal64()) {
        prop_assert_eq!(Decimal64::from_bits(value.to_bits()), value);
        for coder in coders() {
            let decoded = coder.decode_decimal64(Some(&coder.encode_decimal64(&value))).unwrap();
            prop_assert_eq!(decoded, value);
        }
    }

    #[test]
    fn decimal128_is_exact(value in decimal128()) {
        prop_assert_eq!(Decimal128::from_bits(value.to_bits()), value);
        for coder in coders() {
            let decoded = coder.decode_decimal128(Some(&coder.encode_decimal128(&value))).unwrap();
            prop_assert_eq!(decoded, value);
        }
    }

    #[test]
    fn decoding_arbitrary_bits_is_total(bits in any::<u64>()) {
        let value = Decimal64::from_bits(bits);
        if value.kind() == DecimalKind::Finite {
            prop_assert!(value.coefficient() < 10u128.pow(16));
            prop_assert!((-398..=369).contains(&value.exponent()));
        }
    }
}

#[test]
fn null_decodes_to_zero_in_both_orders() {
    for coder in coders() {
        assert_eq!(coder.decode_i16(None).unwrap(), 0);
        assert_eq!(coder.decode_i32(None).unwrap(), 0);
        assert_eq!(coder.decode_i64(None).unwrap(), 0);
        assert_eq!(coder.decode_i128(None).unwrap(), 0);
    }
}

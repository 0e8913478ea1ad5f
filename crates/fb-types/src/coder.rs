//! The datatype coder.
//!
//! A [`DatatypeCoder`] converts Rust values to and from the byte sequences
//! carried in row payloads. Byte order and character set are fixed when the
//! coder is built; the attachment creates one after negotiation and every
//! encode and decode for that connection goes through it.
//!
//! Integer decoders treat a missing or empty value as zero so callers never
//! need to null-check before decoding.

use bytes::Bytes;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use encoding_rs::Encoding;
use rust_decimal::Decimal;

use crate::charset::{CharsetLookup, DefaultCharsets};
use crate::decimal::{Decimal64, Decimal128};
use crate::error::TypeError;

/// Days between 0001-01-01 (day 1) and the date epoch 1858-11-17.
const DATE_EPOCH_DAYS_FROM_CE: i32 = 678_576;

/// Time values count units of 100 microseconds.
const TIME_UNITS_PER_SECOND: u32 = 10_000;
const NANOS_PER_TIME_UNIT: u32 = 100_000;

/// Byte order of encoded values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ByteOrder {
    /// Network order, used on the wire.
    #[default]
    BigEndian,
    /// Little-endian, used by embedded and native buffers.
    LittleEndian,
}

/// Storage width of a scaled integer (NUMERIC/DECIMAL) column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntegerWidth {
    /// `SMALLINT` storage.
    Short,
    /// `INTEGER` storage.
    Long,
    /// `BIGINT` storage.
    Int64,
    /// `INT128` storage.
    Int128,
}

/// Encoder and decoder for a fixed byte order and character set.
#[derive(Debug, Clone)]
pub struct DatatypeCoder {
    order: ByteOrder,
    charset: String,
    encoding: &'static Encoding,
}

impl Default for DatatypeCoder {
    fn default() -> Self {
        Self::new(ByteOrder::BigEndian)
    }
}

macro_rules! fixed_int {
    ($(#[$enc:meta])* $encode:ident, $(#[$dec:meta])* $decode:ident, $ty:ty, $size:literal) => {
        $(#[$enc])*
        #[must_use]
        pub fn $encode(&self, value: $ty) -> Bytes {
            let bytes = match self.order {
                ByteOrder::BigEndian => value.to_be_bytes(),
                ByteOrder::LittleEndian => value.to_le_bytes(),
            };
            Bytes::copy_from_slice(&bytes)
        }

        $(#[$dec])*
        pub fn $decode(&self, data: Option<&[u8]>) -> Result<$ty, TypeError> {
            match fixed::<$size>(data)? {
                None => Ok(0 as $ty),
                Some(bytes) => Ok(match self.order {
                    ByteOrder::BigEndian => <$ty>::from_be_bytes(bytes),
                    ByteOrder::LittleEndian => <$ty>::from_le_bytes(bytes),
                }),
            }
        }
    };
}

impl DatatypeCoder {
    /// Coder for `order` with UTF-8 strings.
    #[must_use]
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            charset: "UTF8".to_string(),
            encoding: encoding_rs::UTF_8,
        }
    }

    /// Coder for `order` and a server character set resolved by `lookup`.
    pub fn with_charset(
        order: ByteOrder,
        charset: &str,
        lookup: &dyn CharsetLookup,
    ) -> Result<Self, TypeError> {
        let encoding = lookup
            .encoding_for(charset)
            .ok_or_else(|| TypeError::UnknownCharset(charset.to_string()))?;
        Ok(Self {
            order,
            charset: charset.to_ascii_uppercase(),
            encoding,
        })
    }

    /// Coder for `order` and `charset` using [`DefaultCharsets`].
    pub fn for_charset(order: ByteOrder, charset: &str) -> Result<Self, TypeError> {
        Self::with_charset(order, charset, &DefaultCharsets)
    }

    /// Byte order of this coder.
    #[must_use]
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Server character set name.
    #[must_use]
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Encoding used for strings.
    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Encode a 16-bit integer.
    ///
    /// Big-endian values are widened to 4 bytes, little-endian ones take 2.
    #[must_use]
    pub fn encode_i16(&self, value: i16) -> Bytes {
        match self.order {
            ByteOrder::BigEndian => Bytes::copy_from_slice(&i32::from(value).to_be_bytes()),
            ByteOrder::LittleEndian => Bytes::copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// Decode a 16-bit integer; accepts both the 2 and the 4 byte form.
    pub fn decode_i16(&self, data: Option<&[u8]>) -> Result<i16, TypeError> {
        let Some(data) = data.filter(|d| !d.is_empty()) else {
            return Ok(0);
        };
        if data.len() >= 4 {
            let wide = self.decode_i32(Some(data))?;
            return i16::try_from(wide).map_err(|_| TypeError::OutOfRange { target_type: "i16" });
        }
        let bytes = fixed::<2>(Some(data))?.unwrap_or_default();
        Ok(match self.order {
            ByteOrder::BigEndian => i16::from_be_bytes(bytes),
            ByteOrder::LittleEndian => i16::from_le_bytes(bytes),
        })
    }

    fixed_int!(
        /// Encode a 32-bit integer.
        encode_i32,
        /// Decode a 32-bit integer.
        decode_i32,
        i32,
        4
    );

    fixed_int!(
        /// Encode a 64-bit integer.
        encode_i64,
        /// Decode a 64-bit integer.
        decode_i64,
        i64,
        8
    );

    fixed_int!(
        /// Encode a 128-bit integer.
        encode_i128,
        /// Decode a 128-bit integer.
        decode_i128,
        i128,
        16
    );

    /// Encode a 32-bit float.
    #[must_use]
    pub fn encode_f32(&self, value: f32) -> Bytes {
        self.encode_i32(value.to_bits() as i32)
    }

    /// Decode a 32-bit float.
    pub fn decode_f32(&self, data: Option<&[u8]>) -> Result<f32, TypeError> {
        Ok(f32::from_bits(self.decode_i32(data)? as u32))
    }

    /// Encode a 64-bit float.
    #[must_use]
    pub fn encode_f64(&self, value: f64) -> Bytes {
        self.encode_i64(value.to_bits() as i64)
    }

    /// Decode a 64-bit float.
    pub fn decode_f64(&self, data: Option<&[u8]>) -> Result<f64, TypeError> {
        Ok(f64::from_bits(self.decode_i64(data)? as u64))
    }

    /// Encode a boolean as one byte.
    #[must_use]
    pub fn encode_bool(&self, value: bool) -> Bytes {
        Bytes::copy_from_slice(&[u8::from(value)])
    }

    /// Decode a boolean; any non-zero byte is true.
    #[must_use]
    pub fn decode_bool(&self, data: Option<&[u8]>) -> bool {
        data.and_then(|d| d.first()).is_some_and(|b| *b != 0)
    }

    /// Encode a date as days since 1858-11-17.
    #[must_use]
    pub fn encode_date(&self, date: NaiveDate) -> Bytes {
        self.encode_i32(date.num_days_from_ce() - DATE_EPOCH_DAYS_FROM_CE)
    }

    /// Decode a date; `None` for a missing value.
    pub fn decode_date(&self, data: Option<&[u8]>) -> Result<Option<NaiveDate>, TypeError> {
        if is_null(data) {
            return Ok(None);
        }
        let days = self.decode_i32(data)?;
        days.checked_add(DATE_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(Some)
            .ok_or_else(|| TypeError::InvalidDateTime(format!("day number {days}")))
    }

    /// Encode a time of day in units of 100 microseconds.
    #[must_use]
    pub fn encode_time(&self, time: NaiveTime) -> Bytes {
        self.encode_i32(time_units(time) as i32)
    }

    /// Decode a time of day; `None` for a missing value.
    pub fn decode_time(&self, data: Option<&[u8]>) -> Result<Option<NaiveTime>, TypeError> {
        if is_null(data) {
            return Ok(None);
        }
        time_from_units(self.decode_i32(data)? as u32).map(Some)
    }

    /// Encode a timestamp as date followed by time.
    #[must_use]
    pub fn encode_timestamp(&self, value: NaiveDateTime) -> Bytes {
        let mut buf = Vec::with_capacity(8);
        buf.extend_from_slice(&self.encode_date(value.date()));
        buf.extend_from_slice(&self.encode_time(value.time()));
        Bytes::from(buf)
    }

    /// Decode a timestamp; `None` for a missing value.
    pub fn decode_timestamp(
        &self,
        data: Option<&[u8]>,
    ) -> Result<Option<NaiveDateTime>, TypeError> {
        let Some(data) = data.filter(|d| !d.is_empty()) else {
            return Ok(None);
        };
        if data.len() < 8 {
            return Err(TypeError::BufferTooSmall {
                needed: 8,
                available: data.len(),
            });
        }
        let date = self.decode_date(Some(&data[..4]))?;
        let time = self.decode_time(Some(&data[4..8]))?;
        Ok(date.zip(time).map(|(d, t)| d.and_time(t)))
    }

    /// Encode a Decimal64 in this coder's byte order.
    #[must_use]
    pub fn encode_decimal64(&self, value: &Decimal64) -> Bytes {
        self.ordered(value.to_bytes())
    }

    /// Decode a Decimal64; zero for a missing value.
    pub fn decode_decimal64(&self, data: Option<&[u8]>) -> Result<Decimal64, TypeError> {
        Ok(match fixed::<8>(data)? {
            None => Decimal64::zero(),
            Some(bytes) => Decimal64::from_bytes(self.reorder(bytes)),
        })
    }

    /// Encode a Decimal128 in this coder's byte order.
    #[must_use]
    pub fn encode_decimal128(&self, value: &Decimal128) -> Bytes {
        self.ordered(value.to_bytes())
    }

    /// Decode a Decimal128; zero for a missing value.
    pub fn decode_decimal128(&self, data: Option<&[u8]>) -> Result<Decimal128, TypeError> {
        Ok(match fixed::<16>(data)? {
            None => Decimal128::zero(),
            Some(bytes) => Decimal128::from_bytes(self.reorder(bytes)),
        })
    }

    /// Encode a scaled integer (NUMERIC/DECIMAL column).
    ///
    /// `scale` is the column scale as reported by the server (zero or
    /// negative); the value is rounded to `-scale` fractional digits.
    pub fn encode_scaled(
        &self,
        value: Decimal,
        scale: i16,
        width: IntegerWidth,
    ) -> Result<Bytes, TypeError> {
        let digits = u32::from(scale.unsigned_abs());
        if scale > 0 || digits > Decimal::MAX_SCALE {
            return Err(TypeError::OutOfRange {
                target_type: "scaled integer",
            });
        }
        let mut scaled = value;
        scaled.rescale(digits);
        if scaled.scale() != digits {
            return Err(TypeError::OutOfRange {
                target_type: "scaled integer",
            });
        }
        let raw = scaled.mantissa();
        let out_of_range = |target_type| TypeError::OutOfRange { target_type };
        Ok(match width {
            IntegerWidth::Short => {
                self.encode_i16(i16::try_from(raw).map_err(|_| out_of_range("i16"))?)
            }
            IntegerWidth::Long => {
                self.encode_i32(i32::try_from(raw).map_err(|_| out_of_range("i32"))?)
            }
            IntegerWidth::Int64 => {
                self.encode_i64(i64::try_from(raw).map_err(|_| out_of_range("i64"))?)
            }
            IntegerWidth::Int128 => self.encode_i128(raw),
        })
    }

    /// Decode a scaled integer; the storage width follows the value length.
    pub fn decode_scaled(&self, data: Option<&[u8]>, scale: i16) -> Result<Decimal, TypeError> {
        let raw = match data.map_or(0, <[u8]>::len) {
            0 => 0,
            2 => i128::from(self.decode_i16(data)?),
            4 => i128::from(self.decode_i32(data)?),
            8 => i128::from(self.decode_i64(data)?),
            16 => self.decode_i128(data)?,
            other => {
                return Err(TypeError::BufferTooSmall {
                    needed: 16,
                    available: other,
                });
            }
        };
        let out_of_range = || TypeError::OutOfRange {
            target_type: "rust_decimal::Decimal",
        };
        if scale > 0 {
            let factor = 10i128.checked_pow(scale as u32).ok_or_else(out_of_range)?;
            let value = raw.checked_mul(factor).ok_or_else(out_of_range)?;
            return Decimal::try_from_i128_with_scale(value, 0).map_err(|_| out_of_range());
        }
        Decimal::try_from_i128_with_scale(raw, u32::from(scale.unsigned_abs()))
            .map_err(|_| out_of_range())
    }

    /// Encode a string in the coder's character set.
    pub fn encode_string(&self, value: &str) -> Result<Bytes, TypeError> {
        if self.encoding == encoding_rs::UTF_8 {
            return Ok(Bytes::copy_from_slice(value.as_bytes()));
        }
        let (encoded, _, had_errors) = self.encoding.encode(value);
        if had_errors {
            return Err(TypeError::InvalidEncoding(format!(
                "text not representable in {}",
                self.charset
            )));
        }
        Ok(Bytes::copy_from_slice(&encoded))
    }

    /// Decode a string; empty for a missing value.
    pub fn decode_string(&self, data: Option<&[u8]>) -> Result<String, TypeError> {
        let Some(data) = data else {
            return Ok(String::new());
        };
        self.encoding
            .decode_without_bom_handling_and_without_replacement(data)
            .map(|s| s.into_owned())
            .ok_or_else(|| TypeError::InvalidEncoding(format!("invalid {} data", self.charset)))
    }

    fn ordered<const N: usize>(&self, mut big_endian: [u8; N]) -> Bytes {
        if self.order == ByteOrder::LittleEndian {
            big_endian.reverse();
        }
        Bytes::copy_from_slice(&big_endian)
    }

    fn reorder<const N: usize>(&self, mut bytes: [u8; N]) -> [u8; N] {
        if self.order == ByteOrder::LittleEndian {
            bytes.reverse();
        }
        bytes
    }
}

fn is_null(data: Option<&[u8]>) -> bool {
    data.is_none_or(<[u8]>::is_empty)
}

fn fixed<const N: usize>(data: Option<&[u8]>) -> Result<Option<[u8; N]>, TypeError> {
    let Some(data) = data.filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    match data.get(..N) {
        Some(head) => {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(head);
            Ok(Some(bytes))
        }
        None => Err(TypeError::BufferTooSmall {
            needed: N,
            available: data.len(),
        }),
    }
}

fn time_units(time: NaiveTime) -> u32 {
    let nanos = time.nanosecond().min(999_999_999);
    time.num_seconds_from_midnight() * TIME_UNITS_PER_SECOND + nanos / NANOS_PER_TIME_UNIT
}

fn time_from_units(units: u32) -> Result<NaiveTime, TypeError> {
    let seconds = units / TIME_UNITS_PER_SECOND;
    let nanos = (units % TIME_UNITS_PER_SECOND) * NANOS_PER_TIME_UNIT;
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, nanos)
        .ok_or_else(|| TypeError::InvalidDateTime(format!("time value {units}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn be() -> DatatypeCoder {
        DatatypeCoder::new(ByteOrder::BigEndian)
    }

    fn le() -> DatatypeCoder {
        DatatypeCoder::new(ByteOrder::LittleEndian)
    }

    #[test]
    fn test_short_width_depends_on_order() {
        assert_eq!(&be().encode_i16(-2)[..], &[0xff, 0xff, 0xff, 0xfe]);
        assert_eq!(&le().encode_i16(-2)[..], &[0xfe, 0xff]);
        assert_eq!(be().decode_i16(Some(&[0xff, 0xff, 0xff, 0xfe])).unwrap(), -2);
        assert_eq!(le().decode_i16(Some(&[0xfe, 0xff])).unwrap(), -2);
        assert!(be().decode_i16(Some(&[0, 1, 0, 0])).is_err());
    }

    #[test]
    fn test_null_and_empty_decode_to_zero() {
        for coder in [be(), le()] {
            assert_eq!(coder.decode_i16(None).unwrap(), 0);
            assert_eq!(coder.decode_i32(Some(&[])).unwrap(), 0);
            assert_eq!(coder.decode_i64(None).unwrap(), 0);
            assert_eq!(coder.decode_i128(Some(&[])).unwrap(), 0);
            assert_eq!(coder.decode_decimal64(None).unwrap(), Decimal64::zero());
        }
    }

    #[test]
    fn test_short_buffer() {
        assert_eq!(
            be().decode_i64(Some(&[1, 2, 3])),
            Err(TypeError::BufferTooSmall {
                needed: 8,
                available: 3
            })
        );
    }

    #[test]
    fn test_byte_order_of_int() {
        assert_eq!(&be().encode_i32(0x0102_0304)[..], &[1, 2, 3, 4]);
        assert_eq!(&le().encode_i32(0x0102_0304)[..], &[4, 3, 2, 1]);
    }

    #[test]
    fn test_decimal_little_endian_is_reversed() {
        let value = Decimal64::from_parts(false, 1, 0).unwrap();
        let mut big = be().encode_decimal64(&value).to_vec();
        big.reverse();
        assert_eq!(&le().encode_decimal64(&value)[..], &big[..]);
        assert_eq!(le().decode_decimal64(Some(&big)).unwrap(), value);
    }

    #[test]
    fn test_dates() {
        let coder = be();
        let epoch = NaiveDate::from_ymd_opt(1858, 11, 17).unwrap();
        assert_eq!(&coder.encode_date(epoch)[..], &[0, 0, 0, 0]);

        let y2k = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap();
        assert_eq!(coder.decode_i32(Some(&coder.encode_date(y2k))).unwrap(), 51_544);
        assert_eq!(coder.decode_date(Some(&coder.encode_date(y2k))).unwrap(), Some(y2k));
        assert_eq!(coder.decode_date(None).unwrap(), None);
    }

    #[test]
    fn test_time_precision() {
        let coder = le();
        let time = NaiveTime::from_hms_micro_opt(13, 45, 30, 123_456).unwrap();
        let decoded = coder.decode_time(Some(&coder.encode_time(time))).unwrap().unwrap();
        assert_eq!(decoded, NaiveTime::from_hms_micro_opt(13, 45, 30, 123_400).unwrap());
        assert!(coder.decode_time(Some(&coder.encode_i32(864_000_000))).is_err());
    }

    #[test]
    fn test_timestamp() {
        let coder = be();
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let encoded = coder.encode_timestamp(ts);
        assert_eq!(encoded.len(), 8);
        assert_eq!(coder.decode_timestamp(Some(&encoded)).unwrap(), Some(ts));
    }

    #[test]
    fn test_scaled_numeric() {
        let coder = be();
        let value: Decimal = "123.456".parse().unwrap();
        let encoded = coder.encode_scaled(value, -2, IntegerWidth::Int64).unwrap();
        assert_eq!(coder.decode_i64(Some(&encoded)).unwrap(), 12_346);
        assert_eq!(
            coder.decode_scaled(Some(&encoded), -2).unwrap(),
            "123.46".parse::<Decimal>().unwrap()
        );

        let too_big: Decimal = "1000".parse().unwrap();
        assert!(coder.encode_scaled(too_big, -2, IntegerWidth::Short).is_err());
    }

    #[test]
    fn test_strings_follow_charset() {
        let win = DatatypeCoder::for_charset(ByteOrder::BigEndian, "WIN1252").unwrap();
        let encoded = win.encode_string("café").unwrap();
        assert_eq!(&encoded[..], b"caf\xe9");
        assert_eq!(win.decode_string(Some(&encoded)).unwrap(), "café");
        assert!(win.encode_string("日本").is_err());

        let utf8 = be();
        assert_eq!(utf8.encode_string("café").unwrap().len(), 5);
        assert!(utf8.decode_string(Some(b"\xff")).is_err());
        assert_eq!(utf8.decode_string(None).unwrap(), "");

        assert!(matches!(
            DatatypeCoder::for_charset(ByteOrder::BigEndian, "OCTETS"),
            Err(TypeError::UnknownCharset(_))
        ));
    }
}

//! IEEE 754-2008 decimal floating point in densely packed decimal encoding.
//!
//! [`Decimal64`] holds 16 significant digits, [`Decimal128`] holds 34. Values
//! keep their representation: `1.0` and `1.00` are different values, as are
//! `+0` and `-0`. Equality is representation equality, so a NaN equals
//! itself.

use std::fmt;

use rust_decimal::Decimal;

use crate::error::TypeError;

/// Classification of a decimal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecimalKind {
    /// A finite number.
    Finite,
    /// Positive or negative infinity.
    Infinity,
    /// Quiet NaN.
    NaN,
    /// Signaling NaN.
    SignalingNaN,
}

struct Format {
    name: &'static str,
    total_bits: u32,
    digits: u32,
    bias: i32,
    exponent_continuation_bits: u32,
    declets: u32,
}

const FORMAT_64: Format = Format {
    name: "Decimal64",
    total_bits: 64,
    digits: 16,
    bias: 398,
    exponent_continuation_bits: 8,
    declets: 5,
};

const FORMAT_128: Format = Format {
    name: "Decimal128",
    total_bits: 128,
    digits: 34,
    bias: 6176,
    exponent_continuation_bits: 12,
    declets: 11,
};

const COMBINATION_INFINITY: u128 = 0b11110;
const COMBINATION_NAN: u128 = 0b11111;

impl Format {
    fn max_biased_exponent(&self) -> i32 {
        (3 << self.exponent_continuation_bits) - 1
    }

    fn min_exponent(&self) -> i32 {
        -self.bias
    }

    fn max_exponent(&self) -> i32 {
        self.max_biased_exponent() - self.bias
    }

    fn max_coefficient(&self) -> u128 {
        10u128.pow(self.digits) - 1
    }

    fn combination_shift(&self) -> u32 {
        self.total_bits - 6
    }

    fn encode(&self, negative: bool, kind: DecimalKind, coefficient: u128, exponent: i32) -> u128 {
        let sign = u128::from(negative) << (self.total_bits - 1);
        let shift = self.combination_shift();
        match kind {
            DecimalKind::Infinity => sign | (COMBINATION_INFINITY << shift),
            DecimalKind::NaN => sign | (COMBINATION_NAN << shift),
            DecimalKind::SignalingNaN => sign | (COMBINATION_NAN << shift) | (1 << (shift - 1)),
            DecimalKind::Finite => {
                let biased = (exponent + self.bias) as u128;
                let msd_unit = 10u128.pow(self.digits - 1);
                let lead = coefficient / msd_unit;
                let mut rest = coefficient % msd_unit;

                let mut continuation = 0u128;
                for i in 0..self.declets {
                    let declet = encode_declet((rest % 1000) as u16);
                    continuation |= u128::from(declet) << (10 * i);
                    rest /= 1000;
                }

                let exponent_msb = biased >> self.exponent_continuation_bits;
                let exponent_rest = biased & ((1 << self.exponent_continuation_bits) - 1);
                let combination = if lead < 8 {
                    (exponent_msb << 3) | lead
                } else {
                    0b11000 | (exponent_msb << 1) | (lead & 1)
                };

                sign | (combination << shift)
                    | (exponent_rest << (shift - self.exponent_continuation_bits))
                    | continuation
            }
        }
    }

    fn decode(&self, bits: u128) -> (bool, DecimalKind, u128, i32) {
        let negative = (bits >> (self.total_bits - 1)) & 1 == 1;
        let shift = self.combination_shift();
        let combination = (bits >> shift) & 0x1f;

        if combination >> 1 == 0b1111 {
            let kind = if combination & 1 == 0 {
                DecimalKind::Infinity
            } else if (bits >> (shift - 1)) & 1 == 1 {
                DecimalKind::SignalingNaN
            } else {
                DecimalKind::NaN
            };
            return (negative, kind, 0, 0);
        }

        let (exponent_msb, lead) = if combination >> 3 != 0b11 {
            (combination >> 3, combination & 0b111)
        } else {
            ((combination >> 1) & 0b11, 8 + (combination & 1))
        };
        let exponent_rest = (bits >> (shift - self.exponent_continuation_bits))
            & ((1 << self.exponent_continuation_bits) - 1);
        let biased = (exponent_msb << self.exponent_continuation_bits) | exponent_rest;

        let mut coefficient = 0u128;
        for i in (0..self.declets).rev() {
            let declet = ((bits >> (10 * i)) & 0x3ff) as u16;
            coefficient = coefficient * 1000 + u128::from(decode_declet(declet));
        }
        coefficient += lead * 10u128.pow(self.digits - 1);

        (negative, DecimalKind::Finite, coefficient, biased as i32 - self.bias)
    }

    fn check(&self, coefficient: u128, exponent: i32) -> Result<(), TypeError> {
        if coefficient > self.max_coefficient() {
            return Err(TypeError::InvalidDecimal(format!(
                "coefficient {coefficient} has more than {} digits",
                self.digits
            )));
        }
        if exponent < self.min_exponent() || exponent > self.max_exponent() {
            return Err(TypeError::InvalidDecimal(format!(
                "exponent {exponent} outside {}..={} for {}",
                self.min_exponent(),
                self.max_exponent(),
                self.name
            )));
        }
        Ok(())
    }
}

/// Encode three decimal digits (0..=999) as a 10-bit declet.
pub(crate) fn encode_declet(value: u16) -> u16 {
    let digit = |d: u16| ((d >> 3) & 1, (d >> 2) & 1, (d >> 1) & 1, d & 1);
    let (a, b, c, d) = digit(value / 100);
    let (e, f, g, h) = digit((value / 10) % 10);
    let (i, j, k, m) = digit(value % 10);

    let [p, q, r, s, t, u, v, w, x, y] = match (a, e, i) {
        (0, 0, 0) => [b, c, d, f, g, h, 0, j, k, m],
        (0, 0, 1) => [b, c, d, f, g, h, 1, 0, 0, m],
        (0, 1, 0) => [b, c, d, j, k, h, 1, 0, 1, m],
        (0, 1, 1) => [b, c, d, 1, 0, h, 1, 1, 1, m],
        (1, 0, 0) => [j, k, d, f, g, h, 1, 1, 0, m],
        (1, 0, 1) => [f, g, d, 0, 1, h, 1, 1, 1, m],
        (1, 1, 0) => [j, k, d, 0, 0, h, 1, 1, 1, m],
        _ => [0, 0, d, 1, 1, h, 1, 1, 1, m],
    };
    (p << 9) | (q << 8) | (r << 7) | (s << 6) | (t << 5) | (u << 4) | (v << 3) | (w << 2) | (x << 1) | y
}

/// Decode a 10-bit declet into three decimal digits.
///
/// Non-canonical declets decode like their canonical counterparts.
pub(crate) fn decode_declet(declet: u16) -> u16 {
    let bit = |n: u16| (declet >> n) & 1;
    let (p, q, r, s, t, u, v, w, x, y) = (
        bit(9),
        bit(8),
        bit(7),
        bit(6),
        bit(5),
        bit(4),
        bit(3),
        bit(2),
        bit(1),
        bit(0),
    );
    let small = |hi: u16, mid: u16, lo: u16| (hi << 2) | (mid << 1) | lo;
    let large = |lo: u16| 8 + lo;

    let (d1, d2, d3) = if v == 0 {
        (small(p, q, r), small(s, t, u), small(w, x, y))
    } else {
        match (w, x, s, t) {
            (0, 0, _, _) => (small(p, q, r), small(s, t, u), large(y)),
            (0, 1, _, _) => (small(p, q, r), large(u), small(s, t, y)),
            (1, 0, _, _) => (large(r), small(s, t, u), small(p, q, y)),
            (_, _, 0, 0) => (large(r), large(u), small(p, q, y)),
            (_, _, 0, 1) => (large(r), small(p, q, u), large(y)),
            (_, _, 1, 0) => (small(p, q, r), large(u), large(y)),
            _ => (large(r), large(u), large(y)),
        }
    };
    d1 * 100 + d2 * 10 + d3
}

fn to_rust_decimal(
    negative: bool,
    kind: DecimalKind,
    coefficient: u128,
    exponent: i32,
) -> Result<Decimal, TypeError> {
    if kind != DecimalKind::Finite {
        return Err(TypeError::OutOfRange {
            target_type: "rust_decimal::Decimal",
        });
    }
    let out_of_range = || TypeError::OutOfRange {
        target_type: "rust_decimal::Decimal",
    };

    let mut coefficient = coefficient;
    let mut exponent = exponent;
    while exponent < -(Decimal::MAX_SCALE as i32) && coefficient % 10 == 0 && coefficient > 0 {
        coefficient /= 10;
        exponent += 1;
    }
    if coefficient == 0 {
        exponent = exponent.clamp(-(Decimal::MAX_SCALE as i32), 0);
    }
    if exponent > 0 {
        coefficient = 10u128
            .checked_pow(exponent as u32)
            .and_then(|scale| coefficient.checked_mul(scale))
            .ok_or_else(out_of_range)?;
        exponent = 0;
    }
    if exponent < -(Decimal::MAX_SCALE as i32) {
        return Err(out_of_range());
    }

    let signed = i128::try_from(coefficient).map_err(|_| out_of_range())?;
    let signed = if negative { -signed } else { signed };
    Decimal::try_from_i128_with_scale(signed, (-exponent) as u32).map_err(|_| out_of_range())
}

fn from_rust_decimal(format: &Format, value: Decimal) -> Result<(bool, u128, i32), TypeError> {
    let mut coefficient = value.mantissa().unsigned_abs();
    let mut exponent = -(value.scale() as i32);
    while coefficient > format.max_coefficient() && coefficient % 10 == 0 {
        coefficient /= 10;
        exponent += 1;
    }
    format.check(coefficient, exponent)?;
    Ok((value.is_sign_negative(), coefficient, exponent))
}

fn write_scientific(
    f: &mut fmt::Formatter<'_>,
    negative: bool,
    kind: DecimalKind,
    coefficient: u128,
    exponent: i32,
) -> fmt::Result {
    if negative {
        f.write_str("-")?;
    }
    let digits = match kind {
        DecimalKind::Infinity => return f.write_str("Infinity"),
        DecimalKind::NaN => return f.write_str("NaN"),
        DecimalKind::SignalingNaN => return f.write_str("sNaN"),
        DecimalKind::Finite => coefficient.to_string(),
    };

    let len = digits.len() as i32;
    let adjusted = exponent + len - 1;
    if exponent <= 0 && adjusted >= -6 {
        if exponent == 0 {
            return f.write_str(&digits);
        }
        let point = len + exponent;
        if point > 0 {
            let (int, frac) = digits.split_at(point as usize);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{}{digits}", "0".repeat((-point) as usize))
        }
    } else {
        let (first, rest) = digits.split_at(1);
        f.write_str(first)?;
        if !rest.is_empty() {
            write!(f, ".{rest}")?;
        }
        write!(f, "E{}{adjusted}", if adjusted >= 0 { "+" } else { "" })
    }
}

macro_rules! decimal_type {
    ($(#[$doc:meta])* $name:ident, $bytes:literal, $format:ident, $bits:ty) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            negative: bool,
            kind: DecimalKind,
            coefficient: u128,
            exponent: i32,
        }

        impl $name {
            /// Size of the encoded value in bytes.
            pub const SIZE: usize = $bytes;

            /// Build a finite value `(-1)^negative * coefficient * 10^exponent`.
            pub fn from_parts(negative: bool, coefficient: u128, exponent: i32) -> Result<Self, TypeError> {
                $format.check(coefficient, exponent)?;
                Ok(Self {
                    negative,
                    kind: DecimalKind::Finite,
                    coefficient,
                    exponent,
                })
            }

            /// Positive zero with exponent 0.
            #[must_use]
            pub const fn zero() -> Self {
                Self::special(false, DecimalKind::Finite)
            }

            /// Infinity with the given sign.
            #[must_use]
            pub const fn infinity(negative: bool) -> Self {
                Self::special(negative, DecimalKind::Infinity)
            }

            /// Quiet NaN with the given sign.
            #[must_use]
            pub const fn nan(negative: bool) -> Self {
                Self::special(negative, DecimalKind::NaN)
            }

            /// Signaling NaN with the given sign.
            #[must_use]
            pub const fn signaling_nan(negative: bool) -> Self {
                Self::special(negative, DecimalKind::SignalingNaN)
            }

            const fn special(negative: bool, kind: DecimalKind) -> Self {
                Self {
                    negative,
                    kind,
                    coefficient: 0,
                    exponent: 0,
                }
            }

            /// Whether the sign bit is set.
            #[must_use]
            pub fn is_negative(&self) -> bool {
                self.negative
            }

            /// Classification.
            #[must_use]
            pub fn kind(&self) -> DecimalKind {
                self.kind
            }

            /// Whether the value is finite.
            #[must_use]
            pub fn is_finite(&self) -> bool {
                self.kind == DecimalKind::Finite
            }

            /// Coefficient; 0 for special values.
            #[must_use]
            pub fn coefficient(&self) -> u128 {
                self.coefficient
            }

            /// Unbiased exponent; 0 for special values.
            #[must_use]
            pub fn exponent(&self) -> i32 {
                self.exponent
            }

            /// Raw interchange bits.
            #[must_use]
            pub fn to_bits(&self) -> $bits {
                $format.encode(self.negative, self.kind, self.coefficient, self.exponent) as $bits
            }

            /// Value from raw interchange bits.
            #[must_use]
            pub fn from_bits(bits: $bits) -> Self {
                let (negative, kind, coefficient, exponent) = $format.decode(u128::from(bits));
                Self {
                    negative,
                    kind,
                    coefficient,
                    exponent,
                }
            }

            /// Big-endian interchange encoding.
            #[must_use]
            pub fn to_bytes(&self) -> [u8; $bytes] {
                self.to_bits().to_be_bytes()
            }

            /// Value from its big-endian interchange encoding.
            #[must_use]
            pub fn from_bytes(bytes: [u8; $bytes]) -> Self {
                Self::from_bits(<$bits>::from_be_bytes(bytes))
            }

            /// Convert from a `rust_decimal::Decimal`.
            ///
            /// Trailing zeros are dropped when the coefficient would otherwise
            /// not fit.
            pub fn from_decimal(value: Decimal) -> Result<Self, TypeError> {
                let (negative, coefficient, exponent) = from_rust_decimal(&$format, value)?;
                Self::from_parts(negative, coefficient, exponent)
            }

            /// Convert to a `rust_decimal::Decimal`, when representable.
            pub fn to_decimal(&self) -> Result<Decimal, TypeError> {
                to_rust_decimal(self.negative, self.kind, self.coefficient, self.exponent)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_scientific(f, self.negative, self.kind, self.coefficient, self.exponent)
            }
        }

        impl TryFrom<Decimal> for $name {
            type Error = TypeError;

            fn try_from(value: Decimal) -> Result<Self, Self::Error> {
                Self::from_decimal(value)
            }
        }
    };
}

decimal_type! {
    /// 64-bit decimal: 16 digits, exponent -398..=369.
    Decimal64, 8, FORMAT_64, u64
}

decimal_type! {
    /// 128-bit decimal: 34 digits, exponent -6176..=6111.
    Decimal128, 16, FORMAT_128, u128
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_every_declet_roundtrips() {
        for n in 0..1000u16 {
            assert_eq!(decode_declet(encode_declet(n)), n, "digits {n}");
        }
        assert_eq!(encode_declet(0), 0);
        assert_eq!(encode_declet(8), 0x008);
        assert_eq!(encode_declet(999), 0x0ff);
    }

    #[test]
    fn test_decimal64_known_encodings() {
        assert_eq!(Decimal64::zero().to_bits(), 0x2238_0000_0000_0000);
        assert_eq!(
            Decimal64::from_parts(false, 1, 0).unwrap().to_bits(),
            0x2238_0000_0000_0001
        );
        assert_eq!(
            Decimal64::from_parts(true, 1, 0).unwrap().to_bits(),
            0xA238_0000_0000_0001
        );
        assert_eq!(Decimal64::infinity(false).to_bits(), 0x7800_0000_0000_0000);
        assert_eq!(Decimal64::nan(false).to_bits(), 0x7C00_0000_0000_0000);
        assert_eq!(Decimal64::signaling_nan(false).to_bits(), 0x7E00_0000_0000_0000);
    }

    #[test]
    fn test_decimal128_known_encodings() {
        assert_eq!(
            Decimal128::zero().to_bits(),
            0x2208_0000_0000_0000_0000_0000_0000_0000
        );
        assert_eq!(
            Decimal128::infinity(true).to_bits(),
            0xF800_0000_0000_0000_0000_0000_0000_0000
        );
    }

    #[test]
    fn test_extremes() {
        let max = Decimal64::from_parts(false, 9_999_999_999_999_999, 369).unwrap();
        assert_eq!(Decimal64::from_bits(max.to_bits()), max);

        let min = Decimal128::from_parts(true, 1, -6176).unwrap();
        assert_eq!(Decimal128::from_bytes(min.to_bytes()), min);

        assert!(Decimal64::from_parts(false, 10_000_000_000_000_000, 0).is_err());
        assert!(Decimal64::from_parts(false, 1, 370).is_err());
        assert!(Decimal128::from_parts(false, 1, -6177).is_err());
    }

    #[test]
    fn test_specials_keep_sign() {
        for value in [
            Decimal128::infinity(true),
            Decimal128::nan(true),
            Decimal128::signaling_nan(false),
        ] {
            assert_eq!(Decimal128::from_bits(value.to_bits()), value);
        }
    }

    #[test]
    fn test_display() {
        let show = |neg, c, e| Decimal64::from_parts(neg, c, e).unwrap().to_string();
        assert_eq!(show(false, 12345, -2), "123.45");
        assert_eq!(show(true, 5, -3), "-0.005");
        assert_eq!(show(false, 123, 0), "123");
        assert_eq!(show(false, 123, 3), "1.23E+5");
        assert_eq!(show(false, 1, -10), "1E-10");
        assert_eq!(Decimal64::nan(false).to_string(), "NaN");
        assert_eq!(Decimal64::infinity(true).to_string(), "-Infinity");
    }

    #[test]
    fn test_rust_decimal_conversion() {
        let value: Decimal = "-1234.5600".parse().unwrap();
        let dec = Decimal64::from_decimal(value).unwrap();
        assert!(dec.is_negative());
        assert_eq!(dec.coefficient(), 12_345_600);
        assert_eq!(dec.exponent(), -4);
        assert_eq!(dec.to_decimal().unwrap(), value);

        let big = Decimal128::from_parts(false, 15, 3).unwrap();
        assert_eq!(big.to_decimal().unwrap(), Decimal::from(15_000));

        assert!(Decimal128::nan(false).to_decimal().is_err());
        assert!(
            Decimal128::from_parts(false, 1, 40)
                .unwrap()
                .to_decimal()
                .is_err()
        );
    }
}

//! # fb-types
//!
//! The datatype codec: conversion between Rust values and the byte
//! sequences carried in row payloads.
//!
//! ## Features
//!
//! - Integers of 16, 32, 64 and 128 bits in either byte order
//! - IEEE 754-2008 Decimal64 and Decimal128 (densely packed decimal)
//! - Dates, times and timestamps via `chrono`
//! - Scaled NUMERIC/DECIMAL values via `rust_decimal`
//! - Charset-aware strings via `encoding_rs`, behind an injectable lookup
//!
//! ## Type Mappings
//!
//! | Server Type | Rust Type |
//! |-------------|-----------|
//! | `SMALLINT` | `i16` |
//! | `INTEGER` | `i32` |
//! | `BIGINT` | `i64` |
//! | `INT128` | `i128` |
//! | `FLOAT` | `f32` |
//! | `DOUBLE PRECISION` | `f64` |
//! | `BOOLEAN` | `bool` |
//! | `NUMERIC`/`DECIMAL` | `rust_decimal::Decimal` |
//! | `DECFLOAT(16)` | [`Decimal64`] |
//! | `DECFLOAT(34)` | [`Decimal128`] |
//! | `DATE` | `chrono::NaiveDate` |
//! | `TIME` | `chrono::NaiveTime` |
//! | `TIMESTAMP` | `chrono::NaiveDateTime` |
//! | `CHAR`/`VARCHAR` | `String` |

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod charset;
pub mod coder;
pub mod decimal;
pub mod error;

pub use charset::{CharsetLookup, DefaultCharsets};
pub use coder::{ByteOrder, DatatypeCoder, IntegerWidth};
pub use decimal::{Decimal64, Decimal128, DecimalKind};
pub use error::TypeError;

//! Status vectors.
//!
//! Every response carries a status vector. On the wire it is a sequence of
//! tagged arguments terminated by [`ARG_END`]; an `ARG_GDS` or `ARG_WARNING`
//! tag starts a new entry and the tags after it are that entry's parameters.

use std::fmt;

use bytes::{Buf, BufMut};

use crate::codes;
use crate::error::ProtocolError;
use crate::xdr;

/// End of the vector.
pub const ARG_END: u32 = 0;
/// Error code.
pub const ARG_GDS: u32 = 1;
/// String parameter.
pub const ARG_STRING: u32 = 2;
/// Numeric parameter.
pub const ARG_NUMBER: u32 = 4;
/// Pre-formatted message text.
pub const ARG_INTERPRETED: u32 = 5;
/// Warning code.
pub const ARG_WARNING: u32 = 18;
/// SQLSTATE value.
pub const ARG_SQL_STATE: u32 = 19;

/// Whether an entry is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// The operation failed.
    Error,
    /// Advisory; the operation completed.
    Warning,
}

/// A parameter attached to a status entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusParam {
    /// Numeric argument.
    Number(i32),
    /// String argument substituted into the message template.
    String(String),
    /// Complete message text supplied by the server.
    Interpreted(String),
}

impl fmt::Display for StatusParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) | Self::Interpreted(s) => f.write_str(s),
        }
    }
}

/// One (kind, code, arguments) entry of a status vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// Error or warning.
    pub kind: StatusKind,
    /// Server error code.
    pub code: u32,
    /// Parameters in wire order.
    pub params: Vec<StatusParam>,
}

impl StatusEntry {
    /// Create an error entry.
    #[must_use]
    pub fn error(code: u32) -> Self {
        Self {
            kind: StatusKind::Error,
            code,
            params: Vec::new(),
        }
    }

    /// Create a warning entry.
    #[must_use]
    pub fn warning(code: u32) -> Self {
        Self {
            kind: StatusKind::Warning,
            code,
            params: Vec::new(),
        }
    }

    /// Append a string parameter.
    #[must_use]
    pub fn with_string(mut self, value: impl Into<String>) -> Self {
        self.params.push(StatusParam::String(value.into()));
        self
    }

    /// Append a numeric parameter.
    #[must_use]
    pub fn with_number(mut self, value: i32) -> Self {
        self.params.push(StatusParam::Number(value));
        self
    }

    /// Human-readable message for this entry.
    #[must_use]
    pub fn message(&self) -> String {
        if let Some(StatusParam::Interpreted(text)) = self
            .params
            .iter()
            .find(|p| matches!(p, StatusParam::Interpreted(_)))
        {
            return text.clone();
        }
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        codes::format_message(self.code, &params)
    }
}

/// Diagnostics returned with a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusVector {
    entries: Vec<StatusEntry>,
    sql_state: Option<String>,
}

impl StatusVector {
    /// An empty (successful) vector.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// A vector holding a single error.
    #[must_use]
    pub fn error(code: u32) -> Self {
        Self::from_entry(StatusEntry::error(code))
    }

    /// A vector holding a single entry.
    #[must_use]
    pub fn from_entry(entry: StatusEntry) -> Self {
        Self {
            entries: vec![entry],
            sql_state: None,
        }
    }

    /// Append an entry.
    pub fn push(&mut self, entry: StatusEntry) {
        self.entries.push(entry);
    }

    /// Set the SQLSTATE.
    #[must_use]
    pub fn with_sql_state(mut self, state: impl Into<String>) -> Self {
        self.sql_state = Some(state.into());
        self
    }

    /// All entries in wire order.
    #[must_use]
    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    /// SQLSTATE reported by the server, if any.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    /// Whether any entry is a non-zero error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error_code().is_some()
    }

    /// First non-zero error code.
    #[must_use]
    pub fn error_code(&self) -> Option<u32> {
        self.errors().next().map(|e| e.code)
    }

    /// Whether the vector contains an error with `code`.
    #[must_use]
    pub fn contains(&self, code: u32) -> bool {
        self.entries.iter().any(|e| e.code == code)
    }

    /// Error entries.
    pub fn errors(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == StatusKind::Error && e.code != 0)
    }

    /// Warning entries.
    pub fn warnings(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == StatusKind::Warning)
    }

    /// Whether the vector carries warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// A copy holding only the warning entries.
    #[must_use]
    pub fn warnings_only(&self) -> Self {
        Self {
            entries: self.warnings().cloned().collect(),
            sql_state: None,
        }
    }

    /// Decode a vector.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let mut vector = Self::default();
        loop {
            let tag = xdr::read_u32(src)?;
            match tag {
                ARG_END => break,
                ARG_GDS => {
                    let code = xdr::read_u32(src)?;
                    // A zero error code is the success marker.
                    if code != 0 {
                        vector.entries.push(StatusEntry::error(code));
                    }
                }
                ARG_WARNING => {
                    let code = xdr::read_u32(src)?;
                    vector.entries.push(StatusEntry::warning(code));
                }
                ARG_NUMBER => {
                    let value = xdr::read_i32(src)?;
                    vector.push_param(StatusParam::Number(value))?;
                }
                ARG_STRING => {
                    let value = xdr::read_string(src)?;
                    vector.push_param(StatusParam::String(value))?;
                }
                ARG_INTERPRETED => {
                    let value = xdr::read_string(src)?;
                    vector.push_param(StatusParam::Interpreted(value))?;
                }
                ARG_SQL_STATE => {
                    vector.sql_state = Some(xdr::read_string(src)?);
                }
                other => return Err(ProtocolError::InvalidStatusArgument(other)),
            }
        }
        Ok(vector)
    }

    fn push_param(&mut self, param: StatusParam) -> Result<(), ProtocolError> {
        match self.entries.last_mut() {
            Some(entry) => {
                entry.params.push(param);
                Ok(())
            }
            None => Err(ProtocolError::InvalidField("status parameter without code")),
        }
    }

    /// Encode the vector. An empty vector encodes as a zero error code.
    pub fn encode(&self, dst: &mut impl BufMut) {
        if self.entries.is_empty() {
            xdr::write_u32(dst, ARG_GDS);
            xdr::write_u32(dst, 0);
        }
        for entry in &self.entries {
            let tag = match entry.kind {
                StatusKind::Error => ARG_GDS,
                StatusKind::Warning => ARG_WARNING,
            };
            xdr::write_u32(dst, tag);
            xdr::write_u32(dst, entry.code);
            for param in &entry.params {
                match param {
                    StatusParam::Number(n) => {
                        xdr::write_u32(dst, ARG_NUMBER);
                        xdr::write_i32(dst, *n);
                    }
                    StatusParam::String(s) => {
                        xdr::write_u32(dst, ARG_STRING);
                        xdr::write_string(dst, s);
                    }
                    StatusParam::Interpreted(s) => {
                        xdr::write_u32(dst, ARG_INTERPRETED);
                        xdr::write_string(dst, s);
                    }
                }
            }
        }
        if let Some(state) = &self.sql_state {
            xdr::write_u32(dst, ARG_SQL_STATE);
            xdr::write_string(dst, state);
        }
        xdr::write_u32(dst, ARG_END);
    }
}

impl fmt::Display for StatusVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in &self.entries {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            f.write_str(&entry.message())?;
        }
        if first {
            f.write_str("success")?;
        }
        Ok(())
    }
}

//! Statement descriptions and row payloads.

use bytes::{Buf, BufMut, Bytes};

use crate::error::ProtocolError;
use crate::xdr;

/// SQL type codes used in field descriptors.
pub mod sql_type {
    /// Fixed-length text.
    pub const TEXT: u32 = 452;
    /// Variable-length text.
    pub const VARYING: u32 = 448;
    /// 16-bit integer.
    pub const SHORT: u32 = 500;
    /// 32-bit integer.
    pub const LONG: u32 = 496;
    /// 32-bit float.
    pub const FLOAT: u32 = 482;
    /// 64-bit float.
    pub const DOUBLE: u32 = 480;
    /// Timestamp.
    pub const TIMESTAMP: u32 = 510;
    /// Blob id.
    pub const BLOB: u32 = 520;
    /// Time of day.
    pub const TIME: u32 = 560;
    /// Date.
    pub const DATE: u32 = 570;
    /// 64-bit integer.
    pub const INT64: u32 = 580;
    /// 128-bit integer.
    pub const INT128: u32 = 32752;
    /// Decimal64.
    pub const DEC16: u32 = 32760;
    /// Decimal128.
    pub const DEC34: u32 = 32762;
    /// Boolean.
    pub const BOOLEAN: u32 = 32764;
    /// Untyped null.
    pub const NULL: u32 = 32766;
}

/// Kind of a prepared statement as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum StatementType {
    /// `SELECT`.
    Select,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
    /// Data definition.
    Ddl,
    /// Procedure call or a DML statement with `RETURNING`.
    ExecProcedure,
    /// `SET TRANSACTION`.
    StartTransaction,
    /// `COMMIT`.
    Commit,
    /// `ROLLBACK`.
    Rollback,
    /// `SELECT ... FOR UPDATE`.
    SelectForUpdate,
    /// `SET GENERATOR`.
    SetGenerator,
    /// `SAVEPOINT`.
    SavePoint,
    /// Anything else.
    Other(u32),
}

impl StatementType {
    /// Create from the wire value.
    #[must_use]
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Select,
            2 => Self::Insert,
            3 => Self::Update,
            4 => Self::Delete,
            5 => Self::Ddl,
            8 => Self::ExecProcedure,
            9 => Self::StartTransaction,
            10 => Self::Commit,
            11 => Self::Rollback,
            12 => Self::SelectForUpdate,
            13 => Self::SetGenerator,
            14 => Self::SavePoint,
            other => Self::Other(other),
        }
    }

    /// Wire value.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        match self {
            Self::Select => 1,
            Self::Insert => 2,
            Self::Update => 3,
            Self::Delete => 4,
            Self::Ddl => 5,
            Self::ExecProcedure => 8,
            Self::StartTransaction => 9,
            Self::Commit => 10,
            Self::Rollback => 11,
            Self::SelectForUpdate => 12,
            Self::SetGenerator => 13,
            Self::SavePoint => 14,
            Self::Other(value) => value,
        }
    }

    /// Whether execution opens a cursor.
    #[must_use]
    pub fn has_cursor(self) -> bool {
        matches!(self, Self::Select | Self::SelectForUpdate)
    }
}

/// Metadata of one input parameter or output column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldDescriptor {
    /// SQL type code, see [`sql_type`].
    pub sql_type: u32,
    /// Sub type (blob sub type, numeric flavour, character set).
    pub sub_type: i32,
    /// Decimal scale.
    pub scale: i32,
    /// Length in bytes.
    pub length: u32,
    /// Whether the value may be null.
    pub nullable: bool,
    /// Column name.
    pub field_name: String,
    /// Table name.
    pub relation_name: String,
    /// Alias in the select list.
    pub alias: String,
    /// Owner of the table.
    pub owner: String,
}

impl FieldDescriptor {
    /// Descriptor for an anonymous field of `sql_type`.
    #[must_use]
    pub fn new(sql_type: u32, length: u32) -> Self {
        Self {
            sql_type,
            length,
            nullable: true,
            ..Self::default()
        }
    }

    /// Set the column name and alias.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.alias = name.clone();
        self.field_name = name;
        self
    }

    /// Whether the field holds a blob id.
    #[must_use]
    pub fn is_blob(&self) -> bool {
        self.sql_type == sql_type::BLOB
    }

    fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        Ok(Self {
            sql_type: xdr::read_u32(src)?,
            sub_type: xdr::read_i32(src)?,
            scale: xdr::read_i32(src)?,
            length: xdr::read_u32(src)?,
            nullable: xdr::read_bool(src)?,
            field_name: xdr::read_string(src)?,
            relation_name: xdr::read_string(src)?,
            alias: xdr::read_string(src)?,
            owner: xdr::read_string(src)?,
        })
    }

    fn encode(&self, dst: &mut impl BufMut) {
        xdr::write_u32(dst, self.sql_type);
        xdr::write_i32(dst, self.sub_type);
        xdr::write_i32(dst, self.scale);
        xdr::write_u32(dst, self.length);
        xdr::write_bool(dst, self.nullable);
        xdr::write_string(dst, &self.field_name);
        xdr::write_string(dst, &self.relation_name);
        xdr::write_string(dst, &self.alias);
        xdr::write_string(dst, &self.owner);
    }
}

/// Result of preparing a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementDescription {
    /// Statement kind.
    pub statement_type: StatementType,
    /// Input parameters.
    pub parameters: Vec<FieldDescriptor>,
    /// Output columns.
    pub fields: Vec<FieldDescriptor>,
}

impl StatementDescription {
    /// Decode a description.
    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        let statement_type = StatementType::from_u32(xdr::read_u32(src)?);
        let parameters = decode_descriptors(src)?;
        let fields = decode_descriptors(src)?;
        Ok(Self {
            statement_type,
            parameters,
            fields,
        })
    }

    /// Encode a description.
    pub fn encode(&self, dst: &mut impl BufMut) {
        xdr::write_u32(dst, self.statement_type.to_u32());
        encode_descriptors(dst, &self.parameters);
        encode_descriptors(dst, &self.fields);
    }
}

fn decode_descriptors(src: &mut impl Buf) -> Result<Vec<FieldDescriptor>, ProtocolError> {
    let count = xdr::read_u32(src)? as usize;
    // Each descriptor needs at least 36 bytes; refuse counts the buffer cannot hold.
    if count > src.remaining() / 36 {
        return Err(ProtocolError::UnexpectedEof);
    }
    (0..count).map(|_| FieldDescriptor::decode(src)).collect()
}

fn encode_descriptors(dst: &mut impl BufMut, descriptors: &[FieldDescriptor]) {
    xdr::write_u32(dst, descriptors.len() as u32);
    for descriptor in descriptors {
        descriptor.encode(dst);
    }
}

/// Field values of one row as sent on the wire.
///
/// Each value is already encoded by the datatype coder; the framing layer
/// only knows whether a field is null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowData {
    /// Field values, `None` for null.
    pub fields: Vec<Option<Bytes>>,
}

impl RowData {
    /// Row from field values.
    #[must_use]
    pub fn new(fields: Vec<Option<Bytes>>) -> Self {
        Self { fields }
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode a row; values share the allocation of `src`.
    pub fn decode(src: &mut Bytes) -> Result<Self, ProtocolError> {
        let count = xdr::read_u32(src)? as usize;
        if count > src.remaining() / 4 {
            return Err(ProtocolError::UnexpectedEof);
        }
        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            if xdr::read_bool(src)? {
                fields.push(None);
            } else {
                fields.push(Some(xdr::read_opaque(src)?));
            }
        }
        Ok(Self { fields })
    }

    /// Encode a row.
    pub fn encode(&self, dst: &mut impl BufMut) {
        xdr::write_u32(dst, self.fields.len() as u32);
        for field in &self.fields {
            match field {
                None => xdr::write_bool(dst, true),
                Some(value) => {
                    xdr::write_bool(dst, false);
                    xdr::write_opaque(dst, value);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_description_encoding() {
        let description = StatementDescription {
            statement_type: StatementType::Select,
            parameters: vec![FieldDescriptor::new(sql_type::LONG, 4)],
            fields: vec![
                FieldDescriptor::new(sql_type::VARYING, 40).named("NAME"),
                FieldDescriptor::new(sql_type::BLOB, 8).named("NOTES"),
            ],
        };
        let mut buf = BytesMut::new();
        description.encode(&mut buf);
        let decoded = StatementDescription::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded, description);
        assert!(decoded.statement_type.has_cursor());
        assert!(decoded.fields[1].is_blob());
    }

    #[test]
    fn test_row_values_share_frame() {
        let row = RowData::new(vec![
            Some(Bytes::from_static(&[0, 0, 0, 42])),
            None,
            Some(Bytes::from_static(b"abc")),
        ]);
        let mut buf = BytesMut::new();
        row.encode(&mut buf);
        let frame = buf.freeze();
        let mut src = frame.clone();
        let decoded = RowData::decode(&mut src).unwrap();
        assert_eq!(decoded, row);

        let value = decoded.fields[2].as_ref().unwrap();
        let frame_range = frame.as_ptr() as usize..frame.as_ptr() as usize + frame.len();
        assert!(frame_range.contains(&(value.as_ptr() as usize)));
    }

    #[test]
    fn test_statement_type_roundtrip_of_unknown() {
        assert_eq!(StatementType::from_u32(99), StatementType::Other(99));
        assert_eq!(StatementType::Other(99).to_u32(), 99);
        assert!(!StatementType::ExecProcedure.has_cursor());
    }

    #[test]
    fn test_absurd_descriptor_count() {
        let mut buf = BytesMut::new();
        xdr::write_u32(&mut buf, 1);
        xdr::write_u32(&mut buf, 1_000_000);
        assert!(StatementDescription::decode(&mut buf.freeze()).is_err());
    }
}

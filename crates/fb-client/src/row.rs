//! Fetched rows.
//!
//! Each fetch produces immutable [`RowValue`] snapshots. Field values are
//! `Bytes` slices of the response frame they arrived in, so all rows of one
//! fetch share a single allocation which is released once the caller drops
//! the last of them. Rows never alias buffers of other fetches.
//!
//! ## Access Patterns
//!
//! - `get_bytes()` - borrowed encoded value
//! - `get_string()`, `get_i32()`, ... - decoded through the attachment's
//!   [`DatatypeCoder`]
//! - `blob_id()` - id of a blob field, for [`Attachment::create_blob_for_input`]
//!
//! [`Attachment::create_blob_for_input`]: crate::Attachment::create_blob_for_input

use std::sync::Arc;

use bytes::Bytes;
use fb_protocol::{FieldDescriptor, RowData};
use fb_types::DatatypeCoder;

use crate::blob::BlobId;
use crate::error::Result;

/// One row of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowValue {
    values: Vec<Option<Bytes>>,
    columns: Arc<[FieldDescriptor]>,
}

impl RowValue {
    pub(crate) fn new(data: RowData, columns: Arc<[FieldDescriptor]>) -> Self {
        Self {
            values: data.fields,
            columns,
        }
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column descriptors.
    #[must_use]
    pub fn columns(&self) -> &[FieldDescriptor] {
        &self.columns
    }

    /// Index of the column with `name` (alias first, then field name).
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.alias.eq_ignore_ascii_case(name))
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.field_name.eq_ignore_ascii_case(name))
            })
    }

    /// Whether the field is null. Out of range counts as null.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.get_bytes(index).is_none()
    }

    /// Encoded value of a field; `None` for null.
    #[must_use]
    pub fn get_bytes(&self, index: usize) -> Option<&[u8]> {
        self.values.get(index).and_then(|v| v.as_deref())
    }

    /// Iterate over the encoded values.
    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.values.iter().map(|v| v.as_deref())
    }

    /// Decode a 32-bit integer field.
    pub fn get_i32(&self, coder: &DatatypeCoder, index: usize) -> Result<Option<i32>> {
        self.decode(index, |data| coder.decode_i32(Some(data)))
    }

    /// Decode a 64-bit integer field.
    pub fn get_i64(&self, coder: &DatatypeCoder, index: usize) -> Result<Option<i64>> {
        self.decode(index, |data| coder.decode_i64(Some(data)))
    }

    /// Decode a double precision field.
    pub fn get_f64(&self, coder: &DatatypeCoder, index: usize) -> Result<Option<f64>> {
        self.decode(index, |data| coder.decode_f64(Some(data)))
    }

    /// Decode a character field.
    pub fn get_string(&self, coder: &DatatypeCoder, index: usize) -> Result<Option<String>> {
        self.decode(index, |data| coder.decode_string(Some(data)))
    }

    /// Id of a blob field.
    pub fn blob_id(&self, coder: &DatatypeCoder, index: usize) -> Result<Option<BlobId>> {
        self.decode(index, |data| coder.decode_i64(Some(data)).map(|v| BlobId::new(v as u64)))
    }

    /// Convert back into wire form, e.g. to re-send as parameters.
    #[must_use]
    pub fn to_row_data(&self) -> RowData {
        RowData::new(self.values.clone())
    }

    fn decode<T>(
        &self,
        index: usize,
        f: impl FnOnce(&[u8]) -> std::result::Result<T, fb_types::TypeError>,
    ) -> Result<Option<T>> {
        match self.get_bytes(index) {
            Some(data) => Ok(Some(f(data)?)),
            None => Ok(None),
        }
    }
}

/// Result of one fetch round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// Rows returned, possibly fewer than requested and possibly none.
    pub rows: Vec<RowValue>,
    /// Whether the cursor is positioned after its last row.
    pub after_last: bool,
}

impl FetchResult {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fb_protocol::describe::sql_type;

    fn sample() -> RowValue {
        let coder = DatatypeCoder::default();
        let columns: Arc<[FieldDescriptor]> = vec![
            FieldDescriptor::new(sql_type::LONG, 4).named("ID"),
            FieldDescriptor::new(sql_type::VARYING, 20).named("NAME"),
            FieldDescriptor::new(sql_type::BLOB, 8).named("NOTES"),
        ]
        .into();
        RowValue::new(
            RowData::new(vec![
                Some(coder.encode_i32(7)),
                Some(coder.encode_string("seven").unwrap()),
                None,
            ]),
            columns,
        )
    }

    #[test]
    fn test_typed_access() {
        let coder = DatatypeCoder::default();
        let row = sample();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get_i32(&coder, 0).unwrap(), Some(7));
        assert_eq!(row.get_string(&coder, 1).unwrap().as_deref(), Some("seven"));
        assert!(row.is_null(2));
        assert_eq!(row.blob_id(&coder, 2).unwrap(), None);
        assert!(row.is_null(9));
    }

    #[test]
    fn test_find_by_name() {
        let row = sample();
        assert_eq!(row.find_by_name("name"), Some(1));
        assert_eq!(row.find_by_name("MISSING"), None);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let row = sample();
        let copy = row.to_row_data();
        drop(row);
        assert_eq!(copy.len(), 3);
    }
}

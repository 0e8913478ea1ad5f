//! Column descriptors and row values for canned statements.
//!
//! Values are produced in network byte order, the way a server sends them.

use bytes::Bytes;
use fb_protocol::describe::sql_type;
use fb_protocol::{FieldDescriptor, RowData};

/// A nullable 32-bit integer column.
pub fn int_column(name: &str) -> FieldDescriptor {
    FieldDescriptor::new(sql_type::LONG, 4).named(name)
}

/// A nullable 64-bit integer column.
pub fn bigint_column(name: &str) -> FieldDescriptor {
    FieldDescriptor::new(sql_type::INT64, 8).named(name)
}

/// A `VARCHAR(length)` column.
pub fn varchar_column(name: &str, length: u32) -> FieldDescriptor {
    FieldDescriptor::new(sql_type::VARYING, length).named(name)
}

/// A blob column.
pub fn blob_column(name: &str) -> FieldDescriptor {
    FieldDescriptor::new(sql_type::BLOB, 8).named(name)
}

/// A 32-bit integer value.
pub fn int(value: i32) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

/// A 64-bit integer value.
pub fn bigint(value: i64) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

/// A blob id value.
pub fn blob_id(id: u64) -> Bytes {
    Bytes::copy_from_slice(&id.to_be_bytes())
}

/// A UTF-8 text value.
pub fn text(value: &str) -> Bytes {
    Bytes::copy_from_slice(value.as_bytes())
}

/// A row without nulls.
pub fn row(values: impl IntoIterator<Item = Bytes>) -> RowData {
    RowData::new(values.into_iter().map(Some).collect())
}

/// A row where `None` is a null value.
pub fn row_with_nulls(values: impl IntoIterator<Item = Option<Bytes>>) -> RowData {
    RowData::new(values.into_iter().collect())
}

/// `count` single-column integer rows numbered from 1.
pub fn numbered_rows(count: i32) -> Vec<RowData> {
    (1..=count).map(|n| row([int(n)])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_big_endian() {
        assert_eq!(int(1).as_ref(), &[0, 0, 0, 1]);
        assert_eq!(bigint(-1).as_ref(), &[0xFF; 8]);
        assert_eq!(blob_id(0x0102).as_ref(), &[0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_rows() {
        let r = row_with_nulls([Some(text("a")), None]);
        assert_eq!(r.len(), 2);
        assert!(r.fields[1].is_none());
        assert_eq!(numbered_rows(3).len(), 3);
        assert!(blob_column("DATA").is_blob());
    }
}

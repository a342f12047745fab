//! Row codec
//!
//! Turns a raw result row into a mapping from [`Field`] to a typed value.
//! NULL columns are left out of the mapping. The decode plan is resolved
//! once per statement from the static schema; result columns that the
//! schema does not describe are skipped instead of failing the read.

use crate::error::{SnapError, SnapResult};
use crate::store::schema::{self, Category, ColumnDef, Field};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Row, Statement};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Platform line separator used when normalising large text
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// A decoded column value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Borrow as text, if this is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer, if this is an integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as a timestamp, if this is a timestamp
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&hex::encode(b)),
            Self::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
        }
    }
}

/// Decoded row: only non-null columns are present
pub type RowData = BTreeMap<Field, FieldValue>;

/// Per-statement decode plan
pub struct RowCodec {
    plan: Vec<Option<&'static ColumnDef>>,
}

impl RowCodec {
    /// Resolve each result column of `stmt` against `columns`
    pub fn for_statement(stmt: &Statement<'_>, columns: &'static [ColumnDef]) -> Self {
        let plan = stmt
            .column_names()
            .into_iter()
            .map(|name| {
                let def = schema::lookup(columns, name);
                if def.is_none() {
                    debug!("Skipping undescribed column {}", name);
                }
                def
            })
            .collect();
        Self { plan }
    }

    /// Decode one row
    pub fn decode(&self, row: &Row<'_>) -> rusqlite::Result<RowData> {
        let mut data = RowData::new();
        for (idx, def) in self.plan.iter().enumerate() {
            let Some(def) = def else { continue };
            let raw = row.get_ref(idx)?;
            if let Some(value) = decode_value(def.category, raw) {
                data.insert(def.field, value);
            }
        }
        Ok(data)
    }

    /// Run a prepared statement and decode every row
    pub fn query_all(
        stmt: &mut Statement<'_>,
        columns: &'static [ColumnDef],
        params: impl rusqlite::Params,
    ) -> SnapResult<Vec<RowData>> {
        let codec = Self::for_statement(stmt, columns);
        let rows = stmt
            .query_map(params, |row| codec.decode(row))
            .map_err(|e| SnapError::storage("querying rows", e))?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| SnapError::storage("decoding rows", e))
    }
}

fn decode_value(category: Category, raw: ValueRef<'_>) -> Option<FieldValue> {
    match (category, raw) {
        (_, ValueRef::Null) => None,

        (Category::Integer, ValueRef::Integer(v)) => Some(FieldValue::Int(v)),
        (Category::Integer, ValueRef::Real(v)) => Some(FieldValue::Int(v as i64)),

        (Category::Binary, ValueRef::Blob(b)) => Some(FieldValue::Bytes(b.to_vec())),
        (Category::Binary, ValueRef::Text(t)) => Some(FieldValue::Bytes(t.to_vec())),

        (Category::LargeText, ValueRef::Text(t)) => {
            Some(FieldValue::Text(normalize_lines(&String::from_utf8_lossy(t))))
        }

        (Category::Timestamp, ValueRef::Text(t)) => {
            let text = String::from_utf8_lossy(t);
            match DateTime::parse_from_rfc3339(&text) {
                Ok(ts) => Some(FieldValue::Timestamp(ts.with_timezone(&Utc))),
                Err(_) => Some(FieldValue::Text(text.into_owned())),
            }
        }
        (Category::Timestamp, ValueRef::Integer(millis)) => match Utc.timestamp_millis_opt(millis) {
            chrono::LocalResult::Single(ts) => Some(FieldValue::Timestamp(ts)),
            _ => Some(FieldValue::Int(millis)),
        },

        // Everything else falls back to its natural value or a string.
        (_, ValueRef::Integer(v)) => Some(FieldValue::Int(v)),
        (_, ValueRef::Real(v)) => Some(FieldValue::Text(v.to_string())),
        (_, ValueRef::Text(t)) => Some(FieldValue::Text(String::from_utf8_lossy(t).into_owned())),
        (_, ValueRef::Blob(b)) => Some(FieldValue::Bytes(b.to_vec())),
    }
}

/// Re-join text line by line with the platform separator
///
/// Every line, including the last, is terminated by the separator, so
/// decoding an already normalised value is a no-op.
pub fn normalize_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + LINE_SEPARATOR.len());
    for line in text.lines() {
        out.push_str(line);
        out.push_str(LINE_SEPARATOR);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{MEMBER_COLUMNS, ROW_ID};
    use rusqlite::Connection;

    fn decode_single(sql: &str) -> RowData {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare(sql).unwrap();
        let mut rows = RowCodec::query_all(&mut stmt, MEMBER_COLUMNS, []).unwrap();
        assert_eq!(rows.len(), 1);
        rows.remove(0)
    }

    #[test]
    fn nulls_are_omitted() {
        let row = decode_single("SELECT 'a.txt' AS name, NULL AS author");
        assert_eq!(row.get(&Field::Name), Some(&FieldValue::Text("a.txt".into())));
        assert!(!row.contains_key(&Field::Author));
    }

    #[test]
    fn unknown_columns_are_skipped() {
        let row = decode_single("SELECT 'x' AS name, 42 AS mystery");
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn real_decodes_to_integer() {
        let row = decode_single("SELECT 2.9 AS delta");
        assert_eq!(row.get(&Field::Delta), Some(&FieldValue::Int(2)));
    }

    #[test]
    fn large_text_is_normalised() {
        let row = decode_single("SELECT 'one' || char(13) || char(10) || 'two' AS description");
        let expected = format!("one{LINE_SEPARATOR}two{LINE_SEPARATOR}");
        assert_eq!(row.get(&Field::Description), Some(&FieldValue::Text(expected)));
    }

    #[test]
    fn empty_large_text_stays_empty() {
        let row = decode_single("SELECT '' AS description");
        assert_eq!(row.get(&Field::Description), Some(&FieldValue::Text(String::new())));
    }

    #[test]
    fn timestamps_decode_from_rfc3339() {
        let row = decode_single("SELECT '2024-01-15T10:00:00+00:00' AS timestamp");
        let ts = row.get(&Field::Timestamp).and_then(FieldValue::as_timestamp).unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-01-15T10:00:00+00:00");
    }

    #[test]
    fn unparseable_timestamp_falls_back_to_text() {
        let row = decode_single("SELECT 'yesterday' AS timestamp");
        assert_eq!(row.get(&Field::Timestamp), Some(&FieldValue::Text("yesterday".into())));
    }

    #[test]
    fn row_id_is_always_known() {
        let row = decode_single(&format!("SELECT 7 AS {}", ROW_ID.column));
        assert_eq!(row.get(&Field::RowId).and_then(FieldValue::as_i64), Some(7));
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_lines("a\r\nb");
        assert_eq!(normalize_lines(&once), once);
    }
}

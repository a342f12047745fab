//! Static table schema
//!
//! Every cached column is described once here: the field it decodes to,
//! its storage category and its SQL type. Table DDL is generated from
//! these descriptions and checked against the live table on creation,
//! so decoding never meets a column it does not know.

use crate::error::{SnapError, SnapResult, StorageContext};
use rusqlite::Connection;
use std::fmt;
use tracing::debug;

/// Registry of cache identifiers per job/configuration/build
pub const REGISTRY_TABLE: &str = "cache_registry";
/// One row per existing snapshot
pub const SNAPSHOT_CATALOG_TABLE: &str = "snapshot_catalog";
/// Member rows of every snapshot, keyed by cache identifier
pub const SNAPSHOT_MEMBERS_TABLE: &str = "snapshot_members";
/// One row per change-package side table
pub const CP_CATALOG_TABLE: &str = "change_package_catalog";
/// Change-package rows of every side table
pub const CP_ROWS_TABLE: &str = "change_packages";

/// Semantic field identifiers for decoded rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    RowId,
    Kind,
    Name,
    MemberId,
    Timestamp,
    Description,
    Author,
    ConfigPath,
    Revision,
    OldRevision,
    RelativePath,
    Checksum,
    Delta,
    ChangePackageId,
    ChangePackageState,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RowId => "row_id",
            Self::Kind => "kind",
            Self::Name => "name",
            Self::MemberId => "member_id",
            Self::Timestamp => "timestamp",
            Self::Description => "description",
            Self::Author => "author",
            Self::ConfigPath => "config_path",
            Self::Revision => "revision",
            Self::OldRevision => "old_revision",
            Self::RelativePath => "relative_path",
            Self::Checksum => "checksum",
            Self::Delta => "delta",
            Self::ChangePackageId => "cp_id",
            Self::ChangePackageState => "cp_state",
        };
        f.write_str(name)
    }
}

/// How a column's value is stored and decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// 64-bit integer (reals are truncated)
    Integer,
    /// Short text
    Text,
    /// Long text, normalised line by line on read
    LargeText,
    /// Raw bytes
    Binary,
    /// RFC3339 timestamp
    Timestamp,
}

impl Category {
    fn sql_type(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text | Self::LargeText | Self::Timestamp => "TEXT",
            Self::Binary => "BLOB",
        }
    }
}

/// Description of one cached column
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub field: Field,
    pub column: &'static str,
    pub category: Category,
    pub not_null: bool,
}

const fn col(field: Field, column: &'static str, category: Category, not_null: bool) -> ColumnDef {
    ColumnDef {
        field,
        column,
        category,
        not_null,
    }
}

/// Columns of the snapshot member table after the key columns
pub const MEMBER_COLUMNS: &[ColumnDef] = &[
    col(Field::Kind, "kind", Category::Integer, true),
    col(Field::Name, "name", Category::Text, true),
    col(Field::MemberId, "member_id", Category::Text, false),
    col(Field::Timestamp, "timestamp", Category::Timestamp, false),
    col(Field::Description, "description", Category::LargeText, false),
    col(Field::Author, "author", Category::Text, false),
    col(Field::ConfigPath, "config_path", Category::Text, false),
    col(Field::Revision, "revision", Category::Text, false),
    col(Field::OldRevision, "old_revision", Category::Text, false),
    col(Field::RelativePath, "relative_path", Category::Text, false),
    col(Field::Checksum, "checksum", Category::Text, false),
    col(Field::Delta, "delta", Category::Integer, false),
];

/// Columns of the change-package table after the key columns
pub const CP_COLUMNS: &[ColumnDef] = &[
    col(Field::ChangePackageId, "cp_id", Category::Text, true),
    col(Field::ChangePackageState, "cp_state", Category::Text, true),
];

/// Key column shared by the keyed tables
pub const ROW_ID: ColumnDef = col(Field::RowId, "row_id", Category::Integer, true);

/// Find the definition of a result column name
pub fn lookup(columns: &'static [ColumnDef], name: &str) -> Option<&'static ColumnDef> {
    if name.eq_ignore_ascii_case(ROW_ID.column) {
        return Some(&ROW_ID);
    }
    columns.iter().find(|def| def.column.eq_ignore_ascii_case(name))
}

/// Build the DDL for a keyed table
///
/// `owner` is the column that partitions rows between logical tables
/// (a cache identifier or a change-package table name).
pub fn create_keyed_table_sql(table: &str, owner: &str, columns: &[ColumnDef]) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    {} INTEGER PRIMARY KEY AUTOINCREMENT,\n    {owner} TEXT NOT NULL",
        ROW_ID.column
    );
    for def in columns {
        sql.push_str(",\n    ");
        sql.push_str(def.column);
        sql.push(' ');
        sql.push_str(def.category.sql_type());
        if def.not_null {
            sql.push_str(" NOT NULL");
        }
    }
    sql.push_str("\n)");
    sql
}

/// Check a live table against its static description
pub fn verify_table(
    conn: &Connection,
    table: &str,
    owner: &str,
    columns: &[ColumnDef],
) -> SnapResult<()> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .storage_context(|| format!("reading schema of {table}"))?;
    let live: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))
        .storage_context(|| format!("reading schema of {table}"))?
        .collect::<Result<_, _>>()
        .storage_context(|| format!("reading schema of {table}"))?;

    let expected = std::iter::once((ROW_ID.column, "INTEGER"))
        .chain(std::iter::once((owner, "TEXT")))
        .chain(columns.iter().map(|def| (def.column, def.category.sql_type())));

    let mut count = 0;
    for (column, sql_type) in expected {
        count += 1;
        let found = live
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .ok_or_else(|| SnapError::SchemaMismatch {
                table: table.to_string(),
                reason: format!("missing column {column}"),
            })?;
        if !found.1.eq_ignore_ascii_case(sql_type) {
            return Err(SnapError::SchemaMismatch {
                table: table.to_string(),
                reason: format!("column {column} is {} not {sql_type}", found.1),
            });
        }
    }

    if live.len() != count {
        return Err(SnapError::SchemaMismatch {
            table: table.to_string(),
            reason: format!("expected {count} columns, found {}", live.len()),
        });
    }

    debug!("Schema of {} verified", table);
    Ok(())
}

/// Probe whether a table is usable
///
/// Any failure to query counts as "absent", which callers treat as a
/// signal to create it.
pub fn table_exists(conn: &Connection, table: &str) -> bool {
    match conn.query_row(&format!("SELECT 1 FROM {table} LIMIT 1"), [], |_| Ok(())) {
        Ok(()) | Err(rusqlite::Error::QueryReturnedNoRows) => true,
        Err(e) => {
            debug!("Table {} not usable: {}", table, e);
            false
        }
    }
}

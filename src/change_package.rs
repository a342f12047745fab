//! Change-package side cache
//!
//! Tracks the open change packages of a project so every one of them is
//! seen by a build, even if it closes between two polls. Each project has
//! its own logical table; all of them share one physical row table keyed
//! by the table name.

use crate::error::{SnapError, SnapResult, StorageContext};
use crate::store::schema::{self, CP_CATALOG_TABLE, CP_COLUMNS, CP_ROWS_TABLE};
use crate::store::{Database, Field, RowCodec};
use chrono::Utc;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

const OWNER_COLUMN: &str = "table_name";
const MAX_TABLE_NAME: usize = 128;

/// Name of one project's change-package table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpTableName(String);

impl CpTableName {
    /// Accept names made of ASCII letters, digits and `_`, starting with a letter
    pub fn parse(raw: &str) -> SnapResult<Self> {
        let mut chars = raw.chars();
        let valid = raw.len() <= MAX_TABLE_NAME
            && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(SnapError::InvalidTableName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CpTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CpTableName {
    type Error = SnapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CpTableName> for String {
    fn from(value: CpTableName) -> Self {
        value.0
    }
}

/// Operations understood by [`ChangePackageCache::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpOperation {
    Add,
    Delete,
    Get,
}

impl FromStr for CpOperation {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "delete" => Ok(Self::Delete),
            "get" => Ok(Self::Get),
            other => Err(SnapError::User(format!(
                "Unknown change package operation '{other}'"
            ))),
        }
    }
}

/// One cached change package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePackageRecord {
    pub id: String,
    pub state: String,
}

/// Access to the change-package tables
#[derive(Clone)]
pub struct ChangePackageCache {
    db: Database,
}

impl ChangePackageCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the shared tables if needed
    pub fn ensure_exists(&self) -> SnapResult<()> {
        self.db.write("creating change package tables", |tx| {
            if !schema::table_exists(tx, CP_CATALOG_TABLE) {
                info!("Change package catalog doesn't exist, creating");
                tx.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {CP_CATALOG_TABLE} (
                        {OWNER_COLUMN} TEXT PRIMARY KEY,
                        created_at TEXT NOT NULL
                    )"
                ))
                .storage_context(|| "creating change package catalog".to_string())?;
            }
            if !schema::table_exists(tx, CP_ROWS_TABLE) {
                let ddl = schema::create_keyed_table_sql(CP_ROWS_TABLE, OWNER_COLUMN, CP_COLUMNS);
                tx.execute_batch(&format!(
                    "{ddl};
                     CREATE INDEX IF NOT EXISTS idx_{CP_ROWS_TABLE}_owner
                         ON {CP_ROWS_TABLE} ({OWNER_COLUMN}, cp_id);"
                ))
                .storage_context(|| "creating change package rows".to_string())?;
            }
            schema::verify_table(tx, CP_ROWS_TABLE, OWNER_COLUMN, CP_COLUMNS)
        })
    }

    /// Register a project's table; returns true if it was new
    pub fn ensure_table(&self, table: &CpTableName) -> SnapResult<bool> {
        self.db.write("creating change package table", |tx| {
            let created = tx
                .execute(
                    &format!(
                        "INSERT OR IGNORE INTO {CP_CATALOG_TABLE} ({OWNER_COLUMN}, created_at)
                         VALUES (?1, ?2)"
                    ),
                    params![table.as_str(), Utc::now().to_rfc3339()],
                )
                .storage_context(|| format!("creating change package table {table}"))?;
            if created > 0 {
                debug!("Change package table '{}' does not exist, created", table);
            } else {
                debug!("Change package table '{}' already exists", table);
            }
            Ok(created > 0)
        })
    }

    /// Record a change package; duplicates are kept
    pub fn add(&self, table: &CpTableName, cp: &str, state: &str) -> SnapResult<()> {
        self.db.write("adding change package", |tx| {
            debug!("Updating change package cache with {} ({})", cp, state);
            add_in(tx, table, cp, state)
        })
    }

    /// Remove every row of a change package; returns rows removed
    pub fn delete(&self, table: &CpTableName, cp: &str) -> SnapResult<usize> {
        self.db
            .write("deleting change package", |tx| delete_in(tx, table, cp))
    }

    /// Distinct change package ids of a table
    pub fn ids(&self, table: &CpTableName) -> SnapResult<BTreeSet<String>> {
        Ok(self
            .records(table)?
            .into_iter()
            .map(|record| record.id)
            .collect())
    }

    /// Every row of a table in insertion order
    pub fn records(&self, table: &CpTableName) -> SnapResult<Vec<ChangePackageRecord>> {
        self.db.read("reading change packages", |conn| {
            require(conn, table)?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT cp_id, cp_state FROM {CP_ROWS_TABLE}
                     WHERE {OWNER_COLUMN} = ?1 ORDER BY row_id"
                ))
                .storage_context(|| format!("reading change packages of {table}"))?;
            RowCodec::query_all(&mut stmt, CP_COLUMNS, params![table.as_str()])?
                .into_iter()
                .map(|row| {
                    let text = |field: Field| row.get(&field).map(ToString::to_string);
                    Ok(ChangePackageRecord {
                        id: text(Field::ChangePackageId).ok_or_else(|| {
                            SnapError::Internal("change package row without an id".to_string())
                        })?,
                        state: text(Field::ChangePackageState).unwrap_or_default(),
                    })
                })
                .collect()
        })
    }

    /// Dispatch an operation by name
    ///
    /// `get` returns the cached ids; `add` and `delete` return `None`.
    /// Unknown operations are logged and ignored.
    pub fn run(
        &self,
        table: &CpTableName,
        operation: &str,
        cp: &str,
        state: &str,
    ) -> SnapResult<Option<BTreeSet<String>>> {
        let operation = match operation.parse::<CpOperation>() {
            Ok(op) => op,
            Err(_) => {
                warn!(
                    "Operation '{}' unsupported for change package {} ({})",
                    operation, cp, state
                );
                return Ok(None);
            }
        };

        match operation {
            CpOperation::Add => self.add(table, cp, state).map(|()| None),
            CpOperation::Delete => self.delete(table, cp).map(|_| None),
            CpOperation::Get => self.ids(table).map(Some),
        }
    }

    /// Remove a project's table and its rows
    pub fn drop_table(&self, table: &CpTableName) -> SnapResult<bool> {
        self.db.write("dropping change package table", |tx| {
            tx.execute(
                &format!("DELETE FROM {CP_ROWS_TABLE} WHERE {OWNER_COLUMN} = ?1"),
                params![table.as_str()],
            )
            .storage_context(|| format!("dropping rows of {table}"))?;
            let removed = tx
                .execute(
                    &format!("DELETE FROM {CP_CATALOG_TABLE} WHERE {OWNER_COLUMN} = ?1"),
                    params![table.as_str()],
                )
                .storage_context(|| format!("dropping change package table {table}"))?;
            Ok(removed > 0)
        })
    }
}

fn require(conn: &Connection, table: &CpTableName) -> SnapResult<()> {
    let known: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {CP_CATALOG_TABLE} WHERE {OWNER_COLUMN} = ?1"),
            params![table.as_str()],
            |row| row.get(0),
        )
        .storage_context(|| format!("looking up change package table {table}"))?;
    if known == 0 {
        return Err(SnapError::User(format!(
            "Change package table '{table}' does not exist"
        )));
    }
    Ok(())
}

fn add_in(conn: &Connection, table: &CpTableName, cp: &str, state: &str) -> SnapResult<()> {
    require(conn, table)?;
    conn.execute(
        &format!("INSERT INTO {CP_ROWS_TABLE} ({OWNER_COLUMN}, cp_id, cp_state) VALUES (?1, ?2, ?3)"),
        params![table.as_str(), cp, state],
    )
    .storage_context(|| format!("adding change package {cp}"))?;
    Ok(())
}

fn delete_in(conn: &Connection, table: &CpTableName, cp: &str) -> SnapResult<usize> {
    require(conn, table)?;
    conn.execute(
        &format!("DELETE FROM {CP_ROWS_TABLE} WHERE {OWNER_COLUMN} = ?1 AND cp_id = ?2"),
        params![table.as_str(), cp],
    )
    .storage_context(|| format!("deleting change package {cp}"))
}

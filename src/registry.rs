//! Cache registry
//!
//! Maps (job, configuration, build number) to the opaque cache identifier
//! that names that build's snapshot. Registration is idempotent: asking
//! twice for the same triple returns the same identifier.

use crate::error::{SnapError, SnapResult, StorageContext};
use crate::store::schema::{self, REGISTRY_TABLE};
use crate::store::Database;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

const CACHE_ID_PREFIX: &str = "SCM_";

/// Opaque identifier of one build's snapshot
///
/// Always `SCM_` followed by a UUID with `_` separators, so it is safe to
/// use verbatim wherever an identifier is expected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheId(String);

impl CacheId {
    /// Generate a fresh identifier
    pub fn generate() -> Self {
        Self(format!(
            "{CACHE_ID_PREFIX}{}",
            Uuid::new_v4().to_string().replace('-', "_")
        ))
    }

    /// Validate an identifier received from outside
    pub fn parse(raw: &str) -> SnapResult<Self> {
        let invalid = || SnapError::InvalidCacheId(raw.to_string());
        let body = raw.strip_prefix(CACHE_ID_PREFIX).ok_or_else(invalid)?;
        Uuid::parse_str(&body.replace('_', "-")).map_err(|_| invalid())?;
        if body.len() != 36 {
            return Err(invalid());
        }
        Ok(Self(raw.to_string()))
    }

    /// Borrow the identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl TryFrom<String> for CacheId {
    type Error = SnapError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CacheId> for String {
    fn from(value: CacheId) -> Self {
        value.0
    }
}

/// One registry row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: i64,
    pub job_name: String,
    pub configuration_name: String,
    pub cache_id: CacheId,
    pub build_number: i64,
    pub created_at: DateTime<Utc>,
}

/// Access to the registry table
#[derive(Clone)]
pub struct Registry {
    db: Database,
}

impl Registry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the registry table if it is not there yet
    pub fn ensure_exists(&self) -> SnapResult<()> {
        self.db.write("creating cache registry", |tx| {
            if schema::table_exists(tx, REGISTRY_TABLE) {
                debug!("Cache registry table exists");
                return Ok(());
            }
            info!("Cache registry doesn't exist, creating");
            tx.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {REGISTRY_TABLE} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_name TEXT NOT NULL,
                    configuration_name TEXT NOT NULL,
                    cache_id TEXT NOT NULL UNIQUE,
                    build_number INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (job_name, configuration_name, build_number)
                );
                CREATE INDEX IF NOT EXISTS idx_{REGISTRY_TABLE}_job
                    ON {REGISTRY_TABLE} (job_name, build_number);"
            ))
            .storage_context(|| "creating cache registry".to_string())
        })
    }

    /// Return the cache identifier for a build, registering one if needed
    pub fn register(
        &self,
        job: &str,
        configuration: &str,
        build_number: i64,
    ) -> SnapResult<CacheId> {
        self.db.write("registering cache", |tx| {
            if let Some(existing) = lookup_in(tx, job, configuration, build_number)? {
                debug!(
                    "Cache for {}/{}/{} already registered as {}",
                    job, configuration, build_number, existing
                );
                return Ok(existing);
            }

            let cache_id = CacheId::generate();
            tx.execute(
                &format!(
                    "INSERT INTO {REGISTRY_TABLE}
                        (job_name, configuration_name, cache_id, build_number, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)"
                ),
                params![
                    job,
                    configuration,
                    cache_id.as_str(),
                    build_number,
                    Utc::now().to_rfc3339()
                ],
            )
            .storage_context(|| {
                format!("registering cache for {job}/{configuration}/{build_number}")
            })?;

            info!(
                "Registered cache {} for {}/{}/{}",
                cache_id, job, configuration, build_number
            );
            Ok(cache_id)
        })
    }

    /// Look up the cache identifier for a build
    pub fn lookup(
        &self,
        job: &str,
        configuration: &str,
        build_number: i64,
    ) -> SnapResult<Option<CacheId>> {
        self.db.read("looking up cache", |conn| {
            lookup_in(conn, job, configuration, build_number)
        })
    }

    /// Look up a cache for a build irrespective of configuration
    pub fn lookup_for_job(&self, job: &str, build_number: i64) -> SnapResult<Option<CacheId>> {
        self.db.read("looking up cache for job", |conn| {
            let raw: Option<String> = conn
                .query_row(
                    &format!(
                        "SELECT cache_id FROM {REGISTRY_TABLE}
                         WHERE job_name = ?1 AND build_number = ?2
                         ORDER BY id DESC LIMIT 1"
                    ),
                    params![job, build_number],
                    |row| row.get(0),
                )
                .optional()
                .storage_context(|| format!("looking up cache for {job}/{build_number}"))?;
            raw.map(|r| CacheId::parse(&r)).transpose()
        })
    }

    /// Find the newest cache of a job/configuration built before `build_number`
    ///
    /// Polling uses build 0, which is never a predecessor.
    pub fn predecessor(
        &self,
        job: &str,
        configuration: &str,
        build_number: i64,
    ) -> SnapResult<Option<CacheId>> {
        self.db.read("finding previous cache", |conn| {
            let raw: Option<String> = conn
                .query_row(
                    &format!(
                        "SELECT cache_id FROM {REGISTRY_TABLE}
                         WHERE job_name = ?1 AND configuration_name = ?2
                           AND build_number > 0 AND build_number < ?3
                         ORDER BY build_number DESC LIMIT 1"
                    ),
                    params![job, configuration, build_number],
                    |row| row.get(0),
                )
                .optional()
                .storage_context(|| format!("finding cache before {job}/{build_number}"))?;
            raw.map(|r| CacheId::parse(&r)).transpose()
        })
    }

    /// All entries of a job/configuration, newest build first
    pub fn latest_for(&self, job: &str, configuration: &str) -> SnapResult<Vec<RegistryEntry>> {
        self.db.read("listing caches", |conn| {
            query_entries(
                conn,
                &format!(
                    "SELECT id, job_name, configuration_name, cache_id, build_number, created_at
                     FROM {REGISTRY_TABLE}
                     WHERE job_name = ?1 AND configuration_name = ?2
                     ORDER BY build_number DESC"
                ),
                params![job, configuration],
            )
        })
    }

    /// All entries of a job across configurations
    pub fn entries_for_job(&self, job: &str) -> SnapResult<Vec<RegistryEntry>> {
        self.db.read("listing caches for job", |conn| {
            query_entries(
                conn,
                &format!(
                    "SELECT id, job_name, configuration_name, cache_id, build_number, created_at
                     FROM {REGISTRY_TABLE}
                     WHERE job_name = ?1
                     ORDER BY build_number DESC, id DESC"
                ),
                params![job],
            )
        })
    }

    /// Every entry in the registry
    pub fn all_entries(&self) -> SnapResult<Vec<RegistryEntry>> {
        self.db.read("listing all caches", |conn| {
            query_entries(
                conn,
                &format!(
                    "SELECT id, job_name, configuration_name, cache_id, build_number, created_at
                     FROM {REGISTRY_TABLE}
                     ORDER BY job_name, configuration_name, build_number DESC"
                ),
                [],
            )
        })
    }

    /// Distinct job names with at least one registered cache
    pub fn distinct_jobs(&self) -> SnapResult<BTreeSet<String>> {
        self.db.read("listing registered jobs", |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT DISTINCT job_name FROM {REGISTRY_TABLE}"))
                .storage_context(|| "listing registered jobs".to_string())?;
            let jobs = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .storage_context(|| "listing registered jobs".to_string())?
                .collect::<Result<BTreeSet<_>, _>>()
                .storage_context(|| "listing registered jobs".to_string())?;
            for job in &jobs {
                debug!("Found registered job '{}'", job);
            }
            Ok(jobs)
        })
    }

    /// Remove exactly one registry row
    ///
    /// The snapshot named by `cache_id` is not touched.
    pub fn delete_entry(&self, cache_id: &CacheId) -> SnapResult<bool> {
        Ok(self.delete_entries(std::slice::from_ref(cache_id))? == 1)
    }

    /// Remove several registry rows in one transaction
    pub fn delete_entries(&self, cache_ids: &[CacheId]) -> SnapResult<usize> {
        if cache_ids.is_empty() {
            return Ok(0);
        }
        self.db.write("deleting registry entries", |tx| {
            let mut stmt = tx
                .prepare(&format!("DELETE FROM {REGISTRY_TABLE} WHERE cache_id = ?1"))
                .storage_context(|| "preparing registry delete".to_string())?;
            let mut removed = 0;
            for cache_id in cache_ids {
                removed += stmt
                    .execute(params![cache_id.as_str()])
                    .storage_context(|| format!("deleting registry entry {cache_id}"))?;
            }
            debug!("Removed {} registry entries", removed);
            Ok(removed)
        })
    }
}

fn lookup_in(
    conn: &Connection,
    job: &str,
    configuration: &str,
    build_number: i64,
) -> SnapResult<Option<CacheId>> {
    let raw: Option<String> = conn
        .query_row(
            &format!(
                "SELECT cache_id FROM {REGISTRY_TABLE}
                 WHERE job_name = ?1 AND configuration_name = ?2 AND build_number = ?3"
            ),
            params![job, configuration, build_number],
            |row| row.get(0),
        )
        .optional()
        .storage_context(|| {
            format!("looking up cache for {job}/{configuration}/{build_number}")
        })?;
    raw.map(|r| CacheId::parse(&r)).transpose()
}

fn query_entries(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> SnapResult<Vec<RegistryEntry>> {
    let mut stmt = conn
        .prepare(sql)
        .storage_context(|| "preparing registry query".to_string())?;
    let rows = stmt
        .query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .storage_context(|| "querying registry".to_string())?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, job_name, configuration_name, cache_id, build_number, created_at) =
            row.storage_context(|| "reading registry row".to_string())?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        entries.push(RegistryEntry {
            id,
            job_name,
            configuration_name,
            cache_id: CacheId::parse(&cache_id)?,
            build_number,
            created_at,
        });
    }
    Ok(entries)
}

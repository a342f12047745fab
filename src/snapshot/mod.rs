//! Snapshot store
//!
//! A snapshot is the member listing of one build, identified by its
//! [`CacheId`]. All snapshots share one physical member table keyed by the
//! cache identifier; the catalog records which snapshots exist.
//!
//! # Lifecycle
//!
//! 1. [`SnapshotStore::create_or_reset`] when the build starts
//! 2. [`SnapshotStore::populate`] from the project enumerator
//! 3. comparison against the previous build (see [`crate::delta`])
//! 4. optional checksum refresh and author priming
//! 5. [`SnapshotStore::drop_snapshot`] when maintenance retires the build

pub mod member;
pub mod source;

pub use member::{DeltaState, MemberKind, MemberRecord};
pub use source::{MemberDescriptor, PendingFilter, ProjectScope};

use crate::delta::AuthorResolver;
use crate::error::{SnapError, SnapResult, StorageContext};
use crate::registry::CacheId;
use crate::store::schema::{
    self, MEMBER_COLUMNS, SNAPSHOT_CATALOG_TABLE, SNAPSHOT_MEMBERS_TABLE,
};
use crate::store::{Database, Field, FieldValue, RowCodec};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Statement};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

const OWNER_COLUMN: &str = "cache_id";

const MEMBER_SELECT: &str = "SELECT row_id, kind, name, member_id, timestamp, description, author, \
     config_path, revision, old_revision, relative_path, checksum, delta FROM snapshot_members";

const NOT_DROPPED: &str = "(delta IS NULL OR delta <> 3)";

/// Outcome of populating a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateReport {
    pub files: usize,
    pub directories: usize,
    pub skipped_pending: usize,
    pub skipped_outside_root: usize,
    /// Files whose name was already enumerated
    pub skipped_duplicate: usize,
}

/// Row counts of one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberCounts {
    pub files: usize,
    pub directories: usize,
    pub dropped: usize,
}

/// Which rows an author-priming pass touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorScope {
    /// Every live file row
    All,
    /// Only rows without an author yet
    MissingOnly,
}

/// A member row together with its storage key
#[derive(Debug, Clone)]
pub(crate) struct StoredMember {
    pub row_id: i64,
    pub record: MemberRecord,
}

/// Access to snapshots
#[derive(Clone)]
pub struct SnapshotStore {
    db: Database,
}

impl SnapshotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the catalog and member tables if needed and verify their shape
    pub fn ensure_exists(&self) -> SnapResult<()> {
        self.db.write("creating snapshot tables", |tx| {
            if !schema::table_exists(tx, SNAPSHOT_CATALOG_TABLE) {
                info!("Snapshot catalog doesn't exist, creating");
                tx.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {SNAPSHOT_CATALOG_TABLE} (
                        {OWNER_COLUMN} TEXT PRIMARY KEY,
                        created_at TEXT NOT NULL
                    )"
                ))
                .storage_context(|| "creating snapshot catalog".to_string())?;
            }

            if !schema::table_exists(tx, SNAPSHOT_MEMBERS_TABLE) {
                info!("Snapshot member table doesn't exist, creating");
                let ddl = schema::create_keyed_table_sql(
                    SNAPSHOT_MEMBERS_TABLE,
                    OWNER_COLUMN,
                    MEMBER_COLUMNS,
                );
                tx.execute_batch(&format!(
                    "{ddl};
                     CREATE INDEX IF NOT EXISTS idx_{SNAPSHOT_MEMBERS_TABLE}_lookup
                         ON {SNAPSHOT_MEMBERS_TABLE} ({OWNER_COLUMN}, kind, name);
                     CREATE UNIQUE INDEX IF NOT EXISTS idx_{SNAPSHOT_MEMBERS_TABLE}_file_name
                         ON {SNAPSHOT_MEMBERS_TABLE} ({OWNER_COLUMN}, name) WHERE kind = 0;"
                ))
                .storage_context(|| "creating snapshot member table".to_string())?;
            }

            schema::verify_table(tx, SNAPSHOT_MEMBERS_TABLE, OWNER_COLUMN, MEMBER_COLUMNS)
        })
    }

    /// Start a snapshot from an empty table, discarding any stale rows
    pub fn create_or_reset(&self, cache: &CacheId) -> SnapResult<()> {
        self.db.write("creating snapshot", |tx| {
            if exists_in(tx, cache)? {
                info!("Snapshot {} exists, resetting", cache);
            } else {
                debug!("Creating snapshot {}", cache);
            }

            tx.execute(
                &format!("DELETE FROM {SNAPSHOT_MEMBERS_TABLE} WHERE {OWNER_COLUMN} = ?1"),
                params![cache.as_str()],
            )
            .storage_context(|| format!("clearing snapshot {cache}"))?;
            tx.execute(
                &format!(
                    "INSERT OR REPLACE INTO {SNAPSHOT_CATALOG_TABLE} ({OWNER_COLUMN}, created_at)
                     VALUES (?1, ?2)"
                ),
                params![cache.as_str(), Utc::now().to_rfc3339()],
            )
            .storage_context(|| format!("cataloguing snapshot {cache}"))?;
            Ok(())
        })
    }

    /// Fill a snapshot from the project enumerator
    ///
    /// Subprojects are recorded as directory rows and remembered so that
    /// files met later can resolve their parent's configuration path.
    /// Files outside the project root, pending entries and repeated file
    /// names are skipped; the first occurrence of a name wins.
    /// An error from the enumerator aborts the whole population.
    pub fn populate<I>(
        &self,
        cache: &CacheId,
        scope: &ProjectScope,
        members: I,
        filter: &PendingFilter,
    ) -> SnapResult<PopulateReport>
    where
        I: IntoIterator<Item = SnapResult<MemberDescriptor>>,
    {
        self.db.write("populating snapshot", |tx| {
            require(tx, cache)?;

            let root = scope.root();
            let mut parents: HashMap<String, String> = HashMap::new();
            parents.insert(scope.project_name.clone(), scope.configuration_path.clone());

            let mut insert = prepare_insert(tx)?;
            let mut report = PopulateReport::default();
            let mut seen_files: HashSet<String> = HashSet::new();

            for member in members {
                let member = member?;
                if filter.is_pending(&member) {
                    warn!(
                        "Skipping pending entry {} ({})",
                        member.name(),
                        member.entry_type()
                    );
                    report.skipped_pending += 1;
                    continue;
                }

                let record = match member {
                    MemberDescriptor::Directory { name, id, revision, .. } => {
                        debug!("Adding subproject {}", name);
                        parents.insert(name.clone(), id.clone());
                        report.directories += 1;
                        MemberRecord {
                            kind: MemberKind::Directory,
                            member_id: Some(id.clone()),
                            timestamp: Some(Utc::now()),
                            description: Some(String::new()),
                            author: None,
                            config_path: Some(id),
                            revision: Some(revision.unwrap_or_default()),
                            old_revision: None,
                            relative_path: Some(scope.subproject_dir(&name).to_string()),
                            checksum: None,
                            delta: DeltaState::Unset,
                            name,
                        }
                    }
                    MemberDescriptor::File {
                        name,
                        id,
                        parent,
                        revision,
                        description,
                        timestamp,
                        ..
                    } => {
                        if !name.starts_with(root) {
                            warn!("Skipping {}: not under project root {}", name, root);
                            report.skipped_outside_root += 1;
                            continue;
                        }
                        if !seen_files.insert(name.clone()) {
                            warn!("Skipping {}: already enumerated", name);
                            report.skipped_duplicate += 1;
                            continue;
                        }
                        let config_path = parents.get(&parent).cloned();
                        if config_path.is_none() {
                            debug!("No configuration path known for parent {}", parent);
                        }
                        report.files += 1;
                        MemberRecord {
                            kind: MemberKind::File,
                            member_id: Some(id),
                            timestamp: Some(timestamp.unwrap_or_else(Utc::now)),
                            description: Some(
                                description
                                    .map(|d| source::sanitize_description(&d))
                                    .unwrap_or_default(),
                            ),
                            author: None,
                            config_path,
                            revision: Some(revision),
                            old_revision: None,
                            relative_path: Some(scope.relative(&name).to_string()),
                            checksum: None,
                            delta: DeltaState::Unset,
                            name,
                        }
                    }
                };
                insert_member(&mut insert, cache, &record)?;
            }

            info!(
                "Populated snapshot {}: {} files, {} subprojects",
                cache, report.files, report.directories
            );
            Ok(report)
        })
    }

    /// Live file rows, ordered by name
    pub fn view_project(&self, cache: &CacheId) -> SnapResult<Vec<MemberRecord>> {
        self.view(
            cache,
            &format!(
                "{MEMBER_SELECT} WHERE {OWNER_COLUMN} = ?1 AND kind = 0 AND {NOT_DROPPED}
                 ORDER BY name ASC"
            ),
        )
    }

    /// Subproject rows, ordered by configuration path
    pub fn view_subprojects(&self, cache: &CacheId) -> SnapResult<Vec<MemberRecord>> {
        self.view(
            cache,
            &format!(
                "{MEMBER_SELECT} WHERE {OWNER_COLUMN} = ?1 AND kind = 1
                 ORDER BY config_path ASC"
            ),
        )
    }

    /// File rows classified as added, changed or dropped, ordered by name
    pub fn view_changes(&self, cache: &CacheId) -> SnapResult<Vec<MemberRecord>> {
        self.view(
            cache,
            &format!(
                "{MEMBER_SELECT} WHERE {OWNER_COLUMN} = ?1 AND kind = 0 AND delta IN (1, 2, 3)
                 ORDER BY name ASC"
            ),
        )
    }

    /// Live file rows with the columns needed to look up authors
    pub fn author_view(&self, cache: &CacheId) -> SnapResult<Vec<MemberRecord>> {
        self.view(
            cache,
            &format!(
                "SELECT name, member_id, config_path, revision, author FROM {SNAPSHOT_MEMBERS_TABLE}
                 WHERE {OWNER_COLUMN} = ?1 AND kind = 0 AND {NOT_DROPPED}
                 ORDER BY row_id"
            ),
        )
    }

    /// Live file rows with their checksums
    pub fn checksum_view(&self, cache: &CacheId) -> SnapResult<Vec<MemberRecord>> {
        self.view(
            cache,
            &format!(
                "SELECT name, relative_path, checksum FROM {SNAPSHOT_MEMBERS_TABLE}
                 WHERE {OWNER_COLUMN} = ?1 AND kind = 0 AND {NOT_DROPPED}
                 ORDER BY row_id"
            ),
        )
    }

    /// Distinct subproject directories, ascending
    pub fn dir_list(&self, cache: &CacheId) -> SnapResult<Vec<String>> {
        let sql = format!(
            "SELECT DISTINCT relative_path FROM {SNAPSHOT_MEMBERS_TABLE}
             WHERE {OWNER_COLUMN} = ?1 AND kind = 1 AND relative_path IS NOT NULL
             ORDER BY relative_path ASC"
        );
        self.db.read("listing snapshot directories", |conn| {
            require(conn, cache)?;
            let mut stmt = conn
                .prepare(&sql)
                .storage_context(|| format!("listing directories of {cache}"))?;
            let rows = RowCodec::query_all(&mut stmt, MEMBER_COLUMNS, params![cache.as_str()])?;
            Ok(rows
                .into_iter()
                .filter_map(|mut row| match row.remove(&Field::RelativePath) {
                    Some(FieldValue::Text(dir)) => Some(dir),
                    _ => None,
                })
                .collect())
        })
    }

    /// Count the rows of a snapshot by kind
    pub fn count_members(&self, cache: &CacheId) -> SnapResult<MemberCounts> {
        self.db.read("counting snapshot members", |conn| {
            require(conn, cache)?;
            conn.query_row(
                &format!(
                    "SELECT
                        COALESCE(SUM(CASE WHEN kind = 0 AND {NOT_DROPPED} THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN kind = 1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN delta = 3 THEN 1 ELSE 0 END), 0)
                     FROM {SNAPSHOT_MEMBERS_TABLE} WHERE {OWNER_COLUMN} = ?1"
                ),
                params![cache.as_str()],
                |row| {
                    Ok(MemberCounts {
                        files: row.get::<_, i64>(0)? as usize,
                        directories: row.get::<_, i64>(1)? as usize,
                        dropped: row.get::<_, i64>(2)? as usize,
                    })
                },
            )
            .storage_context(|| format!("counting members of {cache}"))
        })
    }

    /// Whether a snapshot exists
    pub fn exists(&self, cache: &CacheId) -> SnapResult<bool> {
        self.db.read("checking snapshot", |conn| exists_in(conn, cache))
    }

    /// Every catalogued snapshot
    pub fn list_snapshots(&self) -> SnapResult<Vec<CacheId>> {
        self.db.read("listing snapshots", |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {OWNER_COLUMN} FROM {SNAPSHOT_CATALOG_TABLE} ORDER BY created_at"
                ))
                .storage_context(|| "listing snapshots".to_string())?;
            let raw = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .storage_context(|| "listing snapshots".to_string())?
                .collect::<Result<Vec<_>, _>>()
                .storage_context(|| "listing snapshots".to_string())?;
            raw.iter().map(|id| CacheId::parse(id)).collect()
        })
    }

    /// Replace checksums of live file rows from a name-to-checksum map
    ///
    /// Empty checksums in the map are ignored. Returns the number of rows
    /// updated.
    pub fn refresh_checksums(
        &self,
        cache: &CacheId,
        checksums: &HashMap<String, String>,
    ) -> SnapResult<usize> {
        self.db.write("refreshing checksums", |tx| {
            require(tx, cache)?;
            let rows = load_files(tx, cache, false)?;

            let mut update = tx
                .prepare(&format!(
                    "UPDATE {SNAPSHOT_MEMBERS_TABLE} SET checksum = ?1 WHERE row_id = ?2"
                ))
                .storage_context(|| "preparing checksum update".to_string())?;

            let mut updated = 0;
            for row in rows {
                let Some(checksum) = checksums.get(&row.record.name) else {
                    continue;
                };
                if checksum.is_empty() {
                    continue;
                }
                update
                    .execute(params![checksum, row.row_id])
                    .storage_context(|| format!("updating checksum of {}", row.record.name))?;
                updated += 1;
            }
            debug!("Refreshed {} checksums in {}", updated, cache);
            Ok(updated)
        })
    }

    /// Look up and store authors for live file rows
    ///
    /// Lookup failures are logged and leave the author unset. Returns the
    /// number of rows that received an author.
    pub fn prime_authors(
        &self,
        cache: &CacheId,
        resolver: &dyn AuthorResolver,
        scope: AuthorScope,
    ) -> SnapResult<usize> {
        self.db.write("priming authors", |tx| {
            require(tx, cache)?;
            let rows: Vec<StoredMember> = load_files(tx, cache, false)?
                .into_iter()
                .filter(|row| match scope {
                    AuthorScope::All => true,
                    AuthorScope::MissingOnly => {
                        row.record.author.as_deref().unwrap_or_default().is_empty()
                    }
                })
                .collect();

            let total = rows.len();
            info!("Priming authors for {} members of {}", total, cache);
            let step = (total / 10).max(1);

            let mut update = tx
                .prepare(&format!(
                    "UPDATE {SNAPSHOT_MEMBERS_TABLE} SET author = ?1 WHERE row_id = ?2"
                ))
                .storage_context(|| "preparing author update".to_string())?;

            let mut primed = 0;
            for (idx, row) in rows.iter().enumerate() {
                if let Some(author) = crate::delta::resolve_author(resolver, &row.record) {
                    update
                        .execute(params![author, row.row_id])
                        .storage_context(|| format!("updating author of {}", row.record.name))?;
                    primed += 1;
                }
                if (idx + 1) % step == 0 {
                    info!("Author priming {}% complete", (idx + 1) * 100 / total);
                }
            }
            Ok(primed)
        })
    }

    /// Remove a snapshot and all its rows
    ///
    /// Returns false if there was no such snapshot.
    pub fn drop_snapshot(&self, cache: &CacheId) -> SnapResult<bool> {
        self.db.write("dropping snapshot", |tx| {
            let rows = tx
                .execute(
                    &format!("DELETE FROM {SNAPSHOT_MEMBERS_TABLE} WHERE {OWNER_COLUMN} = ?1"),
                    params![cache.as_str()],
                )
                .storage_context(|| format!("dropping rows of {cache}"))?;
            let catalogued = tx
                .execute(
                    &format!("DELETE FROM {SNAPSHOT_CATALOG_TABLE} WHERE {OWNER_COLUMN} = ?1"),
                    params![cache.as_str()],
                )
                .storage_context(|| format!("dropping snapshot {cache}"))?;
            debug!("Dropped snapshot {} ({} rows)", cache, rows);
            Ok(catalogued > 0)
        })
    }

    fn view(&self, cache: &CacheId, sql: &str) -> SnapResult<Vec<MemberRecord>> {
        self.db.read("reading snapshot view", |conn| {
            require(conn, cache)?;
            let mut stmt = conn
                .prepare(sql)
                .storage_context(|| format!("preparing view of {cache}"))?;
            RowCodec::query_all(&mut stmt, MEMBER_COLUMNS, params![cache.as_str()])?
                .iter()
                .map(MemberRecord::from_row)
                .collect()
        })
    }
}

pub(crate) fn exists_in(conn: &Connection, cache: &CacheId) -> SnapResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {SNAPSHOT_CATALOG_TABLE} WHERE {OWNER_COLUMN} = ?1"),
            params![cache.as_str()],
            |row| row.get(0),
        )
        .optional()
        .storage_context(|| format!("looking up snapshot {cache}"))?;
    Ok(found.is_some())
}

pub(crate) fn require(conn: &Connection, cache: &CacheId) -> SnapResult<()> {
    if exists_in(conn, cache)? {
        Ok(())
    } else {
        Err(SnapError::SnapshotMissing(cache.to_string()))
    }
}

/// Load file rows of a snapshot in table order
pub(crate) fn load_files(
    conn: &Connection,
    cache: &CacheId,
    include_dropped: bool,
) -> SnapResult<Vec<StoredMember>> {
    let filter = if include_dropped {
        String::new()
    } else {
        format!(" AND {NOT_DROPPED}")
    };
    let mut stmt = conn
        .prepare(&format!(
            "{MEMBER_SELECT} WHERE {OWNER_COLUMN} = ?1 AND kind = 0{filter} ORDER BY row_id"
        ))
        .storage_context(|| format!("loading members of {cache}"))?;

    RowCodec::query_all(&mut stmt, MEMBER_COLUMNS, params![cache.as_str()])?
        .iter()
        .map(|row| {
            let row_id = row
                .get(&Field::RowId)
                .and_then(FieldValue::as_i64)
                .ok_or_else(|| SnapError::Internal("member row without a row id".to_string()))?;
            Ok(StoredMember {
                row_id,
                record: MemberRecord::from_row(row)?,
            })
        })
        .collect()
}

pub(crate) fn prepare_insert<'c>(conn: &'c Connection) -> SnapResult<Statement<'c>> {
    conn.prepare(&format!(
        "INSERT INTO {SNAPSHOT_MEMBERS_TABLE} ({OWNER_COLUMN}, kind, name, member_id, timestamp,
             description, author, config_path, revision, old_revision, relative_path, checksum, delta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
    ))
    .storage_context(|| "preparing member insert".to_string())
}

pub(crate) fn insert_member(
    stmt: &mut Statement<'_>,
    cache: &CacheId,
    record: &MemberRecord,
) -> SnapResult<()> {
    stmt.execute(params![
        cache.as_str(),
        record.kind.code(),
        record.name,
        record.member_id,
        record.timestamp.map(|ts| ts.to_rfc3339()),
        record.description,
        record.author,
        record.config_path,
        record.revision,
        record.old_revision,
        record.relative_path,
        record.checksum,
        record.delta.code(),
    ])
    .storage_context(|| format!("inserting member {}", record.name))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::StaticAuthors;
    use chrono::TimeZone;

    fn store() -> SnapshotStore {
        let store = SnapshotStore::new(Database::open_in_memory().unwrap());
        store.ensure_exists().unwrap();
        store
    }

    fn scope() -> ProjectScope {
        ProjectScope::new("/repo/app/project.pj", "#/repo/app")
    }

    fn file(name: &str, revision: &str) -> SnapResult<MemberDescriptor> {
        Ok(MemberDescriptor::File {
            name: format!("/repo/app/{name}"),
            id: name.to_string(),
            parent: "/repo/app/project.pj".into(),
            revision: revision.into(),
            description: Some("desc".into()),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()),
            entry_type: Some("archived".into()),
        })
    }

    fn subproject(dir: &str) -> SnapResult<MemberDescriptor> {
        Ok(MemberDescriptor::Directory {
            name: format!("/repo/app/{dir}/project.pj"),
            id: format!("#/repo/app#{dir}"),
            revision: None,
            entry_type: Some("shared-subproject".into()),
        })
    }

    #[test]
    fn ensure_exists_is_idempotent() {
        let store = store();
        store.ensure_exists().unwrap();
    }

    #[test]
    fn reads_of_unknown_snapshot_fail() {
        let store = store();
        let err = store.view_project(&CacheId::generate()).unwrap_err();
        assert!(matches!(err, SnapError::SnapshotMissing(_)));
    }

    #[test]
    fn populate_requires_created_snapshot() {
        let store = store();
        let err = store
            .populate(&CacheId::generate(), &scope(), Vec::new(), &PendingFilter::default())
            .unwrap_err();
        assert!(matches!(err, SnapError::SnapshotMissing(_)));
    }

    #[test]
    fn populate_resolves_parents_and_paths() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();

        let members = vec![
            file("b.c", "1.2"),
            subproject("lib"),
            Ok(MemberDescriptor::File {
                name: "/repo/app/lib/x.c".into(),
                id: "x.c".into(),
                parent: "/repo/app/lib/project.pj".into(),
                revision: "1.1".into(),
                description: None,
                timestamp: None,
                entry_type: None,
            }),
            file("a.c", "1.1"),
        ];
        let report = store
            .populate(&cache, &scope(), members, &PendingFilter::default())
            .unwrap();
        assert_eq!(report.files, 3);
        assert_eq!(report.directories, 1);

        let files = store.view_project(&cache).unwrap();
        let names: Vec<&str> = files.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["/repo/app/a.c", "/repo/app/b.c", "/repo/app/lib/x.c"]);
        assert_eq!(files[0].config_path.as_deref(), Some("#/repo/app"));
        assert_eq!(files[2].config_path.as_deref(), Some("#/repo/app#lib"));
        assert_eq!(files[2].relative_path.as_deref(), Some("/lib/x.c"));
        assert_eq!(files[2].description.as_deref(), Some(""));
        assert!(files[2].timestamp.is_some());

        assert_eq!(store.dir_list(&cache).unwrap(), vec!["/lib".to_string()]);
        let subs = store.view_subprojects(&cache).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].kind, MemberKind::Directory);
        assert_eq!(subs[0].revision.as_deref(), Some(""));
    }

    #[test]
    fn populate_skips_pending_and_foreign_entries() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();

        let members = vec![
            file("a.c", "1.1"),
            Ok(MemberDescriptor::File {
                name: "/elsewhere/z.c".into(),
                id: "z.c".into(),
                parent: "/elsewhere/project.pj".into(),
                revision: "1.1".into(),
                description: None,
                timestamp: None,
                entry_type: None,
            }),
            Ok(MemberDescriptor::File {
                name: "/repo/app/new.c".into(),
                id: "new.c".into(),
                parent: "/repo/app/project.pj".into(),
                revision: "1.1".into(),
                description: None,
                timestamp: None,
                entry_type: Some("pending-add".into()),
            }),
        ];
        let report = store
            .populate(&cache, &scope(), members, &PendingFilter::default())
            .unwrap();
        assert_eq!(report.files, 1);
        assert_eq!(report.skipped_outside_root, 1);
        assert_eq!(report.skipped_pending, 1);
    }

    #[test]
    fn populate_keeps_first_of_repeated_names() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();

        let members = vec![file("a.c", "1.1"), file("a.c", "1.2"), file("b.c", "1.1")];
        let report = store
            .populate(&cache, &scope(), members, &PendingFilter::default())
            .unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.skipped_duplicate, 1);

        let files = store.view_project(&cache).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].name, "/repo/app/a.c");
        assert_eq!(files[0].revision_str(), "1.1");
    }

    #[test]
    fn enumerator_error_rolls_back_population() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();

        let members = vec![
            file("a.c", "1.1"),
            Err(SnapError::Member {
                line: 2,
                reason: "truncated".into(),
            }),
        ];
        assert!(store
            .populate(&cache, &scope(), members, &PendingFilter::default())
            .is_err());
        assert!(store.view_project(&cache).unwrap().is_empty());
    }

    #[test]
    fn descriptions_are_sanitised_on_insert() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();
        let member = Ok(MemberDescriptor::File {
            name: "/repo/app/a.c".into(),
            id: "a.c".into(),
            parent: "/repo/app/project.pj".into(),
            revision: "1.1".into(),
            description: Some("fix \u{2013} ]]>".into()),
            timestamp: None,
            entry_type: None,
        });
        store
            .populate(&cache, &scope(), vec![member], &PendingFilter::default())
            .unwrap();
        let files = store.view_project(&cache).unwrap();
        assert!(files[0].description.as_deref().unwrap().starts_with("fix - ] ] >"));
    }

    #[test]
    fn create_or_reset_clears_stale_rows() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();
        store
            .populate(&cache, &scope(), vec![file("a.c", "1.1")], &PendingFilter::default())
            .unwrap();

        store.create_or_reset(&cache).unwrap();
        assert!(store.view_project(&cache).unwrap().is_empty());
        assert!(store.exists(&cache).unwrap());
    }

    #[test]
    fn refresh_checksums_ignores_empty_values() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();
        store
            .populate(
                &cache,
                &scope(),
                vec![file("a.c", "1.1"), file("b.c", "1.1")],
                &PendingFilter::default(),
            )
            .unwrap();

        let checksums = HashMap::from([
            ("/repo/app/a.c".to_string(), "abc".to_string()),
            ("/repo/app/b.c".to_string(), String::new()),
            ("/repo/app/missing.c".to_string(), "def".to_string()),
        ]);
        assert_eq!(store.refresh_checksums(&cache, &checksums).unwrap(), 1);

        let view = store.checksum_view(&cache).unwrap();
        assert_eq!(view[0].checksum.as_deref(), Some("abc"));
        assert_eq!(view[1].checksum, None);
    }

    #[test]
    fn prime_authors_respects_scope() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();
        store
            .populate(
                &cache,
                &scope(),
                vec![file("a.c", "1.1"), file("b.c", "1.4")],
                &PendingFilter::default(),
            )
            .unwrap();

        let mut authors = StaticAuthors::default();
        authors.insert("a.c", "1.1", "alice");
        assert_eq!(
            store.prime_authors(&cache, &authors, AuthorScope::All).unwrap(),
            1
        );

        authors.insert("b.c", "1.4", "bob");
        authors.insert("a.c", "1.1", "mallory");
        assert_eq!(
            store
                .prime_authors(&cache, &authors, AuthorScope::MissingOnly)
                .unwrap(),
            1
        );

        let view = store.author_view(&cache).unwrap();
        assert_eq!(view[0].author.as_deref(), Some("alice"));
        assert_eq!(view[1].author.as_deref(), Some("bob"));
    }

    #[test]
    fn drop_snapshot_removes_catalog_entry() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();
        assert_eq!(store.list_snapshots().unwrap(), vec![cache.clone()]);

        assert!(store.drop_snapshot(&cache).unwrap());
        assert!(!store.drop_snapshot(&cache).unwrap());
        assert!(!store.exists(&cache).unwrap());
    }

    #[test]
    fn counts_by_kind() {
        let store = store();
        let cache = CacheId::generate();
        store.create_or_reset(&cache).unwrap();
        store
            .populate(
                &cache,
                &scope(),
                vec![file("a.c", "1.1"), subproject("lib")],
                &PendingFilter::default(),
            )
            .unwrap();
        let counts = store.count_members(&cache).unwrap();
        assert_eq!(counts.files, 1);
        assert_eq!(counts.directories, 1);
        assert_eq!(counts.dropped, 0);
    }
}

//! Delta engine
//!
//! Compares the snapshot of the current build against a baseline snapshot
//! and classifies every file as unchanged, added, changed or dropped.
//! Only the revision decides between changed and unchanged.
//!
//! Classification happens in memory first; the results are then written
//! back in one transaction, together with synthesized rows for every
//! member that disappeared since the baseline.

use crate::error::{SnapResult, StorageContext};
use crate::registry::CacheId;
use crate::snapshot::{self, DeltaState, MemberKind, MemberRecord, StoredMember};
use crate::store::schema::SNAPSHOT_MEMBERS_TABLE;
use crate::store::Database;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

/// Looks up the author of one member revision
///
/// Resolvers run inside the comparison's write unit of work, with the
/// store's write gate held. They must not call back into
/// [`Database::write`]; with a single-connection store that call waits
/// until the checkout timeout and fails.
pub trait AuthorResolver {
    /// `Ok(None)` means the source knows no author for this revision
    fn resolve(
        &self,
        config_path: &str,
        member_id: &str,
        revision: &str,
    ) -> SnapResult<Option<String>>;
}

impl<F> AuthorResolver for F
where
    F: Fn(&str, &str, &str) -> SnapResult<Option<String>>,
{
    fn resolve(
        &self,
        config_path: &str,
        member_id: &str,
        revision: &str,
    ) -> SnapResult<Option<String>> {
        self(config_path, member_id, revision)
    }
}

/// Resolver that never knows an author
pub struct NoAuthors;

impl AuthorResolver for NoAuthors {
    fn resolve(&self, _: &str, _: &str, _: &str) -> SnapResult<Option<String>> {
        Ok(None)
    }
}

/// Authors keyed by member id and revision
#[derive(Debug, Clone, Default)]
pub struct StaticAuthors {
    authors: HashMap<(String, String), String>,
}

impl StaticAuthors {
    pub fn insert(
        &mut self,
        member_id: impl Into<String>,
        revision: impl Into<String>,
        author: impl Into<String>,
    ) {
        self.authors
            .insert((member_id.into(), revision.into()), author.into());
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }
}

impl AuthorResolver for StaticAuthors {
    fn resolve(&self, _: &str, member_id: &str, revision: &str) -> SnapResult<Option<String>> {
        Ok(self
            .authors
            .get(&(member_id.to_string(), revision.to_string()))
            .cloned())
    }
}

/// Resolve the author of a record, logging failures
pub(crate) fn resolve_author(resolver: &dyn AuthorResolver, record: &MemberRecord) -> Option<String> {
    let config_path = record.config_path.as_deref().unwrap_or_default();
    let member_id = record.member_id.as_deref().unwrap_or_default();
    match resolver.resolve(config_path, member_id, record.revision_str()) {
        Ok(author) => author,
        Err(e) => {
            warn!(
                "Could not resolve author of {} revision {}: {}",
                record.name,
                record.revision_str(),
                e
            );
            None
        }
    }
}

/// Counts produced by one comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaReport {
    pub added: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub dropped: usize,
}

impl DeltaReport {
    /// Added, changed and dropped members; unchanged ones never count
    pub fn change_count(&self) -> usize {
        self.added + self.changed + self.dropped
    }
}

/// What a poll should tell the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// No earlier build to compare against
    BuildNow,
    /// Something changed since the last build
    Significant,
    NoChanges,
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildNow => write!(f, "build now"),
            Self::Significant => write!(f, "significant changes"),
            Self::NoChanges => write!(f, "no changes"),
        }
    }
}

/// Decide a poll result from the baseline and the number of changes
pub fn poll_outcome(prior: Option<&CacheId>, change_count: usize) -> PollOutcome {
    match prior {
        None => PollOutcome::BuildNow,
        Some(_) if change_count > 0 => PollOutcome::Significant,
        Some(_) => PollOutcome::NoChanges,
    }
}

/// Pending write for one existing row
struct RowUpdate {
    row_id: i64,
    delta: DeltaState,
    old_revision: Option<String>,
    author: Option<String>,
    checksum: Option<String>,
}

/// Runs baseline comparisons
#[derive(Clone)]
pub struct DeltaEngine {
    db: Database,
}

impl DeltaEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Compare `current` against `prior` and record the result in `current`
    ///
    /// A missing `prior` is an empty baseline: every file is added. When
    /// `enrich_author` is set, added and changed files get their author
    /// from `resolver`. Re-running a comparison replaces the rows a previous
    /// run synthesized for dropped members.
    pub fn compare_baseline(
        &self,
        prior: Option<&CacheId>,
        current: &CacheId,
        enrich_author: bool,
        resolver: &dyn AuthorResolver,
    ) -> SnapResult<DeltaReport> {
        self.db.write("comparing snapshots", |tx| {
            snapshot::require(tx, current)?;

            let mut baseline: BTreeMap<String, MemberRecord> = BTreeMap::new();
            if let Some(prior) = prior {
                snapshot::require(tx, prior)?;
                for row in snapshot::load_files(tx, prior, false)? {
                    baseline.insert(row.record.name.clone(), row.record);
                }
            }
            debug!("Loaded {} baseline members", baseline.len());

            let stale = tx
                .execute(
                    &format!(
                        "DELETE FROM {SNAPSHOT_MEMBERS_TABLE} WHERE cache_id = ?1 AND delta = ?2"
                    ),
                    params![current.as_str(), DeltaState::Dropped.code()],
                )
                .storage_context(|| format!("clearing dropped rows of {current}"))?;
            if stale > 0 {
                debug!("Removed {} dropped rows from an earlier comparison", stale);
            }

            let scanned = snapshot::load_files(tx, current, true)?;
            let mut report = DeltaReport::default();
            let updates: Vec<RowUpdate> = scanned
                .into_iter()
                .map(|row| classify(row, &mut baseline, enrich_author, resolver, &mut report))
                .collect();

            let drops: Vec<MemberRecord> = baseline.into_values().map(dropped_record).collect();
            report.dropped = drops.len();

            let mut update = tx
                .prepare(&format!(
                    "UPDATE {SNAPSHOT_MEMBERS_TABLE}
                     SET delta = ?1, old_revision = ?2, author = ?3, checksum = ?4
                     WHERE row_id = ?5"
                ))
                .storage_context(|| "preparing delta update".to_string())?;
            for row in &updates {
                update
                    .execute(params![
                        row.delta.code(),
                        row.old_revision,
                        row.author,
                        row.checksum,
                        row.row_id
                    ])
                    .storage_context(|| format!("recording delta of row {}", row.row_id))?;
            }

            let mut insert = snapshot::prepare_insert(tx)?;
            for record in &drops {
                debug!("Dropped: {}", record.name);
                snapshot::insert_member(&mut insert, current, record)?;
            }

            info!(
                "Compared {} against {}: {} added, {} changed, {} dropped, {} unchanged",
                current,
                prior.map(CacheId::as_str).unwrap_or("empty baseline"),
                report.added,
                report.changed,
                report.dropped,
                report.unchanged
            );
            Ok(report)
        })
    }
}

fn classify(
    row: StoredMember,
    baseline: &mut BTreeMap<String, MemberRecord>,
    enrich_author: bool,
    resolver: &dyn AuthorResolver,
    report: &mut DeltaReport,
) -> RowUpdate {
    let StoredMember { row_id, record } = row;
    let enrich = |record: &MemberRecord| {
        if enrich_author {
            resolve_author(resolver, record)
        } else {
            None
        }
    };

    match baseline.remove(&record.name) {
        Some(prior) if prior.revision_str() != record.revision_str() => {
            debug!(
                "Changed: {} {} -> {}",
                record.name,
                prior.revision_str(),
                record.revision_str()
            );
            report.changed += 1;
            RowUpdate {
                row_id,
                delta: DeltaState::Changed,
                old_revision: Some(prior.revision_str().to_string()),
                author: enrich(&record),
                checksum: record.checksum,
            }
        }
        Some(prior) => {
            report.unchanged += 1;
            RowUpdate {
                row_id,
                delta: DeltaState::Unchanged,
                old_revision: None,
                author: prior.author.or(record.author),
                checksum: prior.checksum.or(record.checksum),
            }
        }
        None => {
            debug!("Added: {}", record.name);
            report.added += 1;
            RowUpdate {
                row_id,
                delta: DeltaState::Added,
                old_revision: None,
                author: enrich(&record),
                checksum: record.checksum,
            }
        }
    }
}

fn dropped_record(prior: MemberRecord) -> MemberRecord {
    MemberRecord {
        kind: MemberKind::File,
        member_id: Some(prior.member_id.unwrap_or_default()),
        timestamp: prior.timestamp,
        description: Some(prior.description.unwrap_or_default()),
        author: prior.author,
        config_path: Some(prior.config_path.unwrap_or_default()),
        revision: Some(prior.revision.unwrap_or_default()),
        old_revision: None,
        relative_path: Some(prior.relative_path.unwrap_or_default()),
        checksum: None,
        delta: DeltaState::Dropped,
        name: prior.name,
    }
}

//! Cache maintenance
//!
//! Retires snapshots that are no longer needed. The registry drives every
//! sweep: a snapshot is dropped first, then its registry entry is removed.
//! A failed drop is logged and counted, and the registry entry is removed
//! anyway so the registry never points at builds nobody will ask for. The
//! orphan sweep reclaims snapshots left behind that way.

use crate::error::SnapResult;
use crate::registry::{CacheId, Registry, RegistryEntry};
use crate::snapshot::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Storage for snapshots as seen by maintenance
pub trait SnapshotTables {
    /// Drop one snapshot; `Ok(false)` if it did not exist
    fn drop_snapshot(&self, cache: &CacheId) -> SnapResult<bool>;

    /// Every snapshot currently stored
    fn list_snapshots(&self) -> SnapResult<Vec<CacheId>>;
}

impl SnapshotTables for SnapshotStore {
    fn drop_snapshot(&self, cache: &CacheId) -> SnapResult<bool> {
        SnapshotStore::drop_snapshot(self, cache)
    }

    fn list_snapshots(&self) -> SnapResult<Vec<CacheId>> {
        SnapshotStore::list_snapshots(self)
    }
}

/// What a maintenance pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Snapshots dropped
    pub dropped: usize,
    /// Snapshots whose drop failed
    pub drop_failures: usize,
    /// Registry entries removed
    pub entries_removed: usize,
}

impl MaintenanceReport {
    fn merge(&mut self, other: MaintenanceReport) {
        self.dropped += other.dropped;
        self.drop_failures += other.drop_failures;
        self.entries_removed += other.entries_removed;
    }
}

/// Registry-driven garbage collection
pub struct Maintenance<T = SnapshotStore> {
    registry: Registry,
    tables: T,
}

impl<T: SnapshotTables> Maintenance<T> {
    pub fn new(registry: Registry, tables: T) -> Self {
        Self { registry, tables }
    }

    /// Drop every cache of a job, in any configuration
    pub fn purge_job(&self, job: &str) -> SnapResult<MaintenanceReport> {
        let entries = self.registry.entries_for_job(job)?;
        info!("Purging {} caches of job '{}'", entries.len(), job);
        self.retire(&entries)
    }

    /// Drop every cache of a job except those of `build_number`
    pub fn retain_latest(&self, job: &str, build_number: i64) -> SnapResult<MaintenanceReport> {
        let stale: Vec<RegistryEntry> = self
            .registry
            .entries_for_job(job)?
            .into_iter()
            .filter(|entry| entry.build_number != build_number)
            .collect();
        if stale.is_empty() {
            debug!("No stale caches for job '{}'", job);
            return Ok(MaintenanceReport::default());
        }
        info!(
            "Retaining build {} of job '{}', retiring {} caches",
            build_number,
            job,
            stale.len()
        );
        self.retire(&stale)
    }

    /// Purge every registered job that is not in `active_jobs`
    pub fn sweep_removed_jobs(&self, active_jobs: &BTreeSet<String>) -> SnapResult<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        for job in self.registry.distinct_jobs()? {
            if active_jobs.contains(&job) {
                continue;
            }
            info!("Job '{}' no longer exists, purging its caches", job);
            report.merge(self.purge_job(&job)?);
        }
        Ok(report)
    }

    /// Drop snapshots that no registry entry refers to
    pub fn sweep_orphans(&self) -> SnapResult<MaintenanceReport> {
        let registered: BTreeSet<CacheId> = self
            .registry
            .all_entries()?
            .into_iter()
            .map(|entry| entry.cache_id)
            .collect();

        let mut report = MaintenanceReport::default();
        for cache in self.tables.list_snapshots()? {
            if registered.contains(&cache) {
                continue;
            }
            debug!("Snapshot {} has no registry entry", cache);
            self.drop_one(&cache, &mut report);
        }
        Ok(report)
    }

    fn retire(&self, entries: &[RegistryEntry]) -> SnapResult<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        for entry in entries {
            self.drop_one(&entry.cache_id, &mut report);
        }

        let ids: Vec<CacheId> = entries.iter().map(|e| e.cache_id.clone()).collect();
        report.entries_removed = self.registry.delete_entries(&ids)?;
        Ok(report)
    }

    fn drop_one(&self, cache: &CacheId, report: &mut MaintenanceReport) {
        match self.tables.drop_snapshot(cache) {
            Ok(true) => report.dropped += 1,
            Ok(false) => debug!("Snapshot {} was already gone", cache),
            Err(e) => {
                warn!("Failed to drop snapshot {}: {}", cache, e);
                report.drop_failures += 1;
            }
        }
    }
}

//! Build and poll orchestration
//!
//! Ties the registry, the snapshot store, the delta engine and maintenance
//! together the way a build uses them:
//!
//! 1. register the build and get its cache identifier
//! 2. start a clean snapshot and populate it from the enumerator
//! 3. compare it against the previous build's snapshot
//! 4. optionally backfill authors and retire older caches

use crate::config::schema::{AuthorBackfill, Config, DeltaConfig, RetentionConfig};
use crate::delta::{poll_outcome, AuthorResolver, DeltaEngine, DeltaReport, PollOutcome};
use crate::error::SnapResult;
use crate::maintenance::{Maintenance, MaintenanceReport};
use crate::registry::{CacheId, Registry};
use crate::snapshot::{
    AuthorScope, MemberDescriptor, PendingFilter, PopulateReport, ProjectScope, SnapshotStore,
};
use crate::store::Database;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Build number reserved for polling
pub const POLLING_BUILD: i64 = 0;

/// Which build is being captured
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub job: String,
    pub configuration: String,
    pub build_number: i64,
    pub scope: ProjectScope,
}

/// Everything a build run did
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSummary {
    pub cache_id: CacheId,
    /// Snapshot the build was compared against
    pub baseline: Option<CacheId>,
    pub populate: PopulateReport,
    pub delta: DeltaReport,
    pub outcome: PollOutcome,
    /// Authors filled in after the comparison
    pub backfilled: usize,
    pub retention: Option<MaintenanceReport>,
}

impl BuildSummary {
    pub fn change_count(&self) -> usize {
        self.delta.change_count()
    }
}

/// Runs builds and polls against one store
pub struct Workflow {
    registry: Registry,
    snapshots: SnapshotStore,
    engine: DeltaEngine,
    filter: PendingFilter,
    delta: DeltaConfig,
    retention: RetentionConfig,
}

impl Workflow {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            registry: Registry::new(db.clone()),
            snapshots: SnapshotStore::new(db.clone()),
            engine: DeltaEngine::new(db),
            filter: PendingFilter::from_config(&config.source),
            delta: config.delta.clone(),
            retention: config.retention.clone(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Capture a build and compare it against the previous one
    pub fn run_build<I>(
        &self,
        request: &BuildRequest,
        members: I,
        resolver: &dyn AuthorResolver,
    ) -> SnapResult<BuildSummary>
    where
        I: IntoIterator<Item = SnapResult<MemberDescriptor>>,
    {
        let enrich = self.delta.enrich_author && request.build_number != POLLING_BUILD;
        let mut summary = self.capture(request, members, enrich, resolver)?;

        if self.delta.author_backfill == AuthorBackfill::Missing {
            summary.backfilled =
                self.snapshots
                    .prime_authors(&summary.cache_id, resolver, AuthorScope::MissingOnly)?;
        }

        if self.retention.enabled && request.build_number != POLLING_BUILD {
            let maintenance = Maintenance::new(self.registry.clone(), self.snapshots.clone());
            summary.retention =
                Some(maintenance.retain_latest(&request.job, request.build_number)?);
        }

        info!(
            "Build {} of {}/{}: {} ({} changes)",
            request.build_number,
            request.job,
            request.configuration,
            summary.outcome,
            summary.change_count()
        );
        Ok(summary)
    }

    /// Capture the current state under the polling slot and compare it
    /// against the latest build
    ///
    /// Polling never resolves authors and never retires caches.
    pub fn poll<I>(
        &self,
        job: &str,
        configuration: &str,
        scope: &ProjectScope,
        members: I,
    ) -> SnapResult<BuildSummary>
    where
        I: IntoIterator<Item = SnapResult<MemberDescriptor>>,
    {
        let request = BuildRequest {
            job: job.to_string(),
            configuration: configuration.to_string(),
            build_number: POLLING_BUILD,
            scope: scope.clone(),
        };
        self.capture(&request, members, false, &crate::delta::NoAuthors)
    }

    fn capture<I>(
        &self,
        request: &BuildRequest,
        members: I,
        enrich: bool,
        resolver: &dyn AuthorResolver,
    ) -> SnapResult<BuildSummary>
    where
        I: IntoIterator<Item = SnapResult<MemberDescriptor>>,
    {
        let cache_id = self.registry.register(
            &request.job,
            &request.configuration,
            request.build_number,
        )?;
        self.snapshots.create_or_reset(&cache_id)?;
        let populate = self
            .snapshots
            .populate(&cache_id, &request.scope, members, &self.filter)?;

        let baseline = self.baseline(request)?;
        let delta =
            self.engine
                .compare_baseline(baseline.as_ref(), &cache_id, enrich, resolver)?;

        Ok(BuildSummary {
            outcome: poll_outcome(baseline.as_ref(), delta.change_count()),
            cache_id,
            baseline,
            populate,
            delta,
            backfilled: 0,
            retention: None,
        })
    }

    /// Snapshot of the latest real build before this one
    fn baseline(&self, request: &BuildRequest) -> SnapResult<Option<CacheId>> {
        let prior = if request.build_number == POLLING_BUILD {
            self.registry
                .latest_for(&request.job, &request.configuration)?
                .into_iter()
                .find(|entry| entry.build_number != POLLING_BUILD)
                .map(|entry| entry.cache_id)
        } else {
            self.registry
                .predecessor(&request.job, &request.configuration, request.build_number)?
        };

        match prior {
            Some(cache) if !self.snapshots.exists(&cache)? => {
                warn!(
                    "Previous cache {} of {} has no snapshot, comparing against nothing",
                    cache, request.job
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }
}

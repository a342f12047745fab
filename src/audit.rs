//! Audit journal of cache lifecycle events
//!
//! Appends one JSON line per event to `<state_dir>/audit.log`, so that it
//! is possible to tell afterwards which build created or retired a cache.

use crate::config::{schema::Config, ConfigManager};
use crate::delta::DeltaReport;
use crate::maintenance::MaintenanceReport;
use crate::registry::CacheId;
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Events recorded in the journal
#[derive(Debug, Clone)]
pub enum AuditEvent<'a> {
    Registered {
        job: &'a str,
        configuration: &'a str,
        build_number: i64,
        cache_id: &'a CacheId,
    },
    Compared {
        cache_id: &'a CacheId,
        baseline: Option<&'a CacheId>,
        report: &'a DeltaReport,
    },
    Purged {
        job: &'a str,
        report: &'a MaintenanceReport,
    },
    Retained {
        job: &'a str,
        build_number: i64,
        report: &'a MaintenanceReport,
    },
}

impl AuditEvent<'_> {
    /// Event name as written to the journal
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "cache.registered",
            Self::Compared { .. } => "cache.compared",
            Self::Purged { .. } => "cache.purged",
            Self::Retained { .. } => "cache.retained",
        }
    }

    fn data(&self) -> serde_json::Value {
        match self {
            Self::Registered {
                job,
                configuration,
                build_number,
                cache_id,
            } => json!({
                "job": job,
                "configuration": configuration,
                "build_number": build_number,
                "cache_id": cache_id,
            }),
            Self::Compared {
                cache_id,
                baseline,
                report,
            } => json!({
                "cache_id": cache_id,
                "baseline": baseline,
                "added": report.added,
                "changed": report.changed,
                "dropped": report.dropped,
                "unchanged": report.unchanged,
            }),
            Self::Purged { job, report } => json!({
                "job": job,
                "dropped": report.dropped,
                "drop_failures": report.drop_failures,
                "entries_removed": report.entries_removed,
            }),
            Self::Retained {
                job,
                build_number,
                report,
            } => json!({
                "job": job,
                "build_number": build_number,
                "dropped": report.dropped,
                "drop_failures": report.drop_failures,
                "entries_removed": report.entries_removed,
            }),
        }
    }
}

/// File-based journal that appends JSON lines
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Create a journal from config
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.audit_log,
            path: ConfigManager::audit_log_path(),
        }
    }

    /// Journal at an explicit location
    pub fn at(path: PathBuf, enabled: bool) -> Self {
        Self { enabled, path }
    }

    /// Append an event
    ///
    /// IO failures are logged and swallowed; a broken journal never fails
    /// the operation being journaled.
    pub async fn record(&self, event: &AuditEvent<'_>) {
        if !self.enabled {
            return;
        }

        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": event.name(),
            "data": event.data(),
        });

        let mut line = match serde_json::to_string(&entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write audit log {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

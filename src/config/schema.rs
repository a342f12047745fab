//! Configuration schema for snapdelta
//!
//! Configuration is stored at `~/.config/snapdelta/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Embedded store settings
    pub store: StoreConfig,

    /// Baseline comparison settings
    pub delta: DeltaConfig,

    /// Cache retention settings
    pub retention: RetentionConfig,

    /// Member source settings
    pub source: SourceConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Embedded store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file (defaults to the state directory)
    pub path: Option<PathBuf>,

    /// Maximum pooled connections
    pub pool_size: u32,

    /// How long a unit of work waits for a pooled connection
    pub checkout_timeout_ms: u64,

    /// SQLite busy timeout applied to each connection
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 4,
            checkout_timeout_ms: 30_000,
            busy_timeout_ms: 5_000,
        }
    }
}

/// What to do with authors left unset by a comparison that skipped enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorBackfill {
    /// Leave them empty for good
    #[default]
    Never,
    /// Run the author-priming pass over rows without an author
    Missing,
}

/// Baseline comparison configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Resolve authors for added and changed members
    pub enrich_author: bool,

    /// Backfill policy when `enrich_author` is off
    pub author_backfill: AuthorBackfill,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            enrich_author: true,
            author_backfill: AuthorBackfill::Never,
        }
    }
}

/// Cache retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Drop superseded caches after each recorded build
    pub enabled: bool,

    /// Purge caches of jobs that no longer exist
    pub purge_removed_jobs: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            purge_removed_jobs: true,
        }
    }
}

/// Member source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Entry types of subprojects that are still pending
    pub pending_subproject_markers: Vec<String>,

    /// Entry types of members that are still pending (exact, case-insensitive)
    pub pending_member_markers: Vec<String>,

    /// Entry type suffixes of members inside pending subprojects
    pub pending_member_suffixes: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pending_subproject_markers: vec!["pending-sharesubproject".to_string()],
            pending_member_markers: vec![
                "pending-add".to_string(),
                "pending-move-to-update".to_string(),
                "pending-rename-update".to_string(),
            ],
            pending_member_suffixes: vec!["in-pending-sub".to_string()],
        }
    }
}

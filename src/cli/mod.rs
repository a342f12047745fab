//! Command-line interface

pub mod args;
pub mod commands;
pub mod listing;

pub use args::{Cli, Commands};

use crate::config::{Config, ConfigManager};
use crate::error::{SnapError, SnapResult};
use crate::registry::{CacheId, Registry};
use crate::store::Database;
use args::CacheSelector;
use tracing::debug;

/// Open the configured store, creating its directory and tables as needed
pub(crate) async fn open_store(config: &Config) -> SnapResult<Database> {
    let path = ConfigManager::database_path(config);
    ConfigManager::ensure_store_dir(&path).await?;
    debug!("Using cache store {}", path.display());

    let db = Database::from_config(config)?;
    crate::bootstrap(&db)?;
    Ok(db)
}

/// Turn a selector into a cache identifier
pub(crate) fn resolve_cache(registry: &Registry, selector: &CacheSelector) -> SnapResult<CacheId> {
    if let Some(raw) = &selector.cache {
        return CacheId::parse(raw);
    }
    match (&selector.job, selector.build) {
        (Some(job), Some(build)) => registry
            .lookup(job, &selector.configuration, build)?
            .ok_or_else(|| {
                SnapError::User(format!(
                    "No cache registered for {}/{} build {}",
                    job, selector.configuration, build
                ))
            }),
        _ => Err(SnapError::User(
            "Select a snapshot with --cache or --job and --build".to_string(),
        )),
    }
}

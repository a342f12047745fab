//! snapdelta - build snapshot cache and change detection
//!
//! Records the member listing of a source-control project for every build
//! in an embedded SQLite store, compares it against the previous build and
//! keeps a side cache of open change packages.

pub mod audit;
pub mod change_package;
pub mod cli;
pub mod config;
pub mod delta;
pub mod error;
pub mod maintenance;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod ui;
pub mod workflow;

pub use error::{SnapError, SnapResult};

use change_package::ChangePackageCache;
use registry::Registry;
use snapshot::SnapshotStore;
use store::Database;

/// Create every table the store needs and verify the existing ones
pub fn bootstrap(db: &Database) -> SnapResult<()> {
    Registry::new(db.clone()).ensure_exists()?;
    SnapshotStore::new(db.clone()).ensure_exists()?;
    ChangePackageCache::new(db.clone()).ensure_exists()?;
    Ok(())
}

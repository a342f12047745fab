//! Embedded cache store
//!
//! One SQLite database holds the registry, every snapshot and every
//! change-package side table. Access goes through [`Database`], which
//! hands out pooled connections and serialises all mutating work behind
//! one process-wide gate.
//!
//! # Units of work
//!
//! | Kind | Gate | Transaction |
//! |------|------|-------------|
//! | read | no | none (autocommit) |
//! | write | held for the whole call | one, committed once |

pub mod codec;
pub mod pool;
pub mod schema;

pub use codec::{FieldValue, RowCodec, RowData};
pub use pool::{ConnectionPool, PoolOptions, StoreTarget};
pub use schema::Field;

use crate::config::{Config, ConfigManager};
use crate::error::{SnapError, SnapResult};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error};

/// Serialises every mutating operation in the process
static WRITE_GATE: Mutex<()> = Mutex::new(());

fn acquire_gate() -> MutexGuard<'static, ()> {
    WRITE_GATE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to the embedded store
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Open (or create) a store file
    pub fn open(path: &Path, options: PoolOptions) -> SnapResult<Self> {
        debug!("Opening cache store at {}", path.display());
        let pool = ConnectionPool::new(StoreTarget::File(path.to_path_buf()), options)?;
        Ok(Self { pool })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> SnapResult<Self> {
        let pool = ConnectionPool::new(StoreTarget::Memory, PoolOptions::default())?;
        Ok(Self { pool })
    }

    /// Open the store described by a loaded config
    pub fn from_config(config: &Config) -> SnapResult<Self> {
        let options = PoolOptions {
            max_size: usize::try_from(config.store.pool_size).unwrap_or(1),
            checkout_timeout: Duration::from_millis(config.store.checkout_timeout_ms),
            busy_timeout: Duration::from_millis(config.store.busy_timeout_ms),
        };
        Self::open(&ConfigManager::database_path(config), options)
    }

    /// Run a read-only unit of work
    ///
    /// Reads do not take the write gate and see whatever has been committed.
    pub fn read<T>(
        &self,
        context: &str,
        work: impl FnOnce(&Connection) -> SnapResult<T>,
    ) -> SnapResult<T> {
        let conn = self.pool.get()?;
        work(&conn).inspect_err(|e| error!("Failed while {}: {}", context, e))
    }

    /// Run a mutating unit of work
    ///
    /// Holds the process-wide gate, runs `work` inside one transaction and
    /// commits exactly once. Any error rolls the whole unit back.
    pub fn write<T>(
        &self,
        context: &str,
        work: impl FnOnce(&Transaction<'_>) -> SnapResult<T>,
    ) -> SnapResult<T> {
        let _gate = acquire_gate();
        let mut conn = self.pool.get()?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| SnapError::storage(format!("starting transaction for {context}"), e))?;

        match work(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| SnapError::storage(format!("committing {context}"), e))?;
                Ok(value)
            }
            Err(e) => {
                error!("Failed while {}: {}", context, e);
                // Dropping the transaction rolls it back.
                drop(tx);
                Err(e)
            }
        }
    }

    /// Underlying pool, for diagnostics
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

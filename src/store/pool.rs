//! Bounded pool of SQLite connections
//!
//! Connections are opened lazily up to `max_size`. A checkout beyond that
//! blocks on a condvar until a connection comes back or the checkout
//! timeout elapses; that wait is the only blocking point in the store.

use crate::error::{SnapError, SnapResult};
use rusqlite::{Connection, OpenFlags};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Where pooled connections point
#[derive(Debug, Clone)]
pub enum StoreTarget {
    /// A database file on disk
    File(PathBuf),
    /// A private in-memory database (pool is clamped to one connection)
    Memory,
}

/// Pool sizing and timeouts
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_size: usize,
    pub checkout_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 4,
            checkout_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

struct PoolState {
    idle: Vec<Connection>,
    created: usize,
}

struct PoolShared {
    target: StoreTarget,
    options: PoolOptions,
    state: Mutex<PoolState>,
    cvar: Condvar,
}

impl PoolShared {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open(&self) -> SnapResult<Connection> {
        let conn = match &self.target {
            StoreTarget::File(path) => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| SnapError::unavailable(format!("opening {}", path.display()), e))?,
            StoreTarget::Memory => Connection::open_in_memory()
                .map_err(|e| SnapError::unavailable("opening in-memory store", e))?,
        };

        conn.busy_timeout(self.options.busy_timeout)
            .map_err(|e| SnapError::unavailable("setting busy timeout", e))?;
        if matches!(self.target, StoreTarget::File(_)) {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| SnapError::unavailable("enabling WAL journal", e))?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(|e| SnapError::unavailable("setting synchronous mode", e))?;
        }
        Ok(conn)
    }
}

/// Pool of connections to one store
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool; the first connection is opened eagerly so a bad
    /// path fails here instead of on first use
    pub fn new(target: StoreTarget, mut options: PoolOptions) -> SnapResult<Self> {
        if matches!(target, StoreTarget::Memory) {
            options.max_size = 1;
        }
        options.max_size = options.max_size.max(1);

        let shared = Arc::new(PoolShared {
            target,
            options,
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                created: 0,
            }),
            cvar: Condvar::new(),
        });

        let first = shared.open()?;
        {
            let mut state = shared.lock_state();
            state.idle.push(first);
            state.created = 1;
        }

        Ok(Self { shared })
    }

    /// Check out a connection, waiting up to the checkout timeout
    pub fn get(&self) -> SnapResult<PooledConnection> {
        let started = Instant::now();
        let timeout = self.shared.options.checkout_timeout;
        let mut state = self.shared.lock_state();

        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(self.wrap(conn));
            }

            if state.created < self.shared.options.max_size {
                state.created += 1;
                drop(state);
                return match self.shared.open() {
                    Ok(conn) => {
                        debug!("Opened pooled connection");
                        Ok(self.wrap(conn))
                    }
                    Err(e) => {
                        self.shared.lock_state().created -= 1;
                        self.shared.cvar.notify_one();
                        Err(e)
                    }
                };
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(SnapError::PoolExhausted {
                    waited_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                });
            }

            let (guard, _) = self
                .shared
                .cvar
                .wait_timeout(state, timeout - elapsed)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            state = guard;
        }
    }

    /// Number of connections currently open (idle or checked out)
    pub fn size(&self) -> usize {
        self.shared.lock_state().created
    }

    /// Number of idle connections
    pub fn idle(&self) -> usize {
        self.shared.lock_state().idle.len()
    }

    fn wrap(&self, conn: Connection) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.shared),
        }
    }
}

/// A connection that goes back to its pool on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolShared>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.conn.as_ref() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.conn.as_mut() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            // A connection left inside a transaction is not reusable.
            if conn.is_autocommit() {
                self.pool.lock_state().idle.push(conn);
            } else {
                self.pool.lock_state().created -= 1;
            }
            self.pool.cvar.notify_one();
        }
    }
}

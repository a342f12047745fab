//! Error types for snapdelta
//!
//! All modules use `SnapResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for snapdelta operations
pub type SnapResult<T> = Result<T, SnapError>;

/// All errors that can occur in snapdelta
#[derive(Error, Debug)]
pub enum SnapError {
    // Storage errors
    #[error("Cache store unavailable: {context}: {source}")]
    StorageUnavailable {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Timed out after {waited_ms} ms waiting for a cache store connection")]
    PoolExhausted { waited_ms: u64 },

    #[error("Cache store error while {context}: {source}")]
    Storage {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Schema mismatch in {table}: {reason}")]
    SchemaMismatch { table: String, reason: String },

    // Cache errors
    #[error("Snapshot not found for cache {0}")]
    SnapshotMissing(String),

    #[error("Invalid cache identifier: {0}")]
    InvalidCacheId(String),

    #[error("Invalid change-package table name: {0}")]
    InvalidTableName(String),

    // Member source errors
    #[error("Invalid member entry on line {line}: {reason}")]
    Member { line: usize, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl SnapError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a storage error for a failed statement
    pub fn storage(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    /// Create an error for a connection that could not be opened
    pub fn unavailable(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::StorageUnavailable {
            context: context.into(),
            source,
        }
    }

    /// Whether this error came from the backing store
    ///
    /// Storage failures abort the current build; nothing in this crate
    /// retries them.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable { .. } | Self::PoolExhausted { .. } | Self::Storage { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::StorageUnavailable { .. } => {
                Some("Check that the database path in [store] is writable")
            }
            Self::PoolExhausted { .. } => {
                Some("Raise store.pool_size or store.checkout_timeout_ms")
            }
            Self::SnapshotMissing(_) => Some("Run: snapdelta snapshot to capture it first"),
            Self::ConfigInvalid { .. } => Some("Run: snapdelta config show"),
            _ => None,
        }
    }
}

/// Map a rusqlite error into a storage error with context
pub(crate) trait StorageContext<T> {
    fn storage_context(self, context: impl FnOnce() -> String) -> SnapResult<T>;
}

impl<T> StorageContext<T> for Result<T, rusqlite::Error> {
    fn storage_context(self, context: impl FnOnce() -> String) -> SnapResult<T> {
        self.map_err(|e| SnapError::storage(context(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SnapError::SnapshotMissing("SCM_abc".to_string());
        assert!(err.to_string().contains("SCM_abc"));
    }

    #[test]
    fn error_hint() {
        let err = SnapError::PoolExhausted { waited_ms: 10 };
        assert_eq!(
            err.hint(),
            Some("Raise store.pool_size or store.checkout_timeout_ms")
        );
        assert_eq!(SnapError::User("x".into()).hint(), None);
    }

    #[test]
    fn storage_failure_classification() {
        assert!(SnapError::PoolExhausted { waited_ms: 1 }.is_storage_failure());
        assert!(
            SnapError::storage("inserting", rusqlite::Error::InvalidQuery).is_storage_failure()
        );
        assert!(!SnapError::SnapshotMissing("x".into()).is_storage_failure());
    }

    #[test]
    fn storage_context_wraps() {
        let res: Result<(), rusqlite::Error> = Err(rusqlite::Error::InvalidQuery);
        let err = res.storage_context(|| "probing".to_string()).unwrap_err();
        assert!(err.to_string().contains("probing"));
    }
}

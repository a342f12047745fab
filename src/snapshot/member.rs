//! Member rows of a snapshot

use crate::error::{SnapError, SnapResult};
use crate::store::{Field, FieldValue, RowData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of project member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    /// A file; the only kind that takes part in comparisons
    File,
    /// A subproject mount point
    Directory,
}

impl MemberKind {
    /// Stored column value
    pub fn code(self) -> i64 {
        match self {
            Self::File => 0,
            Self::Directory => 1,
        }
    }

    /// Parse a stored column value
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::File),
            1 => Some(Self::Directory),
            _ => None,
        }
    }
}

/// Classification of a member against the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaState {
    Unchanged,
    Added,
    Changed,
    Dropped,
    /// Not compared yet
    #[default]
    Unset,
}

impl DeltaState {
    /// Stored column value (`None` is stored as NULL)
    pub fn code(self) -> Option<i64> {
        match self {
            Self::Unchanged => Some(0),
            Self::Added => Some(1),
            Self::Changed => Some(2),
            Self::Dropped => Some(3),
            Self::Unset => None,
        }
    }

    /// Parse a stored column value
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(0) => Self::Unchanged,
            Some(1) => Self::Added,
            Some(2) => Self::Changed,
            Some(3) => Self::Dropped,
            _ => Self::Unset,
        }
    }

    /// Whether this state counts as a change
    pub fn is_change(self) -> bool {
        matches!(self, Self::Added | Self::Changed | Self::Dropped)
    }
}

impl fmt::Display for DeltaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Added => write!(f, "added"),
            Self::Changed => write!(f, "changed"),
            Self::Dropped => write!(f, "dropped"),
            Self::Unset => write!(f, "-"),
        }
    }
}

/// One member row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub kind: MemberKind,
    pub name: String,
    pub member_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub config_path: Option<String>,
    pub revision: Option<String>,
    pub old_revision: Option<String>,
    pub relative_path: Option<String>,
    pub checksum: Option<String>,
    pub delta: DeltaState,
}

impl MemberRecord {
    /// A bare file row, mostly for building test fixtures
    pub fn file(name: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            kind: MemberKind::File,
            name: name.into(),
            member_id: None,
            timestamp: None,
            description: None,
            author: None,
            config_path: None,
            revision: Some(revision.into()),
            old_revision: None,
            relative_path: None,
            checksum: None,
            delta: DeltaState::Unset,
        }
    }

    /// Build a record from a decoded row
    ///
    /// Views select column subsets, so every field except the name is
    /// optional; a missing kind means the view only returns files.
    pub fn from_row(row: &RowData) -> SnapResult<Self> {
        let text = |field: Field| row.get(&field).map(|v| v.to_string());

        let name = text(Field::Name)
            .ok_or_else(|| SnapError::Internal("member row without a name".to_string()))?;
        let kind = match row.get(&Field::Kind).and_then(FieldValue::as_i64) {
            Some(code) => MemberKind::from_code(code).ok_or_else(|| {
                SnapError::Internal(format!("member {name} has unknown kind {code}"))
            })?,
            None => MemberKind::File,
        };

        Ok(Self {
            kind,
            member_id: text(Field::MemberId),
            timestamp: row.get(&Field::Timestamp).and_then(FieldValue::as_timestamp),
            description: text(Field::Description),
            author: text(Field::Author),
            config_path: text(Field::ConfigPath),
            revision: text(Field::Revision),
            old_revision: text(Field::OldRevision),
            relative_path: text(Field::RelativePath),
            checksum: text(Field::Checksum),
            delta: DeltaState::from_code(row.get(&Field::Delta).and_then(FieldValue::as_i64)),
            name,
        })
    }

    /// Revision, or empty when unknown
    pub fn revision_str(&self) -> &str {
        self.revision.as_deref().unwrap_or_default()
    }
}

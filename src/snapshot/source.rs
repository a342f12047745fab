//! Member descriptors produced by the project enumerator
//!
//! The enumerator crawls the project tree and yields one descriptor per
//! subproject or member. It is consumed once, in order.

use crate::config::schema::SourceConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One enumerated entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MemberDescriptor {
    /// A subproject
    Directory {
        /// Canonical path of the subproject file
        name: String,
        /// Configuration path of the subproject
        id: String,
        #[serde(default)]
        revision: Option<String>,
        #[serde(default, rename = "type")]
        entry_type: Option<String>,
    },
    /// A file member
    File {
        /// Canonical path of the member
        name: String,
        /// Stable member identifier
        id: String,
        /// Canonical path of the owning (sub)project
        parent: String,
        revision: String,
        /// `None` when the source could not provide one
        #[serde(default)]
        description: Option<String>,
        /// `None` when the source could not provide one
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default, rename = "type")]
        entry_type: Option<String>,
    },
}

impl MemberDescriptor {
    /// Canonical path
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name, .. } | Self::File { name, .. } => name,
        }
    }

    /// Entry type hint, or empty
    pub fn entry_type(&self) -> &str {
        match self {
            Self::Directory { entry_type, .. } | Self::File { entry_type, .. } => {
                entry_type.as_deref().unwrap_or_default()
            }
        }
    }
}

/// The project being captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectScope {
    /// Canonical path of the project file, e.g. `/repo/app/project.pj`
    pub project_name: String,
    /// Configuration path of the project
    pub configuration_path: String,
}

impl ProjectScope {
    pub fn new(project_name: impl Into<String>, configuration_path: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            configuration_path: configuration_path.into(),
        }
    }

    /// Directory that holds the project file; members must live below it
    pub fn root(&self) -> &str {
        match self.project_name.rfind('/') {
            Some(idx) => &self.project_name[..idx],
            None => "",
        }
    }

    /// Path of `name` relative to the project root
    pub fn relative<'a>(&self, name: &'a str) -> &'a str {
        name.get(self.root().len()..).unwrap_or(name)
    }

    /// Relative directory of a subproject (its path minus the file name)
    pub fn subproject_dir<'a>(&self, name: &'a str) -> &'a str {
        let relative = self.relative(name);
        match relative.rfind('/') {
            Some(idx) => &relative[..idx],
            None => "",
        }
    }
}

/// Recognises entries that are still pending and must not be cached
#[derive(Debug, Clone)]
pub struct PendingFilter {
    subproject_markers: Vec<String>,
    member_markers: Vec<String>,
    member_suffixes: Vec<String>,
}

impl PendingFilter {
    /// Build from the `[source]` config section
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            subproject_markers: config.pending_subproject_markers.clone(),
            member_markers: config.pending_member_markers.clone(),
            member_suffixes: config.pending_member_suffixes.clone(),
        }
    }

    /// Whether this entry should be skipped
    pub fn is_pending(&self, member: &MemberDescriptor) -> bool {
        let entry_type = member.entry_type();
        if entry_type.is_empty() {
            return false;
        }
        match member {
            MemberDescriptor::Directory { .. } => self
                .subproject_markers
                .iter()
                .any(|m| entry_type.eq_ignore_ascii_case(m)),
            MemberDescriptor::File { .. } => {
                self.member_suffixes.iter().any(|s| entry_type.ends_with(s.as_str()))
                    || self
                        .member_markers
                        .iter()
                        .any(|m| entry_type.eq_ignore_ascii_case(m))
            }
        }
    }
}

impl Default for PendingFilter {
    fn default() -> Self {
        Self::from_config(&SourceConfig::default())
    }
}

/// Neutralise characters that break the change log
///
/// The en dash becomes a plain dash and CDATA delimiters are spaced out so
/// the text can be embedded in a CDATA section.
pub fn sanitize_description(desc: &str) -> String {
    desc.replace('\u{2013}', "-")
        .replace("<![CDATA[", "< ! [ CDATA [")
        .replace("]]>", "] ] >")
}

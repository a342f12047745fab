//! JSON-lines member listings
//!
//! Each non-empty line is one [`MemberDescriptor`], optionally carrying the
//! `author` of that revision:
//!
//! ```text
//! {"kind":"directory","name":"/repo/app/lib/project.pj","id":"#/repo/app#lib"}
//! {"kind":"file","name":"/repo/app/a.c","id":"a.c","parent":"/repo/app/project.pj","revision":"1.4","author":"alice"}
//! ```

use crate::delta::StaticAuthors;
use crate::error::{SnapError, SnapResult};
use crate::snapshot::MemberDescriptor;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::debug;

#[derive(Deserialize)]
struct ListingLine {
    #[serde(flatten)]
    member: MemberDescriptor,
    #[serde(default)]
    author: Option<String>,
}

/// A parsed listing
pub struct Listing {
    /// Members in listing order; malformed lines stay in place as errors
    pub members: Vec<SnapResult<MemberDescriptor>>,
    /// Authors found in the listing
    pub authors: StaticAuthors,
}

impl Listing {
    /// Read a listing from a file, or stdin for `-`
    pub async fn load(path: &Path) -> SnapResult<Self> {
        let text = if path == Path::new("-") {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .map_err(|e| SnapError::io("reading member listing from stdin", e))?;
            text
        } else {
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SnapError::io(format!("reading {}", path.display()), e))?
        };
        Ok(Self::parse(&text))
    }

    /// Parse listing text
    pub fn parse(text: &str) -> Self {
        let mut authors = StaticAuthors::default();
        let mut members = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ListingLine>(line) {
                Ok(ListingLine { member, author }) => {
                    if let (
                        MemberDescriptor::File { id, revision, .. },
                        Some(author),
                    ) = (&member, author)
                    {
                        authors.insert(id.as_str(), revision.as_str(), author);
                    }
                    members.push(Ok(member));
                }
                Err(e) => members.push(Err(SnapError::Member {
                    line: idx + 1,
                    reason: e.to_string(),
                })),
            }
        }

        debug!(
            "Parsed {} listing entries, {} with authors",
            members.len(),
            authors.len()
        );
        Self { members, authors }
    }
}

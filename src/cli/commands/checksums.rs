//! Checksums command - hash workspace files into a snapshot

use crate::cli::args::ChecksumArgs;
use crate::cli::{open_store, resolve_cache};
use crate::config::Config;
use crate::error::{SnapError, SnapResult};
use crate::registry::Registry;
use crate::snapshot::{MemberRecord, SnapshotStore};
use crate::ui::{self, UiContext};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Execute the checksums command
pub async fn execute(args: ChecksumArgs, config: &Config) -> SnapResult<()> {
    let ctx = UiContext::detect();
    if !args.workspace.is_dir() {
        return Err(SnapError::User(format!(
            "Workspace {} is not a directory",
            args.workspace.display()
        )));
    }

    let db = open_store(config).await?;
    let cache = resolve_cache(&Registry::new(db.clone()), &args.selector)?;
    let store = SnapshotStore::new(db);

    let members = store.checksum_view(&cache)?;
    let checksums = hash_members(&args.workspace, &members).await?;
    let updated = store.refresh_checksums(&cache, &checksums)?;

    ui::step_ok_detail(
        &ctx,
        &format!("Updated {updated} checksum(s)"),
        &format!("{} of {} members found", checksums.len(), members.len()),
    );
    Ok(())
}

/// SHA-256 of every member present in the workspace, keyed by member name
async fn hash_members(
    workspace: &Path,
    members: &[MemberRecord],
) -> SnapResult<HashMap<String, String>> {
    let mut checksums = HashMap::new();
    for member in members {
        let Some(relative) = member.relative_path.as_deref() else {
            continue;
        };
        let path = workspace.join(relative.trim_start_matches('/'));
        match tokio::fs::read(&path).await {
            Ok(content) => {
                checksums.insert(member.name.clone(), sha256_hex(&content));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not in workspace", path.display());
            }
            Err(e) => return Err(SnapError::io(format!("reading {}", path.display()), e)),
        }
    }
    Ok(checksums)
}

fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

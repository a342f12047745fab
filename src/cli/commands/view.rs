//! View, lookup and jobs commands - read recorded snapshots

use crate::cli::args::{JobsArgs, LookupArgs, OutputFormat, ViewArgs, ViewKind};
use crate::cli::{open_store, resolve_cache};
use crate::config::Config;
use crate::error::{SnapError, SnapResult};
use crate::registry::{Registry, RegistryEntry};
use crate::snapshot::{DeltaState, MemberRecord, SnapshotStore};
use console::style;

/// Execute the view command
pub async fn execute(args: ViewArgs, config: &Config) -> SnapResult<()> {
    let db = open_store(config).await?;
    let cache = resolve_cache(&Registry::new(db.clone()), &args.selector)?;
    let store = SnapshotStore::new(db);

    let members = match args.show {
        ViewKind::Files => store.view_project(&cache)?,
        ViewKind::Subprojects => store.view_subprojects(&cache)?,
        ViewKind::Changes => store.view_changes(&cache)?,
        ViewKind::Dirs => {
            let dirs = store.dir_list(&cache)?;
            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&dirs)?),
                _ => dirs.iter().for_each(|d| println!("{d}")),
            }
            return Ok(());
        }
    };

    match args.format {
        OutputFormat::Table => print_member_table(&members),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&members)?),
        OutputFormat::Plain => members.iter().for_each(|m| println!("{}", m.name)),
    }
    Ok(())
}

/// Execute the lookup command
pub async fn lookup(args: LookupArgs, config: &Config) -> SnapResult<()> {
    let db = open_store(config).await?;
    let registry = Registry::new(db);
    match registry.lookup(&args.key.job, &args.key.configuration, args.build)? {
        Some(cache) => {
            println!("{cache}");
            Ok(())
        }
        None => Err(SnapError::User(format!(
            "No cache registered for {}/{} build {}",
            args.key.job, args.key.configuration, args.build
        ))),
    }
}

/// Execute the jobs command
pub async fn jobs(args: JobsArgs, config: &Config) -> SnapResult<()> {
    let db = open_store(config).await?;
    let registry = Registry::new(db);

    let entries = match &args.job {
        Some(job) => registry.entries_for_job(job)?,
        None => registry.all_entries()?,
    };

    match args.format {
        OutputFormat::Table => print_entry_table(&entries),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Plain => {
            for job in registry.distinct_jobs()? {
                if args.job.as_ref().is_none_or(|j| *j == job) {
                    println!("{job}");
                }
            }
        }
    }
    Ok(())
}

fn print_member_table(members: &[MemberRecord]) {
    if members.is_empty() {
        println!("No members.");
        return;
    }

    println!(
        "{:<50} {:<10} {:<10} {:<16} {:<10}",
        "NAME", "REVISION", "PREVIOUS", "AUTHOR", "DELTA"
    );
    println!("{}", "-".repeat(100));

    for member in members {
        let delta = match member.delta {
            DeltaState::Added => style("added").green().to_string(),
            DeltaState::Changed => style("changed").yellow().to_string(),
            DeltaState::Dropped => style("dropped").red().to_string(),
            other => style(other.to_string()).dim().to_string(),
        };
        println!(
            "{:<50} {:<10} {:<10} {:<16} {:<10}",
            member.name,
            member.revision_str(),
            member.old_revision.as_deref().unwrap_or("-"),
            member.author.as_deref().unwrap_or("-"),
            delta
        );
    }

    println!();
    println!("Total: {} member(s)", members.len());
}

fn print_entry_table(entries: &[RegistryEntry]) {
    if entries.is_empty() {
        println!("No caches registered.");
        return;
    }

    println!(
        "{:<24} {:<16} {:<8} {:<42} {:<20}",
        "JOB", "CONFIGURATION", "BUILD", "CACHE", "CREATED"
    );
    println!("{}", "-".repeat(112));

    for entry in entries {
        println!(
            "{:<24} {:<16} {:<8} {:<42} {:<20}",
            entry.job_name,
            entry.configuration_name,
            entry.build_number,
            entry.cache_id,
            entry.created_at.format("%Y-%m-%d %H:%M").to_string()
        );
    }

    println!();
    println!("Total: {} cache(s)", entries.len());
}

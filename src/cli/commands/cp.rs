//! Cp command - manage a project's change-package cache

use crate::change_package::{ChangePackageCache, CpTableName};
use crate::cli::args::{CpAction, CpArgs, OutputFormat};
use crate::cli::open_store;
use crate::config::Config;
use crate::error::SnapResult;
use crate::ui::{self, UiContext};

/// Execute the cp command
pub async fn execute(args: CpArgs, config: &Config) -> SnapResult<()> {
    let ctx = UiContext::detect();
    let table = CpTableName::parse(&args.table)?;
    let db = open_store(config).await?;
    let cache = ChangePackageCache::new(db);
    cache.ensure_table(&table)?;

    match args.action {
        CpAction::Add { id, state } => {
            cache.add(&table, &id, &state)?;
            ui::step_ok(&ctx, &format!("Cached change package {id} ({state})"));
        }
        CpAction::Delete { id } => {
            let removed = cache.delete(&table, &id)?;
            if removed == 0 {
                ui::step_warn(&ctx, &format!("Change package {id} was not cached"));
            } else {
                ui::step_ok(&ctx, &format!("Removed change package {id}"));
            }
        }
        CpAction::List { format } => {
            let records = cache.records(&table)?;
            match format {
                OutputFormat::Table => {
                    if records.is_empty() {
                        println!("No change packages cached.");
                    } else {
                        println!("{:<24} {:<16}", "ID", "STATE");
                        println!("{}", "-".repeat(40));
                        for record in &records {
                            println!("{:<24} {:<16}", record.id, record.state);
                        }
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
                OutputFormat::Plain => {
                    for id in cache.ids(&table)? {
                        println!("{id}");
                    }
                }
            }
        }
    }

    Ok(())
}

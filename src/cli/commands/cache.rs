//! Cache command - retire old snapshots

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::cli::open_store;
use crate::config::Config;
use crate::error::SnapResult;
use crate::maintenance::{Maintenance, MaintenanceReport};
use crate::registry::Registry;
use crate::snapshot::SnapshotStore;
use crate::ui::{self, UiContext};
use std::collections::BTreeSet;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> SnapResult<()> {
    let ctx = UiContext::detect();
    let db = open_store(config).await?;
    let maintenance = Maintenance::new(Registry::new(db.clone()), SnapshotStore::new(db));
    let audit = AuditLog::new(config);

    match args.action {
        CacheAction::Gc { job, build } => {
            let report = maintenance.retain_latest(&job, build)?;
            audit
                .record(&AuditEvent::Retained {
                    job: &job,
                    build_number: build,
                    report: &report,
                })
                .await;
            print_report(&ctx, &report);
        }
        CacheAction::Purge { job, yes } => {
            let ctx = ctx.with_auto_yes(yes);
            let prompt = format!("Remove every cache of job '{job}'?");
            if !ui::confirm(&ctx, &prompt, false).await? {
                ui::step_info(&ctx, "Cancelled");
                return Ok(());
            }
            let report = maintenance.purge_job(&job)?;
            audit
                .record(&AuditEvent::Purged {
                    job: &job,
                    report: &report,
                })
                .await;
            print_report(&ctx, &report);
        }
        CacheAction::Sweep { active } => {
            if !config.retention.purge_removed_jobs {
                ui::step_warn_hint(
                    &ctx,
                    "Purging removed jobs is disabled",
                    "Set retention.purge_removed_jobs = true",
                );
                return Ok(());
            }
            let active: BTreeSet<String> = active.into_iter().collect();
            let report = maintenance.sweep_removed_jobs(&active)?;
            print_report(&ctx, &report);
        }
        CacheAction::Orphans => {
            let report = maintenance.sweep_orphans()?;
            print_report(&ctx, &report);
        }
    }

    Ok(())
}

fn print_report(ctx: &UiContext, report: &MaintenanceReport) {
    if report.dropped == 0 && report.entries_removed == 0 && report.drop_failures == 0 {
        ui::step_ok(ctx, "Nothing to remove");
        return;
    }
    ui::step_ok(
        ctx,
        &format!(
            "Dropped {} snapshot(s), removed {} registry entr{}",
            report.dropped,
            report.entries_removed,
            if report.entries_removed == 1 { "y" } else { "ies" }
        ),
    );
    if report.drop_failures > 0 {
        ui::step_warn_hint(
            ctx,
            &format!("{} snapshot(s) could not be dropped", report.drop_failures),
            "Run: snapdelta cache orphans",
        );
    }
}

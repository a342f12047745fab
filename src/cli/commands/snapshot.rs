//! Snapshot and poll commands - record a build's member listing

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::{OutputFormat, PollArgs, SnapshotArgs, SourceArgs};
use crate::cli::listing::Listing;
use crate::cli::open_store;
use crate::config::Config;
use crate::delta::PollOutcome;
use crate::error::SnapResult;
use crate::snapshot::ProjectScope;
use crate::ui::{self, UiContext};
use crate::workflow::{BuildRequest, BuildSummary, Workflow};

/// Execute the snapshot command
pub async fn execute(args: SnapshotArgs, config: &Config) -> SnapResult<()> {
    let listing = Listing::load(&args.source.members).await?;
    let db = open_store(config).await?;
    let workflow = Workflow::new(db, config);

    let request = BuildRequest {
        job: args.key.job.clone(),
        configuration: args.key.configuration.clone(),
        build_number: args.build,
        scope: scope(&args.source),
    };
    let summary = workflow.run_build(&request, listing.members, &listing.authors)?;

    let audit = AuditLog::new(config);
    audit
        .record(&AuditEvent::Registered {
            job: &request.job,
            configuration: &request.configuration,
            build_number: request.build_number,
            cache_id: &summary.cache_id,
        })
        .await;
    audit
        .record(&AuditEvent::Compared {
            cache_id: &summary.cache_id,
            baseline: summary.baseline.as_ref(),
            report: &summary.delta,
        })
        .await;
    if let Some(report) = &summary.retention {
        audit
            .record(&AuditEvent::Retained {
                job: &request.job,
                build_number: request.build_number,
                report,
            })
            .await;
    }

    print_summary(&summary, args.format)
}

/// Execute the poll command
pub async fn poll(args: PollArgs, config: &Config) -> SnapResult<()> {
    let listing = Listing::load(&args.source.members).await?;
    let db = open_store(config).await?;
    let workflow = Workflow::new(db, config);

    let summary = workflow.poll(
        &args.key.job,
        &args.key.configuration,
        &scope(&args.source),
        listing.members,
    )?;

    print_summary(&summary, args.format)
}

fn scope(source: &SourceArgs) -> ProjectScope {
    ProjectScope::new(source.project.clone(), source.config_path.clone())
}

fn print_summary(summary: &BuildSummary, format: OutputFormat) -> SnapResult<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Plain => {
            println!("{} {}", summary.cache_id, summary.change_count());
        }
        OutputFormat::Table => {
            let ctx = UiContext::detect();
            ui::key_value(&ctx, "Cache", summary.cache_id.as_str());
            ui::key_value(
                &ctx,
                "Baseline",
                summary
                    .baseline
                    .as_ref()
                    .map(|c| c.as_str())
                    .unwrap_or("(none)"),
            );
            ui::key_value(
                &ctx,
                "Members",
                &format!(
                    "{} files, {} subprojects",
                    summary.populate.files, summary.populate.directories
                ),
            );
            let skipped = summary.populate.skipped_pending
                + summary.populate.skipped_outside_root
                + summary.populate.skipped_duplicate;
            if skipped > 0 {
                ui::step_warn(&ctx, &format!("{skipped} entries skipped"));
            }
            ui::key_value(
                &ctx,
                "Delta",
                &format!(
                    "{} added, {} changed, {} dropped, {} unchanged",
                    summary.delta.added,
                    summary.delta.changed,
                    summary.delta.dropped,
                    summary.delta.unchanged
                ),
            );
            if summary.backfilled > 0 {
                ui::key_value(&ctx, "Authors backfilled", &summary.backfilled.to_string());
            }
            if let Some(report) = &summary.retention {
                if report.entries_removed > 0 {
                    ui::step_info(
                        &ctx,
                        &format!("Retired {} older caches", report.entries_removed),
                    );
                }
            }
            match summary.outcome {
                PollOutcome::NoChanges => ui::step_ok(&ctx, "No changes"),
                outcome => ui::step_ok(&ctx, &outcome.to_string()),
            }
        }
    }
    Ok(())
}

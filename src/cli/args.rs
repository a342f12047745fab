//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// snapdelta - build snapshot cache and change detection
///
/// Records the member listing of a source-control project for every build
/// and reports what changed since the previous one.
#[derive(Parser, Debug)]
#[command(name = "snapdelta")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "SNAPDELTA_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a build and compare it against the previous one
    Snapshot(SnapshotArgs),

    /// Check whether anything changed since the last build
    Poll(PollArgs),

    /// Show the members of a recorded snapshot
    View(ViewArgs),

    /// Print the cache identifier of a build
    Lookup(LookupArgs),

    /// List registered jobs and their caches
    Jobs(JobsArgs),

    /// Retire old caches
    Cache(CacheArgs),

    /// Refresh checksums of a snapshot from a workspace
    Checksums(ChecksumArgs),

    /// Manage the change-package cache of a project
    Cp(CpArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Which build of which job
#[derive(Args, Debug, Clone)]
pub struct BuildKey {
    /// Job name
    #[arg(short, long)]
    pub job: String,

    /// Configuration name
    #[arg(long = "configuration", default_value = "default")]
    pub configuration: String,
}

/// Project being captured and its member listing
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Canonical path of the project file (e.g. /repo/app/project.pj)
    #[arg(long)]
    pub project: String,

    /// Configuration path of the project
    #[arg(long)]
    pub config_path: String,

    /// JSON-lines member listing ("-" reads stdin)
    #[arg(short, long, default_value = "-")]
    pub members: PathBuf,
}

/// Arguments for the snapshot command
#[derive(Parser, Debug)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub key: BuildKey,

    /// Build number (must be positive)
    #[arg(short, long, value_parser = clap::value_parser!(i64).range(1..))]
    pub build: i64,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the poll command
#[derive(Parser, Debug)]
pub struct PollArgs {
    #[command(flatten)]
    pub key: BuildKey,

    #[command(flatten)]
    pub source: SourceArgs,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Which snapshot to act on: an explicit cache id or a build
#[derive(Args, Debug, Clone)]
pub struct CacheSelector {
    /// Cache identifier
    #[arg(long, conflicts_with_all = ["job", "build"])]
    pub cache: Option<String>,

    /// Job name
    #[arg(short, long, requires = "build")]
    pub job: Option<String>,

    /// Configuration name
    #[arg(long = "configuration", default_value = "default")]
    pub configuration: String,

    /// Build number
    #[arg(short, long, requires = "job")]
    pub build: Option<i64>,
}

/// Arguments for the view command
#[derive(Parser, Debug)]
pub struct ViewArgs {
    #[command(flatten)]
    pub selector: CacheSelector,

    /// Which view to show
    #[arg(long, value_enum, default_value = "files")]
    pub show: ViewKind,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Snapshot views
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ViewKind {
    /// Live files ordered by name
    Files,
    /// Subprojects ordered by configuration path
    Subprojects,
    /// Distinct subproject directories
    Dirs,
    /// Added, changed and dropped files
    Changes,
}

/// Arguments for the lookup command
#[derive(Parser, Debug)]
pub struct LookupArgs {
    #[command(flatten)]
    pub key: BuildKey,

    /// Build number
    #[arg(short, long)]
    pub build: i64,
}

/// Arguments for the jobs command
#[derive(Parser, Debug)]
pub struct JobsArgs {
    /// Only show this job's caches
    #[arg(short, long)]
    pub job: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache maintenance actions
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Keep only the given build of a job
    Gc {
        /// Job name
        #[arg(short, long)]
        job: String,

        /// Build to keep
        #[arg(short, long)]
        build: i64,
    },

    /// Remove every cache of a job
    Purge {
        /// Job name
        #[arg(short, long)]
        job: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Purge jobs that are not in the active list
    Sweep {
        /// Jobs that still exist (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        active: Vec<String>,
    },

    /// Drop snapshots no registry entry refers to
    Orphans,
}

/// Arguments for the checksums command
#[derive(Parser, Debug)]
pub struct ChecksumArgs {
    #[command(flatten)]
    pub selector: CacheSelector,

    /// Workspace holding the checked-out members
    #[arg(short, long)]
    pub workspace: PathBuf,
}

/// Arguments for the cp command
#[derive(Parser, Debug)]
pub struct CpArgs {
    /// Change-package table of the project
    #[arg(short, long)]
    pub table: String,

    #[command(subcommand)]
    pub action: CpAction,
}

/// Change-package actions
#[derive(Subcommand, Debug)]
pub enum CpAction {
    /// Record an open change package
    Add {
        /// Change package id
        id: String,

        /// Change package state
        #[arg(short, long, default_value = "Open")]
        state: String,
    },

    /// Forget a change package
    Delete {
        /// Change package id
        id: String,
    },

    /// List cached change packages
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn snapshot_rejects_polling_build() {
        let result = Cli::try_parse_from([
            "snapdelta",
            "snapshot",
            "--job",
            "j",
            "--build",
            "0",
            "--project",
            "/p/project.pj",
            "--config-path",
            "#/p",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn view_accepts_cache_or_build() {
        let cli = Cli::try_parse_from(["snapdelta", "view", "--job", "j", "--build", "3"]).unwrap();
        match cli.command {
            Commands::View(args) => {
                assert_eq!(args.selector.build, Some(3));
                assert_eq!(args.selector.configuration, "default");
                assert_eq!(args.show, ViewKind::Files);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn sweep_splits_active_jobs() {
        let cli =
            Cli::try_parse_from(["snapdelta", "cache", "sweep", "--active", "a,b"]).unwrap();
        match cli.command {
            Commands::Cache(CacheArgs {
                action: CacheAction::Sweep { active },
            }) => assert_eq!(active, vec!["a", "b"]),
            other => panic!("unexpected command {other:?}"),
        }
    }
}

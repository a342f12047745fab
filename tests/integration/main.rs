//! Integration tests for snapdelta

use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PROJECT: &str = "/repo/app/project.pj";
const CONFIG_PATH: &str = "#/repo/app";

/// A scratch store with a config pointing at it
struct Fixture {
    dir: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        Self::with_settings("")
    }

    fn with_settings(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("config.toml");
        let db = dir.path().join("cache.db");
        std::fs::write(
            &config,
            format!(
                "[general]\naudit_log = false\n\n[store]\npath = '{}'\n\n{}",
                db.display(),
                extra
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.path().join("cache.db")
    }

    /// Write a listing of `(id, revision)` files below the project root
    fn listing(&self, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut lines = vec![format!(
            r##"{{"kind":"directory","name":"/repo/app/lib/project.pj","id":"#/repo/app#lib"}}"##
        )];
        for (id, revision) in files {
            lines.push(format!(
                r#"{{"kind":"file","name":"/repo/app/{id}","id":"{id}","parent":"{PROJECT}","revision":"{revision}","author":"alice"}}"#
            ));
        }
        std::fs::write(&path, lines.join("\n")).unwrap();
        path
    }
}

fn write_listing(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

mod cli_tests {
    use super::*;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn snapdelta(fixture: &Fixture) -> Command {
        let mut cmd = cargo_bin_cmd!("snapdelta");
        cmd.env("SNAPDELTA_CONFIG", &fixture.config)
            .env_remove("RUST_LOG");
        cmd
    }

    fn snapshot(fixture: &Fixture, build: &str, listing: &Path) -> Command {
        let mut cmd = snapdelta(fixture);
        cmd.args([
            "snapshot",
            "--job",
            "nightly",
            "--build",
            build,
            "--project",
            PROJECT,
            "--config-path",
            CONFIG_PATH,
            "--format",
            "json",
            "--members",
        ])
        .arg(listing);
        cmd
    }

    fn summary(output: &[u8]) -> serde_json::Value {
        serde_json::from_slice(output).unwrap()
    }

    #[test]
    fn help_displays() {
        let fixture = Fixture::new();
        snapdelta(&fixture)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("snapshot cache"));
    }

    #[test]
    fn version_displays() {
        let fixture = Fixture::new();
        snapdelta(&fixture)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("snapdelta"));
    }

    #[test]
    fn config_show_reads_custom_file() {
        let fixture = Fixture::new();
        snapdelta(&fixture)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[store]"))
            .stdout(predicate::str::contains("cache.db"))
            .stdout(predicate::str::contains("audit_log = false"));
    }

    #[test]
    fn config_path_lists_config_and_store() {
        let fixture = Fixture::new();
        snapdelta(&fixture)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"))
            .stdout(predicate::str::contains("cache.db"));
    }

    #[test]
    fn invalid_config_reports_path() {
        let fixture = Fixture::new();
        std::fs::write(&fixture.config, "[store\n").unwrap();
        snapdelta(&fixture)
            .args(["jobs"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn first_build_adds_every_file() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b1.jsonl", &[("a.c", "1.1"), ("b.c", "1.1")]);

        let output = snapshot(&fixture, "1", &listing).assert().success();
        let summary = summary(&output.get_output().stdout);

        assert_eq!(summary["delta"]["added"], 2);
        assert_eq!(summary["outcome"], "build_now");
        assert!(summary["baseline"].is_null());
        assert!(fixture.db_path().exists());
    }

    #[test]
    fn second_build_reports_delta() {
        let fixture = Fixture::with_settings("[retention]\nenabled = false\n");
        let first = fixture.listing(
            "b1.jsonl",
            &[("a.c", "1.1"), ("b.c", "1.1"), ("c.c", "1.1")],
        );
        let second = fixture.listing(
            "b2.jsonl",
            &[("a.c", "1.2"), ("b.c", "1.1"), ("d.c", "1.1")],
        );

        let output = snapshot(&fixture, "1", &first).assert().success();
        let baseline = summary(&output.get_output().stdout)["cache_id"].clone();

        let output = snapshot(&fixture, "2", &second).assert().success();
        let summary = summary(&output.get_output().stdout);
        assert_eq!(summary["baseline"], baseline);
        assert_eq!(summary["delta"]["added"], 1);
        assert_eq!(summary["delta"]["changed"], 1);
        assert_eq!(summary["delta"]["dropped"], 1);
        assert_eq!(summary["delta"]["unchanged"], 1);
        assert_eq!(summary["outcome"], "significant");

        snapdelta(&fixture)
            .args([
                "view", "--job", "nightly", "--build", "2", "--show", "changes", "--format",
                "plain",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("/repo/app/a.c"))
            .stdout(predicate::str::contains("/repo/app/c.c"))
            .stdout(predicate::str::contains("/repo/app/d.c"))
            .stdout(predicate::str::contains("/repo/app/b.c").not());
    }

    #[test]
    fn changes_view_carries_previous_revision() {
        let fixture = Fixture::with_settings("[retention]\nenabled = false\n");
        let first = fixture.listing("b1.jsonl", &[("a.c", "1.1")]);
        let second = fixture.listing("b2.jsonl", &[("a.c", "1.2")]);
        snapshot(&fixture, "1", &first).assert().success();
        snapshot(&fixture, "2", &second).assert().success();

        let output = snapdelta(&fixture)
            .args([
                "view", "--job", "nightly", "--build", "2", "--show", "changes", "--format",
                "json",
            ])
            .assert()
            .success();
        let members: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
        assert_eq!(members[0]["delta"], "changed");
        assert_eq!(members[0]["old_revision"], "1.1");
        assert_eq!(members[0]["author"], "alice");
    }

    #[test]
    fn subprojects_and_dirs_views() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b1.jsonl", &[("a.c", "1.1")]);
        snapshot(&fixture, "1", &listing).assert().success();

        snapdelta(&fixture)
            .args([
                "view", "--job", "nightly", "--build", "1", "--show", "subprojects", "--format",
                "plain",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("/repo/app/lib/project.pj"));

        snapdelta(&fixture)
            .args(["view", "--job", "nightly", "--build", "1", "--show", "dirs"])
            .assert()
            .success()
            .stdout(predicate::str::contains("/lib"));
    }

    #[test]
    fn pending_entries_are_skipped() {
        let fixture = Fixture::new();
        let listing = fixture.dir.path().join("pending.jsonl");
        write_listing(
            &listing,
            &format!(
                "{}\n{}",
                format_args!(
                    r#"{{"kind":"file","name":"/repo/app/a.c","id":"a.c","parent":"{PROJECT}","revision":"1.1"}}"#
                ),
                format_args!(
                    r#"{{"kind":"file","name":"/repo/app/new.c","id":"new.c","parent":"{PROJECT}","revision":"1.1","type":"pending-add"}}"#
                ),
            ),
        );

        let output = snapshot(&fixture, "1", &listing).assert().success();
        let summary = summary(&output.get_output().stdout);
        assert_eq!(summary["populate"]["files"], 1);
        assert_eq!(summary["populate"]["skipped_pending"], 1);
    }

    #[test]
    fn malformed_listing_fails() {
        let fixture = Fixture::new();
        let listing = fixture.dir.path().join("bad.jsonl");
        write_listing(&listing, "{\"kind\":\"file\"}\n");

        snapshot(&fixture, "1", &listing)
            .assert()
            .failure()
            .stderr(predicate::str::contains("line 1"));
    }

    #[test]
    fn polling_build_is_rejected_by_snapshot() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b0.jsonl", &[("a.c", "1.1")]);
        snapshot(&fixture, "0", &listing).assert().failure();
    }

    #[test]
    fn lookup_and_retention() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b.jsonl", &[("a.c", "1.1")]);
        snapshot(&fixture, "1", &listing).assert().success();
        let output = snapshot(&fixture, "2", &listing).assert().success();
        let cache = summary(&output.get_output().stdout)["cache_id"]
            .as_str()
            .unwrap()
            .to_string();

        snapdelta(&fixture)
            .args(["lookup", "--job", "nightly", "--build", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains(cache.as_str()));

        // build 1 was retired after build 2 was recorded
        snapdelta(&fixture)
            .args(["lookup", "--job", "nightly", "--build", "1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No cache registered"));
    }

    #[test]
    fn jobs_lists_registered_jobs() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b.jsonl", &[("a.c", "1.1")]);
        snapshot(&fixture, "1", &listing).assert().success();

        snapdelta(&fixture)
            .args(["jobs", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nightly"));

        snapdelta(&fixture)
            .args(["jobs"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Total: 1 cache(s)"));
    }

    #[test]
    fn poll_outcomes() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b.jsonl", &[("a.c", "1.1")]);
        let changed = fixture.listing("c.jsonl", &[("a.c", "1.2")]);

        let poll = |listing: &Path| {
            let mut cmd = snapdelta(&fixture);
            cmd.args([
                "poll",
                "--job",
                "nightly",
                "--project",
                PROJECT,
                "--config-path",
                CONFIG_PATH,
                "--format",
                "json",
                "--members",
            ])
            .arg(listing);
            cmd
        };

        let output = poll(&listing).assert().success();
        assert_eq!(summary(&output.get_output().stdout)["outcome"], "build_now");

        snapshot(&fixture, "1", &listing).assert().success();

        let output = poll(&listing).assert().success();
        assert_eq!(summary(&output.get_output().stdout)["outcome"], "no_changes");

        let output = poll(&changed).assert().success();
        let summary = summary(&output.get_output().stdout);
        assert_eq!(summary["outcome"], "significant");
        assert_eq!(summary["delta"]["changed"], 1);
    }

    #[test]
    fn invalid_cache_id_is_rejected() {
        let fixture = Fixture::new();
        snapdelta(&fixture)
            .args(["view", "--cache", "SCM_not-a-uuid"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid cache identifier"));
    }

    #[test]
    fn unknown_cache_reports_missing_snapshot() {
        let fixture = Fixture::new();
        snapdelta(&fixture)
            .args(["view", "--cache", "SCM_00000000_0000_4000_8000_000000000000"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Snapshot not found"));
    }

    #[test]
    fn change_package_lifecycle() {
        let fixture = Fixture::new();

        snapdelta(&fixture)
            .args(["cp", "--table", "app_cp", "add", "1234:1"])
            .assert()
            .success();
        snapdelta(&fixture)
            .args(["cp", "--table", "app_cp", "add", "1234:2", "--state", "Submitted"])
            .assert()
            .success();

        snapdelta(&fixture)
            .args(["cp", "--table", "app_cp", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1234:1"))
            .stdout(predicate::str::contains("1234:2"));

        snapdelta(&fixture)
            .args(["cp", "--table", "app_cp", "delete", "1234:1"])
            .assert()
            .success();

        snapdelta(&fixture)
            .args(["cp", "--table", "app_cp", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("1234:1").not())
            .stdout(predicate::str::contains("1234:2"));
    }

    #[test]
    fn change_package_table_name_is_validated() {
        let fixture = Fixture::new();
        snapdelta(&fixture)
            .args(["cp", "--table", "app;drop", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid change-package table name"));
    }

    #[test]
    fn cache_gc_and_orphans() {
        let fixture = Fixture::with_settings("[retention]\nenabled = false\n");
        let listing = fixture.listing("b.jsonl", &[("a.c", "1.1")]);
        for build in ["1", "2", "3"] {
            snapshot(&fixture, build, &listing).assert().success();
        }

        snapdelta(&fixture)
            .args(["cache", "gc", "--job", "nightly", "--build", "3"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dropped 2 snapshot(s)"));

        snapdelta(&fixture)
            .args(["cache", "orphans"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to remove"));

        snapdelta(&fixture)
            .args(["lookup", "--job", "nightly", "--build", "3"])
            .assert()
            .success();
    }

    #[test]
    fn cache_purge_and_sweep() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b.jsonl", &[("a.c", "1.1")]);
        snapshot(&fixture, "1", &listing).assert().success();

        snapdelta(&fixture)
            .args(["cache", "sweep", "--active", "nightly"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to remove"));

        snapdelta(&fixture)
            .args(["cache", "purge", "--job", "nightly", "--yes"])
            .assert()
            .success();

        snapdelta(&fixture)
            .args(["jobs", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nightly").not());
    }

    #[test]
    fn checksums_are_refreshed_from_workspace() {
        let fixture = Fixture::new();
        let listing = fixture.listing("b.jsonl", &[("a.c", "1.1"), ("b.c", "1.1")]);
        snapshot(&fixture, "1", &listing).assert().success();

        let workspace = fixture.dir.path().join("ws");
        std::fs::create_dir_all(&workspace).unwrap();
        std::fs::write(workspace.join("a.c"), b"abc").unwrap();

        snapdelta(&fixture)
            .args(["checksums", "--job", "nightly", "--build", "1", "--workspace"])
            .arg(&workspace)
            .assert()
            .success()
            .stdout(predicate::str::contains("Updated 1 checksum(s)"));
    }
}

mod library_tests {
    use super::*;
    use snapdelta::config::Config;
    use snapdelta::delta::StaticAuthors;
    use snapdelta::registry::Registry;
    use snapdelta::snapshot::{DeltaState, MemberDescriptor, ProjectScope};
    use snapdelta::store::{Database, PoolOptions};
    use snapdelta::workflow::{BuildRequest, Workflow};
    use snapdelta::SnapResult;

    fn open(fixture: &Fixture) -> Database {
        let db = Database::open(&fixture.db_path(), PoolOptions::default()).unwrap();
        snapdelta::bootstrap(&db).unwrap();
        db
    }

    fn request(build_number: i64) -> BuildRequest {
        BuildRequest {
            job: "lib".into(),
            configuration: "default".into(),
            build_number,
            scope: ProjectScope::new(PROJECT, CONFIG_PATH),
        }
    }

    fn files(entries: &[(&str, &str)]) -> Vec<SnapResult<MemberDescriptor>> {
        entries
            .iter()
            .map(|(id, revision)| {
                Ok(MemberDescriptor::File {
                    name: format!("/repo/app/{id}"),
                    id: id.to_string(),
                    parent: PROJECT.into(),
                    revision: revision.to_string(),
                    description: Some("edit".into()),
                    timestamp: None,
                    entry_type: None,
                })
            })
            .collect()
    }

    #[test]
    fn registration_is_idempotent_across_connections() {
        let fixture = Fixture::new();
        let first = Registry::new(open(&fixture)).register("lib", "default", 7).unwrap();
        let second = Registry::new(open(&fixture)).register("lib", "default", 7).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unchanged_build_keeps_metadata() {
        let fixture = Fixture::new();
        let mut config = Config::default();
        config.retention.enabled = false;
        let workflow = Workflow::new(open(&fixture), &config);
        let mut authors = StaticAuthors::default();
        authors.insert("a.c", "1.1", "alice");

        workflow
            .run_build(&request(1), files(&[("a.c", "1.1")]), &authors)
            .unwrap();
        let summary = workflow
            .run_build(&request(2), files(&[("a.c", "1.1")]), &StaticAuthors::default())
            .unwrap();

        assert_eq!(summary.delta.unchanged, 1);
        assert_eq!(summary.change_count(), 0);
        let members = workflow.snapshots().view_project(&summary.cache_id).unwrap();
        assert_eq!(members[0].delta, DeltaState::Unchanged);
        assert_eq!(members[0].author.as_deref(), Some("alice"));
    }

    #[test]
    fn emptied_project_drops_everything() {
        let fixture = Fixture::new();
        let mut config = Config::default();
        config.retention.enabled = false;
        let workflow = Workflow::new(open(&fixture), &config);

        workflow
            .run_build(
                &request(1),
                files(&[("a.c", "1.1"), ("b.c", "1.1")]),
                &StaticAuthors::default(),
            )
            .unwrap();
        let summary = workflow
            .run_build(&request(2), Vec::new(), &StaticAuthors::default())
            .unwrap();

        assert_eq!(summary.delta.dropped, 2);
        let changes = workflow.snapshots().view_changes(&summary.cache_id).unwrap();
        assert!(changes.iter().all(|m| m.delta == DeltaState::Dropped));
        assert!(workflow
            .snapshots()
            .view_project(&summary.cache_id)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn retention_keeps_latest_build_only() {
        let fixture = Fixture::new();
        let workflow = Workflow::new(open(&fixture), &Config::default());

        for build in 1..=3 {
            workflow
                .run_build(&request(build), files(&[("a.c", "1.1")]), &StaticAuthors::default())
                .unwrap();
        }

        let builds: Vec<i64> = workflow
            .registry()
            .entries_for_job("lib")
            .unwrap()
            .iter()
            .map(|e| e.build_number)
            .collect();
        assert_eq!(builds, vec![3]);
        assert_eq!(workflow.snapshots().list_snapshots().unwrap().len(), 1);
    }
}

//! Backup/Restore Behavior Tests
//!
//! End-to-end runs of both orchestrators against real directories and a
//! scripted database client:
//! - Archive contents follow the backup mode
//! - Backup then restore reproduces the site tree byte for byte, including
//!   read-only directories and with the archive written inside the site
//! - Config rewrites only touch keys that were given
//! - Dry-run has no side effects
//! - Existing databases and directories are never wiped unless asked
//! - Tool failures are classified and leave no archive behind

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sitevault::archive::{classify_member, ArchiveReader, MemberKind};
use sitevault::observability::MemoryReporter;
use sitevault::process::{CommandOutput, CommandRunner, Invocation, ProcessError, SystemRunner};
use sitevault::settings::Settings;
use sitevault::site::config::{ConfigStore, WpConfigFile};
use sitevault::{
    BackupJob, BackupMode, Credentials, DatabaseOutcome, RestoreJob, RestoreMode, RestoreStep,
    SiteDescriptor, VaultError,
};
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

const DUMP: &str = "DROP TABLE IF EXISTS `wp_posts`;\nCREATE TABLE `wp_posts` (`ID` bigint);\n";

const CONFIG: &str = "<?php\n\
/** The name of the database for WordPress */\n\
define( 'DB_NAME', 'wordpress' );\n\
define( 'DB_USER', 'wp' );\n\
define( 'DB_PASSWORD', 'wp-secret' );\n\
define( 'DB_HOST', 'localhost:3306' );\n\
define( 'WP_HOME', 'https://www.example.com' );\n\
define( 'WP_SITEURL', 'https://www.example.com' );\n\
$table_prefix = 'wp_';\n\
/* That's all, stop editing! Happy publishing. */\n\
require_once ABSPATH . 'wp-settings.php';\n";

/// Stands in for both `mysqldump` and `mysql`
#[derive(Default)]
struct FakeDatabase {
    existing: Vec<String>,
    calls: RefCell<Vec<Invocation>>,
    applied: RefCell<Vec<String>>,
}

impl FakeDatabase {
    fn with_existing(name: &str) -> Self {
        Self {
            existing: vec![name.to_string()],
            ..Self::default()
        }
    }

    fn statements(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.program() == "mysql")
            .filter_map(|c| c.args().last().cloned())
            .collect()
    }
}

impl CommandRunner for FakeDatabase {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
        self.calls.borrow_mut().push(invocation.clone());

        let ok = |stdout: Vec<u8>| {
            Ok(CommandOutput {
                status: Some(0),
                stdout,
                stderr: Vec::new(),
            })
        };

        if invocation.program() == "mysqldump" {
            return ok(DUMP.as_bytes().to_vec());
        }

        let sql = invocation.args().last().cloned().unwrap_or_default();
        if let Some(pattern) = sql.strip_prefix("SHOW DATABASES LIKE '") {
            let name = pattern.trim_end_matches('\'').replace("\\_", "_");
            if self.existing.contains(&name) {
                return ok(format!("{}\n", name).into_bytes());
            }
        } else if let Some(script) = sql.strip_prefix("source ") {
            let script = script.trim_end_matches(';');
            self.applied
                .borrow_mut()
                .push(fs::read_to_string(script).unwrap());
        }

        ok(Vec::new())
    }
}

struct Env {
    temp: TempDir,
    settings: Settings,
}

impl Env {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let workspaces = temp.path().join("workspaces");
        fs::create_dir_all(&workspaces).unwrap();
        let settings = Settings {
            workspace_root: Some(workspaces),
            ..Settings::default()
        };
        Self { temp, settings }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    /// A small but realistic site tree
    fn make_site(&self, name: &str) -> SiteDescriptor {
        let root = self.path(name);
        fs::create_dir_all(root.join("wp-content/uploads/2024/01")).unwrap();
        fs::create_dir_all(root.join("wp-content/themes/twentytwenty")).unwrap();
        fs::create_dir_all(root.join("wp-content/empty")).unwrap();
        fs::write(root.join("wp-config.php"), CONFIG).unwrap();
        fs::write(root.join("index.php"), "<?php require 'wp-blog-header.php';").unwrap();
        fs::write(root.join("wp-content/themes/twentytwenty/style.css"), "body { margin: 0 }").unwrap();
        fs::write(
            root.join("wp-content/uploads/2024/01/photo.jpg"),
            (0u8..=255).cycle().take(4096).collect::<Vec<_>>(),
        )
        .unwrap();

        SiteDescriptor::from_site_path(&root, "wp-config.php").unwrap()
    }

    fn workspace_entries(&self) -> usize {
        fs::read_dir(self.settings.workspace_root()).unwrap().count()
    }
}

/// Relative path -> content for every file under `root`; directories map to None
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Option<Vec<u8>>>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            if path.is_dir() {
                out.insert(rel, None);
                walk(root, &path, out);
            } else {
                out.insert(rel, Some(fs::read(&path).unwrap()));
            }
        }
    }

    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn config_values(path: &Path) -> BTreeMap<&'static str, Option<String>> {
    let config = WpConfigFile::open(path).unwrap();
    ["DB_HOST", "DB_NAME", "DB_USER", "DB_PASSWORD", "WP_HOME", "WP_SITEURL"]
        .into_iter()
        .map(|key| (key, config.get(key)))
        .collect()
}

// =============================================================================
// Archive contents follow the mode
// =============================================================================

#[test]
fn test_archive_entries_match_backup_mode() {
    let env = Env::new();
    let site = env.make_site("html");

    let modes = [
        ("all", BackupMode::all(), true, true),
        ("files", BackupMode::files_only(), false, true),
        ("db", BackupMode::database_only(), true, false),
    ];

    for (label, mode, want_dump, want_files) in modes {
        let runner = FakeDatabase::default();
        let reporter = MemoryReporter::new();
        let archive = env.path(&format!("{}.tar.gz", label));

        BackupJob::new(&site, &env.settings, &runner, &reporter)
            .run(Some(&archive), &mode)
            .unwrap();

        let members = ArchiveReader::open(&archive).unwrap().members().unwrap();
        let has_dump = members
            .iter()
            .any(|m| classify_member(m) == MemberKind::Dump);
        let has_files = members
            .iter()
            .any(|m| matches!(classify_member(m), MemberKind::SiteEntry(_)));

        assert_eq!(has_dump, want_dump, "dump entry for mode {}", label);
        assert_eq!(has_files, want_files, "site entries for mode {}", label);
        assert_eq!(runner.calls.borrow().len(), usize::from(want_dump));
        assert!(members
            .iter()
            .all(|m| classify_member(m) != MemberKind::Foreign));
    }
}

// =============================================================================
// Round trip
// =============================================================================

#[test]
fn test_round_trip_restores_identical_tree() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");

    let runner = FakeDatabase::default();
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &runner, &reporter)
        .run(Some(&archive), &BackupMode::all())
        .unwrap();

    let target = SiteDescriptor::builder(env.path("restored")).build().unwrap();
    let restore_runner = FakeDatabase::default();
    let report = RestoreJob::new(&target, &env.settings, &restore_runner, &reporter)
        .run(
            &archive,
            &RestoreMode::all_overwrite(),
            Some(&Credentials::new("root", "root-pw")),
        )
        .unwrap();

    assert_eq!(snapshot(&env.path("html")), snapshot(&env.path("restored")));
    assert_eq!(report.database, DatabaseOutcome::Restored);
    assert_eq!(*restore_runner.applied.borrow(), vec![DUMP.to_string()]);
    assert_eq!(
        restore_runner.statements()[1],
        "CREATE DATABASE IF NOT EXISTS `wordpress`"
    );
    assert_eq!(env.workspace_entries(), 0);
}

#[test]
fn test_archive_inside_site_is_left_out_of_itself() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("html/backup.tar.gz");

    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::all())
        .unwrap();

    let members = ArchiveReader::open(&archive).unwrap().members().unwrap();
    assert!(!members.iter().any(|m| m.ends_with("backup.tar.gz")));

    let target = SiteDescriptor::builder(env.path("restored")).build().unwrap();
    RestoreJob::new(&target, &env.settings, &FakeDatabase::default(), &reporter)
        .run(&archive, &RestoreMode::files_only(), None)
        .unwrap();

    let mut original = snapshot(&env.path("html"));
    original.remove(Path::new("backup.tar.gz"));
    assert_eq!(original, snapshot(&env.path("restored")));
}

#[cfg(unix)]
#[test]
fn test_round_trip_keeps_read_only_directory() {
    use std::os::unix::fs::PermissionsExt;

    let env = Env::new();
    let site = env.make_site("html");
    let locked = env.path("html/wp-content/locked");
    fs::create_dir_all(&locked).unwrap();
    fs::write(locked.join("file.txt"), "inside a read-only dir").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::files_only())
        .unwrap();

    let target = SiteDescriptor::builder(env.path("restored")).build().unwrap();
    let result = RestoreJob::new(&target, &env.settings, &FakeDatabase::default(), &reporter)
        .run(&archive, &RestoreMode::files_only(), None);

    let restored_locked = env.path("restored/wp-content/locked");
    let restored_mode = fs::metadata(&restored_locked)
        .map(|m| m.permissions().mode() & 0o777)
        .ok();

    // Let TempDir clean up before asserting
    for dir in [&locked, &restored_locked] {
        let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o755));
    }

    result.unwrap();
    assert_eq!(restored_mode, Some(0o555));
    assert_eq!(snapshot(&env.path("html")), snapshot(&env.path("restored")));
}

// =============================================================================
// Config rewrite
// =============================================================================

#[test]
fn test_partial_config_update_touches_only_given_keys() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::files_only())
        .unwrap();

    let target = SiteDescriptor::builder(env.path("staging"))
        .db_name("staging_db")
        .build()
        .unwrap();
    let report = RestoreJob::new(&target, &env.settings, &FakeDatabase::default(), &reporter)
        .run(&archive, &RestoreMode::files_only(), None)
        .unwrap();

    assert_eq!(report.config_keys_updated, vec!["DB_NAME"]);

    let before = config_values(&env.path("html/wp-config.php"));
    let after = config_values(&env.path("staging/wp-config.php"));
    assert_eq!(after["DB_NAME"].as_deref(), Some("staging_db"));
    for key in ["DB_HOST", "DB_USER", "DB_PASSWORD", "WP_HOME", "WP_SITEURL"] {
        assert_eq!(after[key], before[key], "{} must keep its value", key);
    }

    // Untouched lines survive byte for byte
    let text = fs::read_to_string(env.path("staging/wp-config.php")).unwrap();
    assert!(text.contains("$table_prefix = 'wp_';\n"));
    assert!(text.contains("/** The name of the database for WordPress */\n"));
}

#[test]
fn test_db_host_written_with_port() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::files_only())
        .unwrap();

    let target = SiteDescriptor::builder(env.path("moved"))
        .db_host("127.0.0.1")
        .db_port(3306)
        .build()
        .unwrap();
    RestoreJob::new(&target, &env.settings, &FakeDatabase::default(), &reporter)
        .run(&archive, &RestoreMode::files_only(), None)
        .unwrap();

    let after = config_values(&env.path("moved/wp-config.php"));
    assert_eq!(after["DB_HOST"].as_deref(), Some("127.0.0.1:3306"));
}

#[test]
fn test_socket_db_host_backs_up_over_socket() {
    let env = Env::new();
    let root = env.path("html");
    env.make_site("html");
    fs::write(
        root.join("wp-config.php"),
        CONFIG.replace("localhost:3306", "localhost:/var/run/mysqld/mysqld.sock"),
    )
    .unwrap();
    let site = SiteDescriptor::from_site_path(&root, "wp-config.php").unwrap();

    let runner = FakeDatabase::default();
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &runner, &reporter)
        .run(Some(&env.path("site.tar.gz")), &BackupMode::database_only())
        .unwrap();

    let calls = runner.calls.borrow();
    assert_eq!(calls[0].program(), "mysqldump");
    assert!(calls[0]
        .args()
        .contains(&"--socket=/var/run/mysqld/mysqld.sock".to_string()));
}

// =============================================================================
// Dry-run
// =============================================================================

#[test]
fn test_dry_run_backup_has_no_side_effects() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("dry.tar.gz");
    let runner = FakeDatabase::default();
    let reporter = MemoryReporter::new();

    let report = BackupJob::new(&site, &env.settings, &runner, &reporter)
        .dry_run(true)
        .run(Some(&archive), &BackupMode::all())
        .unwrap();

    assert!(report.dry_run);
    assert!(!archive.exists());
    assert!(runner.calls.borrow().is_empty());
    assert_eq!(env.workspace_entries(), 0);
}

#[test]
fn test_dry_run_restore_has_no_side_effects() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::all())
        .unwrap();

    // Restoring over the source site with every destructive step selected
    let before = snapshot(&env.path("html"));
    let target = SiteDescriptor::builder(env.path("html"))
        .db_name("other")
        .site_url("https://changed.example")
        .build()
        .unwrap();
    let runner = FakeDatabase::with_existing("other");

    let report = RestoreJob::new(&target, &env.settings, &runner, &reporter)
        .dry_run(true)
        .run(&archive, &RestoreMode::all_clean(), Some(&Credentials::new("root", "pw")))
        .unwrap();

    assert!(report.dry_run);
    assert_eq!(report.database, DatabaseOutcome::DryRun);
    assert!(report.config_keys_updated.is_empty());
    assert!(runner.calls.borrow().is_empty());
    assert_eq!(snapshot(&env.path("html")), before);
    assert_eq!(env.workspace_entries(), 0);
}

// =============================================================================
// Destructive steps only when asked
// =============================================================================

#[test]
fn test_existing_database_left_alone_without_delete() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::all())
        .unwrap();

    let target = SiteDescriptor::builder(env.path("target")).build().unwrap();
    let runner = FakeDatabase::with_existing("wordpress");
    let report = RestoreJob::new(&target, &env.settings, &runner, &reporter)
        .run(&archive, &RestoreMode::all_overwrite(), None)
        .unwrap();

    assert_eq!(report.database, DatabaseOutcome::SkippedExisting);
    assert_eq!(runner.statements(), vec!["SHOW DATABASES LIKE 'wordpress'"]);
    assert!(runner.applied.borrow().is_empty());
    assert!(reporter.contains("RESTORE_COMPLETE"));
}

#[test]
fn test_existing_database_replaced_with_delete() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::all())
        .unwrap();

    let target = SiteDescriptor::builder(env.path("target")).build().unwrap();
    let runner = FakeDatabase::with_existing("wordpress");
    let mode = RestoreMode::database_only().with(RestoreStep::DeleteDatabaseBeforeRestore);
    let report = RestoreJob::new(&target, &env.settings, &runner, &reporter)
        .run(&archive, &mode, None)
        .unwrap();

    assert_eq!(report.database, DatabaseOutcome::Restored);
    assert_eq!(
        runner.statements()[..3],
        [
            "SHOW DATABASES LIKE 'wordpress'".to_string(),
            "DROP DATABASE IF EXISTS `wordpress`".to_string(),
            "CREATE DATABASE IF NOT EXISTS `wordpress`".to_string(),
        ]
    );
    assert_eq!(runner.applied.borrow().len(), 1);
}

#[test]
fn test_target_directory_kept_without_remove() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::files_only())
        .unwrap();

    let target_dir = env.path("target");
    fs::create_dir_all(target_dir.join("notes")).unwrap();
    fs::write(target_dir.join("notes/unrelated.txt"), "keep me").unwrap();

    let target = SiteDescriptor::builder(&target_dir).build().unwrap();
    RestoreJob::new(&target, &env.settings, &FakeDatabase::default(), &reporter)
        .run(&archive, &RestoreMode::files_only(), None)
        .unwrap();

    assert_eq!(
        fs::read_to_string(target_dir.join("notes/unrelated.txt")).unwrap(),
        "keep me"
    );
    assert!(target_dir.join("index.php").exists());
    assert!(!reporter.contains("SITE_FILES_REMOVED"));
}

#[test]
fn test_target_directory_replaced_with_remove() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::files_only())
        .unwrap();

    let target_dir = env.path("target");
    fs::create_dir_all(&target_dir).unwrap();
    fs::write(target_dir.join("stale.txt"), "old").unwrap();

    let target = SiteDescriptor::builder(&target_dir).build().unwrap();
    let mode = RestoreMode::files_only().with(RestoreStep::RemoveFilesBeforeRestore);
    RestoreJob::new(&target, &env.settings, &FakeDatabase::default(), &reporter)
        .run(&archive, &mode, None)
        .unwrap();

    assert!(!target_dir.join("stale.txt").exists());
    assert_eq!(snapshot(&env.path("html")), snapshot(&target_dir));
    assert!(reporter.contains("SITE_FILES_REMOVED"));
}

// =============================================================================
// Tool failures
// =============================================================================

#[test]
fn test_missing_dump_tool_is_tool_not_found() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let settings = Settings {
        dump_program: env.path("no-such-dir/mysqldump").display().to_string(),
        ..env.settings.clone()
    };
    let reporter = MemoryReporter::new();

    let err = BackupJob::new(&site, &settings, &SystemRunner, &reporter)
        .run(Some(&archive), &BackupMode::all())
        .unwrap_err();

    assert!(matches!(err, VaultError::ToolNotFound { .. }), "got {:?}", err);
    assert_eq!(err.exit_code(), 3);
    assert!(!archive.exists());
    assert_eq!(env.workspace_entries(), 0);
}

#[cfg(unix)]
#[test]
fn test_failing_dump_tool_is_dump_failed() {
    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let settings = Settings {
        dump_program: "false".to_string(),
        ..env.settings.clone()
    };
    let reporter = MemoryReporter::new();

    let err = BackupJob::new(&site, &settings, &SystemRunner, &reporter)
        .run(Some(&archive), &BackupMode::all())
        .unwrap_err();

    assert!(matches!(err, VaultError::DumpFailed { .. }), "got {:?}", err);
    assert_eq!(err.command_output().and_then(|o| o.status), Some(1));
    assert!(!archive.exists());
    assert_eq!(env.workspace_entries(), 0);
}

#[test]
fn test_restore_failure_is_classified() {
    struct Refusing;

    impl CommandRunner for Refusing {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ProcessError> {
            Err(ProcessError::NonZeroExit {
                program: invocation.program().to_string(),
                output: CommandOutput {
                    status: Some(1),
                    stdout: Vec::new(),
                    stderr: b"ERROR 1045 (28000): Access denied for user 'root'".to_vec(),
                },
            })
        }
    }

    let env = Env::new();
    let site = env.make_site("html");
    let archive = env.path("site.tar.gz");
    let reporter = MemoryReporter::new();
    BackupJob::new(&site, &env.settings, &FakeDatabase::default(), &reporter)
        .run(Some(&archive), &BackupMode::database_only())
        .unwrap();

    // Database only, back into the source site so its config names the database
    let target = SiteDescriptor::builder(env.path("html")).build().unwrap();
    let err = RestoreJob::new(&target, &env.settings, &Refusing, &reporter)
        .run(&archive, &RestoreMode::database_only(), None)
        .unwrap_err();

    match &err {
        VaultError::RestoreFailed { step, output } => {
            assert_eq!(*step, "check database");
            assert!(output.stderr_lossy().contains("Access denied"));
        }
        other => panic!("expected RestoreFailed, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 4);
    assert_eq!(env.workspace_entries(), 0);
}

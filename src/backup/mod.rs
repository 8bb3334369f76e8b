//! Backup orchestrator
//!
//! Produces a site archive from a running site.
//!
//! # Algorithm
//!
//! 1. If the mode selects the database, run the dump tool and save its
//!    stdout as `database.sql` in the run's workspace
//! 2. Check the site's config file exists
//! 3. Write the archive: the dump (if taken) under `database.sql`, the site
//!    directory (if selected) under `wp-root/`
//! 4. fsync the archive
//!
//! A failed dump stops the run before any archive is opened. An archive that
//! fails mid-write is removed.
//!
//! # Dry-run
//!
//! Same control flow and the same validation, but no process is spawned and
//! nothing is written.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::archive::{remove_partial_archive, ArchiveWriter, TreeStats, DUMP_ARCNAME};
use crate::error::{VaultError, VaultResult};
use crate::mode::{BackupMode, BackupStage};
use crate::observability::{report_event, Event, Reporter, StageScope};
use crate::process::mysql::{dump_error, dump_invocation};
use crate::process::CommandRunner;
use crate::settings::Settings;
use crate::site::SiteDescriptor;
use crate::workspace::Workspace;

/// Archive name used when the caller gives none
///
/// `<db_name>-<UTC timestamp>.tar.gz`, or `site-...` without a database name.
pub fn default_archive_name(db_name: Option<&str>, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}.tar.gz",
        db_name.unwrap_or("site"),
        now.format("%Y%m%dT%H%M%SZ")
    )
}

/// What a backup run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub archive_path: PathBuf,
    pub dump_included: bool,
    pub files_included: bool,
    /// Site entries written (zero in dry-run or without files)
    pub tree: TreeStats,
    pub dry_run: bool,
}

/// One backup run against one site
pub struct BackupJob<'a> {
    site: &'a SiteDescriptor,
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    reporter: &'a dyn Reporter,
    dry_run: bool,
}

impl<'a> BackupJob<'a> {
    pub fn new(
        site: &'a SiteDescriptor,
        settings: &'a Settings,
        runner: &'a dyn CommandRunner,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            site,
            settings,
            runner,
            reporter,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run the backup.
    ///
    /// `archive` may be `None` (or empty) to use [`default_archive_name`] in
    /// the current directory.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty mode, or a database stage without a
    ///   database name
    /// - `ToolNotFound` / `DumpFailed` from the dump tool
    /// - `ConfigNotFound` if the site has no config file
    /// - `Io` on archive write failures
    pub fn run(&self, archive: Option<&Path>, mode: &BackupMode) -> VaultResult<BackupReport> {
        let archive_path = match archive {
            Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
            _ => PathBuf::from(default_archive_name(self.site.db_name(), Utc::now())),
        };

        let site = self.site.site_path().display().to_string();
        let target = archive_path.display().to_string();
        report_event(
            self.reporter,
            Event::BackupStart,
            &[
                ("site", &site),
                ("archive", &target),
                ("dry_run", bool_str(self.dry_run)),
            ],
        );

        match self.execute(archive_path, mode) {
            Ok(report) => {
                report_event(
                    self.reporter,
                    Event::BackupComplete,
                    &[
                        ("archive", &target),
                        ("database", bool_str(report.dump_included)),
                        ("files", bool_str(report.files_included)),
                    ],
                );
                Ok(report)
            }
            Err(e) => {
                report_event(
                    self.reporter,
                    Event::BackupFailed,
                    &[("code", e.code()), ("error", &e.to_string())],
                );
                Err(e)
            }
        }
    }

    fn execute(&self, archive_path: PathBuf, mode: &BackupMode) -> VaultResult<BackupReport> {
        if mode.is_empty() {
            return Err(VaultError::invalid("backup mode selects no stage"));
        }

        // Lives until the archive is written; removed on every exit path
        let workspace = if self.dry_run {
            None
        } else {
            Some(Workspace::create_in(&self.settings.workspace_root())?)
        };

        let dump = if mode.contains(BackupStage::Database) {
            self.dump_database(workspace.as_ref())?
        } else {
            None
        };

        let config_path = self.site.config_path();
        if !config_path.is_file() {
            return Err(VaultError::ConfigNotFound { path: config_path });
        }

        let include_files = mode.contains(BackupStage::Files);
        let tree = self.write_archive(&archive_path, dump.as_deref(), include_files)?;

        Ok(BackupReport {
            archive_path,
            dump_included: mode.contains(BackupStage::Database),
            files_included: include_files,
            tree,
            dry_run: self.dry_run,
        })
    }

    fn dump_database(&self, workspace: Option<&Workspace>) -> VaultResult<Option<PathBuf>> {
        let invocation = dump_invocation(self.settings, self.site)?;
        let shown = invocation.to_string();

        let workspace = match workspace {
            Some(workspace) => workspace,
            None => {
                report_event(
                    self.reporter,
                    Event::DryRunSkipped,
                    &[("step", "dump"), ("command", &shown)],
                );
                return Ok(None);
            }
        };

        let db_name = self.site.require_db_name()?;
        let scope = StageScope::with_fields(self.reporter, "DUMP", &[("database", db_name)]);

        report_event(
            self.reporter,
            Event::CommandRun,
            &[("step", "dump"), ("command", &shown)],
        );
        let output = self.runner.run(&invocation).map_err(dump_error)?;

        let dump_path = workspace.file(DUMP_ARCNAME);
        fs::write(&dump_path, &output.stdout).map_err(|e| {
            VaultError::io(format!("Failed to write dump: {}", dump_path.display()), e)
        })?;

        let bytes = output.stdout.len().to_string();
        report_event(
            self.reporter,
            Event::DumpSaved,
            &[("path", &dump_path.display().to_string()), ("bytes", &bytes)],
        );
        scope.complete_with_fields(&[("bytes", &bytes)]);

        Ok(Some(dump_path))
    }

    fn write_archive(
        &self,
        archive_path: &Path,
        dump: Option<&Path>,
        include_files: bool,
    ) -> VaultResult<TreeStats> {
        let target = archive_path.display().to_string();

        if self.dry_run {
            if include_files && !self.site.site_path().is_dir() {
                return Err(VaultError::invalid(format!(
                    "site directory does not exist: {}",
                    self.site.site_path().display()
                )));
            }
            report_event(
                self.reporter,
                Event::DryRunSkipped,
                &[("step", "archive"), ("archive", &target)],
            );
            return Ok(TreeStats::default());
        }

        let scope = StageScope::with_fields(self.reporter, "ARCHIVE", &[("archive", &target)]);

        let result = (|| -> VaultResult<TreeStats> {
            let mut writer = ArchiveWriter::create(archive_path)?;

            if let Some(dump) = dump {
                writer.append_dump(dump)?;
                report_event(
                    self.reporter,
                    Event::ArchiveEntryAdded,
                    &[("member", DUMP_ARCNAME)],
                );
            }

            let stats = if include_files {
                let stats = writer.append_site_tree(self.site.site_path())?;
                let entries = stats.entries.to_string();
                let skipped = stats.skipped.to_string();
                report_event(
                    self.reporter,
                    Event::ArchiveEntryAdded,
                    &[
                        ("member", crate::archive::SITE_ROOT_ARCNAME),
                        ("entries", &entries),
                        ("skipped", &skipped),
                    ],
                );
                stats
            } else {
                TreeStats::default()
            };

            writer.finish()?;
            Ok(stats)
        })();

        match result {
            Ok(stats) => {
                scope.complete_with_fields(&[("entries", &stats.entries.to_string())]);
                Ok(stats)
            }
            Err(e) => {
                remove_partial_archive(archive_path);
                Err(e)
            }
        }
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

//! Restore orchestrator
//!
//! Applies a site archive to a target site and database.
//!
//! # Algorithm
//!
//! 1. Open the archive (`ArchiveNotFound` if absent)
//! 2. Files: optionally remove the target directory, then extract the
//!    `wp-root/` members into it
//! 3. Database: extract `database.sql` into the workspace
//! 4. Rewrite the config file with every override that carries a value
//! 5. Database: make sure the database exists and load the dump into it
//!
//! Files always run before the database. A failed files stage stops the run.
//!
//! # Existing databases
//!
//! An existing target database is authoritative unless
//! [`RestoreStep::DeleteDatabaseBeforeRestore`] is set: the database stage is
//! skipped and the outcome is [`DatabaseOutcome::SkippedExisting`]. With the
//! step set, the database is dropped and recreated before the dump is loaded.
//!
//! # Dry-run
//!
//! The archive is opened and its members are listed. Nothing is deleted,
//! extracted or written, and no process is spawned.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::archive::{classify_member, ArchiveReader, ExtractSummary, MemberKind};
use crate::error::{VaultError, VaultResult};
use crate::mode::{RestoreMode, RestoreStep};
use crate::observability::{report_event, Event, Reporter, StageScope};
use crate::process::mysql::MysqlAdmin;
use crate::process::CommandRunner;
use crate::settings::Settings;
use crate::site::config::WpConfigFile;
use crate::site::rewrite::{apply_updates, planned_updates};
use crate::site::{Credentials, SiteDescriptor};
use crate::workspace::Workspace;

/// What happened to the database during a restore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseOutcome {
    /// The mode did not select the database
    NotRequested,
    /// Dump loaded into a freshly created database
    Restored,
    /// The database already existed and was left untouched
    SkippedExisting,
    /// Dry-run; nothing was run
    DryRun,
}

/// What a restore run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Extraction summary; `None` if files were not restored
    pub files: Option<ExtractSummary>,
    /// Config keys rewritten, in write order
    pub config_keys_updated: Vec<&'static str>,
    pub database: DatabaseOutcome,
    pub dry_run: bool,
}

/// One restore run against one target site.
///
/// `site` names the target directory and carries the overrides to write into
/// the restored config: new database host, name and credentials, new URLs.
/// Fields left unset keep whatever the archived config says.
pub struct RestoreJob<'a> {
    site: &'a SiteDescriptor,
    settings: &'a Settings,
    runner: &'a dyn CommandRunner,
    reporter: &'a dyn Reporter,
    dry_run: bool,
}

impl<'a> RestoreJob<'a> {
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

    /// Run the restore.
    ///
    /// `admin` is used for the database administration commands. Without it
    /// the site's admin credentials apply, then the database credentials in
    /// effect after the config rewrite.
    pub fn run(
        &self,
        archive: &Path,
        mode: &RestoreMode,
        admin: Option<&Credentials>,
    ) -> VaultResult<RestoreReport> {
        let site = self.site.site_path().display().to_string();
        let source = archive.display().to_string();
        report_event(
            self.reporter,
            Event::RestoreStart,
            &[
                ("site", &site),
                ("archive", &source),
                ("dry_run", if self.dry_run { "true" } else { "false" }),
            ],
        );

        match self.execute(archive, mode, admin) {
            Ok(report) => {
                let keys = report.config_keys_updated.len().to_string();
                report_event(
                    self.reporter,
                    Event::RestoreComplete,
                    &[
                        ("site", &site),
                        ("config_keys", &keys),
                        ("database", outcome_str(report.database)),
                    ],
                );
                Ok(report)
            }
            Err(e) => {
                report_event(
                    self.reporter,
                    Event::RestoreFailed,
                    &[("code", e.code()), ("error", &e.to_string())],
                );
                Err(e)
            }
        }
    }

    fn execute(
        &self,
        archive: &Path,
        mode: &RestoreMode,
        admin: Option<&Credentials>,
    ) -> VaultResult<RestoreReport> {
        if !mode.has_stage() {
            return Err(VaultError::invalid("restore mode selects no stage"));
        }

        let reader = ArchiveReader::open(archive)?;
        let wants_database = mode.contains(RestoreStep::Database);

        if self.dry_run {
            self.validate_members(&reader, wants_database)?;
        }

        let workspace = if self.dry_run {
            None
        } else {
            Some(Workspace::create_in(&self.settings.workspace_root())?)
        };

        let files = if mode.contains(RestoreStep::Files) {
            self.restore_files(&reader, mode)?
        } else {
            None
        };

        let dump = match (&workspace, wants_database) {
            (Some(workspace), true) => Some(self.extract_dump(&reader, workspace)?),
            _ => None,
        };

        let config_keys_updated = self.rewrite_config()?;

        let database = if wants_database {
            self.restore_database(dump.as_deref(), mode, admin)?
        } else {
            DatabaseOutcome::NotRequested
        };

        Ok(RestoreReport {
            files,
            config_keys_updated,
            database,
            dry_run: self.dry_run,
        })
    }

    fn validate_members(&self, reader: &ArchiveReader, wants_database: bool) -> VaultResult<()> {
        let members = reader.members()?;
        let has_dump = members
            .iter()
            .any(|member| classify_member(member) == MemberKind::Dump);

        if wants_database && !has_dump {
            return Err(no_dump());
        }

        let count = members.len().to_string();
        report_event(
            self.reporter,
            Event::DryRunSkipped,
            &[("step", "extract"), ("members", &count)],
        );
        Ok(())
    }

    fn restore_files(
        &self,
        reader: &ArchiveReader,
        mode: &RestoreMode,
    ) -> VaultResult<Option<ExtractSummary>> {
        let target = self.site.site_path();
        let shown = target.display().to_string();

        if self.dry_run {
            report_event(
                self.reporter,
                Event::DryRunSkipped,
                &[("step", "files"), ("target", &shown)],
            );
            return Ok(None);
        }

        let scope = StageScope::with_fields(self.reporter, "FILES", &[("target", &shown)]);

        if mode.contains(RestoreStep::RemoveFilesBeforeRestore) {
            match fs::remove_dir_all(target) {
                Ok(()) => report_event(self.reporter, Event::SiteFilesRemoved, &[("target", &shown)]),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(VaultError::io(
                        format!("Failed to remove site directory: {}", shown),
                        e,
                    ))
                }
            }
        }

        let summary = reader.extract_site_tree(target)?;

        for (member, reason) in &summary.skipped {
            self.reporter.warn(
                Event::ArchiveMemberSkipped.as_str(),
                &[("member", &member.display().to_string()), ("reason", reason)],
            );
        }

        scope.complete_with_fields(&[
            ("extracted", &summary.extracted.to_string()),
            ("skipped", &summary.skipped.len().to_string()),
        ]);

        Ok(Some(summary))
    }

    fn extract_dump(&self, reader: &ArchiveReader, workspace: &Workspace) -> VaultResult<PathBuf> {
        reader.extract_dump(workspace.path())?.ok_or_else(no_dump)
    }

    fn rewrite_config(&self) -> VaultResult<Vec<&'static str>> {
        let updates = planned_updates(self.site);
        if updates.is_empty() {
            report_event(
                self.reporter,
                Event::ConfigRewriteSkipped,
                &[("reason", "no overrides")],
            );
            return Ok(Vec::new());
        }

        let config_path = self.site.config_path();
        let shown = config_path.display().to_string();

        if self.dry_run {
            let keys: Vec<&str> = updates.iter().map(|u| u.key).collect();
            let keys = keys.join(",");
            if config_path.is_file() {
                report_event(
                    self.reporter,
                    Event::DryRunSkipped,
                    &[("step", "config"), ("path", &shown), ("keys", &keys)],
                );
            } else {
                report_event(
                    self.reporter,
                    Event::ConfigRewriteSkipped,
                    &[("reason", "config file not present before extraction"), ("path", &shown)],
                );
            }
            return Ok(Vec::new());
        }

        let scope = StageScope::with_fields(self.reporter, "CONFIG", &[("path", &shown)]);

        let mut config = WpConfigFile::open(&config_path)?;
        apply_updates(&mut config, &updates)?;

        for update in &updates {
            let value = if update.is_secret() { "****" } else { update.value.as_str() };
            report_event(
                self.reporter,
                Event::ConfigKeyUpdated,
                &[("key", update.key), ("value", value)],
            );
        }

        scope.complete_with_fields(&[("keys", &updates.len().to_string())]);

        Ok(updates.iter().map(|u| u.key).collect())
    }

    /// Connection the database stage uses: overrides over the restored config
    fn effective_site(&self) -> VaultResult<SiteDescriptor> {
        match WpConfigFile::open(&self.site.config_path()) {
            Ok(config) => {
                let restored = SiteDescriptor::from_config_store(
                    &config,
                    self.site.site_path(),
                    self.site.config_file_name(),
                )?;
                Ok(self.site.overlay(&restored))
            }
            Err(VaultError::ConfigNotFound { .. }) => Ok(self.site.clone()),
            Err(e) => Err(e),
        }
    }

    fn restore_database(
        &self,
        dump: Option<&Path>,
        mode: &RestoreMode,
        admin: Option<&Credentials>,
    ) -> VaultResult<DatabaseOutcome> {
        let effective = self.effective_site()?;

        let dump = match dump {
            Some(dump) if !self.dry_run => dump,
            _ => {
                report_event(
                    self.reporter,
                    Event::DryRunSkipped,
                    &[
                        ("step", "database"),
                        ("database", effective.db_name().unwrap_or("(from restored config)")),
                    ],
                );
                return Ok(DatabaseOutcome::DryRun);
            }
        };

        let db_name = effective.require_db_name()?;
        let admin = admin
            .cloned()
            .unwrap_or_else(|| effective.admin_credentials().clone());

        let scope = StageScope::with_fields(self.reporter, "DATABASE", &[("database", db_name)]);
        let mysql = MysqlAdmin::new(self.runner, self.reporter, self.settings, &effective, &admin);

        if mysql.database_exists(db_name)? {
            if !mode.contains(RestoreStep::DeleteDatabaseBeforeRestore) {
                self.reporter.warn(
                    Event::DatabaseKept.as_str(),
                    &[
                        ("database", db_name),
                        ("reason", "database exists and deletion was not requested"),
                    ],
                );
                scope.complete_with_fields(&[("outcome", outcome_str(DatabaseOutcome::SkippedExisting))]);
                return Ok(DatabaseOutcome::SkippedExisting);
            }

            mysql.drop_database(db_name)?;
            report_event(self.reporter, Event::DatabaseDropped, &[("database", db_name)]);
        }

        mysql.create_database(db_name)?;
        mysql.apply_script(db_name, dump)?;

        scope.complete_with_fields(&[("outcome", outcome_str(DatabaseOutcome::Restored))]);
        Ok(DatabaseOutcome::Restored)
    }
}

fn no_dump() -> VaultError {
    VaultError::invalid("archive contains no database dump")
}

fn outcome_str(outcome: DatabaseOutcome) -> &'static str {
    match outcome {
        DatabaseOutcome::NotRequested => "not_requested",
        DatabaseOutcome::Restored => "restored",
        DatabaseOutcome::SkippedExisting => "skipped_existing",
        DatabaseOutcome::DryRun => "dry_run",
    }
}

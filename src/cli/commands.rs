//! CLI command implementations
//!
//! Commands build the site descriptor from their arguments, run one
//! orchestrator and print a JSON summary on stdout. Event lines go to stderr.

use std::io::{self, Write};

use serde_json::{json, Value};

use crate::backup::{BackupJob, BackupReport};
use crate::error::{VaultError, VaultResult};
use crate::mode::{RestoreMode, RestoreStep};
use crate::observability::{JsonReporter, Reporter};
use crate::process::{CommandRunner, SystemRunner};
use crate::restore::{RestoreJob, RestoreReport};
use crate::settings::Settings;
use crate::site::{Credentials, SiteDescriptor};

use super::args::{BackupArgs, Cli, Command, RestoreArgs};

/// Main CLI entry point
///
/// Parses arguments, runs the command and returns the process exit code.
/// This is the only function that main.rs should call.
pub fn run() -> i32 {
    let cli = Cli::parse_args();
    let reporter = JsonReporter::stderr(cli.log_level);

    match run_command(&cli, &SystemRunner, &reporter) {
        Ok(summary) => {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{}", summary);
            0
        }
        Err(e) => {
            report_error(&e);
            e.exit_code()
        }
    }
}

/// Run the command named by `cli`
pub fn run_command(
    cli: &Cli,
    runner: &dyn CommandRunner,
    reporter: &dyn Reporter,
) -> VaultResult<Value> {
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match &cli.command {
        Command::Backup(args) => backup(args, &settings, runner, reporter),
        Command::Restore(args) => restore(args, &settings, runner, reporter),
    }
}

/// Back up the site at `--wp-dir`
pub fn backup(
    args: &BackupArgs,
    settings: &Settings,
    runner: &dyn CommandRunner,
    reporter: &dyn Reporter,
) -> VaultResult<Value> {
    let site = SiteDescriptor::from_site_path(&args.wp_dir, &settings.config_file_name)?;

    let report = BackupJob::new(&site, settings, runner, reporter)
        .dry_run(args.dry_run)
        .run(args.archive.as_deref(), &args.mode.backup_mode())?;

    Ok(backup_summary(&report))
}

/// Restore the archive into `--wp-dir`
pub fn restore(
    args: &RestoreArgs,
    settings: &Settings,
    runner: &dyn CommandRunner,
    reporter: &dyn Reporter,
) -> VaultResult<Value> {
    let site = restore_target(args, settings)?;
    let mode = restore_mode(args);

    let admin = Credentials::from_parts(args.admin_username.clone(), args.admin_password.clone());
    let admin = if admin.is_empty() { None } else { Some(admin) };

    let report = RestoreJob::new(&site, settings, runner, reporter)
        .dry_run(args.dry_run)
        .run(&args.archive, &mode, admin.as_ref())?;

    Ok(restore_summary(&report))
}

/// Target descriptor carrying the `--new-*` overrides
pub fn restore_target(args: &RestoreArgs, settings: &Settings) -> VaultResult<SiteDescriptor> {
    let mut builder = SiteDescriptor::builder(&args.wp_dir)
        .config_file_name(settings.config_file_name.as_str())
        .credentials(Credentials::from_parts(
            args.new_db_user.clone(),
            args.new_db_password.clone(),
        ));

    if let Some(host) = &args.new_db_host {
        builder = builder.db_host(host.as_str());
    }
    if let Some(name) = &args.new_db_name {
        builder = builder.db_name(name.as_str());
    }
    if let Some(url) = &args.new_site_url {
        builder = builder.site_url(url.as_str());
    }
    if let Some(home) = &args.new_site_home_url {
        builder = builder.site_home(home.as_str());
    }

    builder.build()
}

/// Mode from `--mode`, widened by `--clean` and `--force`
pub fn restore_mode(args: &RestoreArgs) -> RestoreMode {
    let mut mode = args.mode.restore_mode();
    if args.clean {
        if mode.contains(RestoreStep::Files) {
            mode = mode.with(RestoreStep::RemoveFilesBeforeRestore);
        }
        if mode.contains(RestoreStep::Database) {
            mode = mode.with(RestoreStep::DeleteDatabaseBeforeRestore);
        }
    }
    if args.force {
        mode = mode.with(RestoreStep::DeleteDatabaseBeforeRestore);
    }
    mode
}

fn backup_summary(report: &BackupReport) -> Value {
    json!({
        "command": "backup",
        "archive": report.archive_path.display().to_string(),
        "database": report.dump_included,
        "files": report.files_included,
        "entries": report.tree.entries,
        "dry_run": report.dry_run,
    })
}

fn restore_summary(report: &RestoreReport) -> Value {
    let (extracted, skipped) = match &report.files {
        Some(files) => (files.extracted, files.skipped.len()),
        None => (0, 0),
    };

    json!({
        "command": "restore",
        "extracted": extracted,
        "skipped": skipped,
        "config_keys_updated": report.config_keys_updated,
        "database": format!("{:?}", report.database),
        "dry_run": report.dry_run,
    })
}

/// Print an error, and any captured tool output, to stderr
fn report_error(e: &VaultError) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "error[{}]: {}", e.code(), e);

    if let Some(output) = e.command_output() {
        let captured = output.stderr_lossy();
        if !captured.trim().is_empty() {
            let _ = writeln!(stderr, "--- {} stderr ---", output.status_label());
            let _ = write!(stderr, "{}", captured);
        }
    }
}

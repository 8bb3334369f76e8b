//! CLI argument definitions using clap
//!
//! Commands:
//! - sitevault backup --wp-dir <dir> [--archive <file>]
//! - sitevault restore --wp-dir <dir> --archive <file>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::mode::StageSelector;
use crate::observability::Severity;

/// sitevault - back up and restore WordPress sites
#[derive(Parser, Debug)]
#[command(name = "sitevault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Minimum log level (trace, info, warn, error, fatal)
    #[arg(long, global = true, default_value = "info", env = "SITEVAULT_LOG_LEVEL")]
    pub log_level: Severity,

    /// Path to a JSON settings file
    #[arg(long, global = true, env = "SITEVAULT_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Back up a site's files and database into an archive
    Backup(BackupArgs),

    /// Restore a site's files and database from an archive
    Restore(RestoreArgs),
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Root of the WordPress directory (or its wp-config.php)
    #[arg(long)]
    pub wp_dir: PathBuf,

    /// Archive to write (default: <db_name>-<timestamp>.tar.gz)
    #[arg(long)]
    pub archive: Option<PathBuf>,

    /// What to back up: files, db or all
    #[arg(long, default_value = "all")]
    pub mode: StageSelector,

    /// Validate and log what would happen without doing it
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Root of the WordPress directory to restore into
    #[arg(long)]
    pub wp_dir: PathBuf,

    /// Archive to restore from
    #[arg(long)]
    pub archive: PathBuf,

    /// What to restore: files, db or all
    #[arg(long, default_value = "all")]
    pub mode: StageSelector,

    /// Remove the site directory and drop the database before restoring
    #[arg(long)]
    pub clean: bool,

    /// Drop an existing database before restoring
    #[arg(long)]
    pub force: bool,

    /// Validate and log what would happen without doing it
    #[arg(long)]
    pub dry_run: bool,

    /// Database admin username
    #[arg(long, env = "SITEVAULT_ADMIN_USER")]
    pub admin_username: Option<String>,

    /// Database admin password
    #[arg(long, env = "SITEVAULT_ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,

    /// New WP_SITEURL
    #[arg(long)]
    pub new_site_url: Option<String>,

    /// New WP_HOME
    #[arg(long)]
    pub new_site_home_url: Option<String>,

    /// New database host, optionally host:port
    #[arg(long)]
    pub new_db_host: Option<String>,

    /// New database name
    #[arg(long)]
    pub new_db_name: Option<String>,

    /// New database user
    #[arg(long)]
    pub new_db_user: Option<String>,

    /// New database password
    #[arg(long)]
    pub new_db_password: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup() {
        let cli = Cli::try_parse_from([
            "sitevault",
            "--log-level",
            "warn",
            "backup",
            "--wp-dir",
            "/var/www/html",
            "--mode",
            "db",
        ])
        .unwrap();

        assert_eq!(cli.log_level, Severity::Warn);
        match cli.command {
            Command::Backup(args) => {
                assert_eq!(args.wp_dir, PathBuf::from("/var/www/html"));
                assert_eq!(args.mode, StageSelector::Database);
                assert!(args.archive.is_none());
                assert!(!args.dry_run);
            }
            other => panic!("expected backup, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_restore_overrides() {
        let cli = Cli::try_parse_from([
            "sitevault",
            "restore",
            "--wp-dir",
            "/srv/site",
            "--archive",
            "site.tar.gz",
            "--new-db-host",
            "10.0.0.5:3307",
            "--new-db-name",
            "staging",
            "--force",
        ])
        .unwrap();

        match cli.command {
            Command::Restore(args) => {
                assert_eq!(args.new_db_host.as_deref(), Some("10.0.0.5:3307"));
                assert_eq!(args.new_db_name.as_deref(), Some("staging"));
                assert!(args.force);
                assert!(!args.clean);
                assert_eq!(args.mode, StageSelector::All);
            }
            other => panic!("expected restore, got {:?}", other),
        }
    }

    #[test]
    fn test_restore_requires_archive() {
        assert!(Cli::try_parse_from(["sitevault", "restore", "--wp-dir", "/srv/site"]).is_err());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from([
            "sitevault", "backup", "--wp-dir", "/srv/site", "--mode", "everything"
        ])
        .is_err());
    }
}

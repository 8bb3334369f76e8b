//! CLI module for sitevault
//!
//! Provides command-line interface for:
//! - backup: dump the database and archive the site directory
//! - restore: extract an archive, rewrite the config, load the database
//!
//! The CLI is the only place errors become exit codes.

mod args;
mod commands;

pub use args::{BackupArgs, Cli, Command, RestoreArgs};
pub use commands::{backup, restore, restore_mode, restore_target, run, run_command};

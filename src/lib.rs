//! sitevault - backup and restore for WordPress sites
//!
//! A backup dumps the site's database with `mysqldump` and packs the dump
//! and the site directory into one `.tar.gz`. A restore unpacks it into a
//! target directory, rewrites `wp-config.php` with any new connection
//! settings and loads the dump with the `mysql` client.
//!
//! # Concurrency
//!
//! Runs are sequential and hold no locks. Two runs against the same site
//! directory or database at once will interfere with each other; callers
//! must serialize them.

pub mod archive;
pub mod backup;
pub mod cli;
pub mod error;
pub mod mode;
pub mod observability;
pub mod process;
pub mod restore;
pub mod settings;
pub mod site;
pub mod workspace;

pub use backup::{BackupJob, BackupReport};
pub use error::{VaultError, VaultResult};
pub use mode::{BackupMode, BackupStage, RestoreMode, RestoreStep, StageSelector};
pub use restore::{DatabaseOutcome, RestoreJob, RestoreReport};
pub use site::{Credentials, SiteDescriptor};

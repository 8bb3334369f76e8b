//! Observable events
//!
//! Every lifecycle point the orchestrators report is named here, so event
//! strings stay stable across the codebase.

use std::fmt;

/// Observable events in sitevault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Backup
    /// Backup run started
    BackupStart,
    /// Backup run complete
    BackupComplete,
    /// Backup run failed
    BackupFailed,
    /// Dump written to the workspace
    DumpSaved,
    /// Entry appended to the archive
    ArchiveEntryAdded,

    // Restore
    /// Restore run started
    RestoreStart,
    /// Restore run complete
    RestoreComplete,
    /// Restore run failed
    RestoreFailed,
    /// Existing site directory removed before extraction
    SiteFilesRemoved,
    /// Archive member ignored during extraction
    ArchiveMemberSkipped,
    /// Config key rewritten
    ConfigKeyUpdated,
    /// Config rewrite had nothing to do or no file to act on
    ConfigRewriteSkipped,
    /// Target database exists and is kept as is
    DatabaseKept,
    /// Target database dropped before restore
    DatabaseDropped,

    // Shared
    /// External command about to run
    CommandRun,
    /// Side effect suppressed by dry-run
    DryRunSkipped,
}

impl Event {
    /// Returns the event name used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BackupStart => "BACKUP_BEGIN",
            Event::BackupComplete => "BACKUP_COMPLETE",
            Event::BackupFailed => "BACKUP_FAILED",
            Event::DumpSaved => "DUMP_SAVED",
            Event::ArchiveEntryAdded => "ARCHIVE_ENTRY_ADDED",

            Event::RestoreStart => "RESTORE_BEGIN",
            Event::RestoreComplete => "RESTORE_COMPLETE",
            Event::RestoreFailed => "RESTORE_FAILED",
            Event::SiteFilesRemoved => "SITE_FILES_REMOVED",
            Event::ArchiveMemberSkipped => "ARCHIVE_MEMBER_SKIPPED",
            Event::ConfigKeyUpdated => "CONFIG_KEY_UPDATED",
            Event::ConfigRewriteSkipped => "CONFIG_REWRITE_SKIPPED",
            Event::DatabaseKept => "DATABASE_KEPT",
            Event::DatabaseDropped => "DATABASE_DROPPED",

            Event::CommandRun => "COMMAND_RUN",
            Event::DryRunSkipped => "DRY_RUN_SKIPPED",
        }
    }

    /// Returns true if this event marks a failed run
    pub fn is_failure(&self) -> bool {
        matches!(self, Event::BackupFailed | Event::RestoreFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

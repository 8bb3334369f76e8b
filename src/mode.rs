//! Backup and restore mode sets
//!
//! A mode is a set of named stages tested by membership. `ALL`,
//! `ALL_OVERWRITE` and `ALL_CLEAN` are ordinary sets built from the same tags.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::VaultError;

/// Stages a backup can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackupStage {
    Files,
    Database,
}

/// Stages and destructive pre-steps a restore can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestoreStep {
    Files,
    Database,
    RemoveFilesBeforeRestore,
    DeleteDatabaseBeforeRestore,
}

/// Set of [`BackupStage`]s
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupMode(BTreeSet<BackupStage>);

impl BackupMode {
    pub fn all() -> Self {
        [BackupStage::Files, BackupStage::Database].into_iter().collect()
    }

    pub fn files_only() -> Self {
        [BackupStage::Files].into_iter().collect()
    }

    pub fn database_only() -> Self {
        [BackupStage::Database].into_iter().collect()
    }

    pub fn contains(&self, stage: BackupStage) -> bool {
        self.0.contains(&stage)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<BackupStage> for BackupMode {
    fn from_iter<I: IntoIterator<Item = BackupStage>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Set of [`RestoreStep`]s
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreMode(BTreeSet<RestoreStep>);

impl RestoreMode {
    /// Files and database, without destructive pre-steps
    pub fn all_overwrite() -> Self {
        [RestoreStep::Files, RestoreStep::Database].into_iter().collect()
    }

    /// Files and database, wiping both targets first
    pub fn all_clean() -> Self {
        [
            RestoreStep::Files,
            RestoreStep::Database,
            RestoreStep::RemoveFilesBeforeRestore,
            RestoreStep::DeleteDatabaseBeforeRestore,
        ]
        .into_iter()
        .collect()
    }

    pub fn files_only() -> Self {
        [RestoreStep::Files].into_iter().collect()
    }

    pub fn database_only() -> Self {
        [RestoreStep::Database].into_iter().collect()
    }

    pub fn contains(&self, step: RestoreStep) -> bool {
        self.0.contains(&step)
    }

    pub fn with(mut self, step: RestoreStep) -> Self {
        self.0.insert(step);
        self
    }

    /// True when at least one of the two stages is selected
    pub fn has_stage(&self) -> bool {
        self.contains(RestoreStep::Files) || self.contains(RestoreStep::Database)
    }
}

impl FromIterator<RestoreStep> for RestoreMode {
    fn from_iter<I: IntoIterator<Item = RestoreStep>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Stage selector as given on the command line: `files`, `db` or `all`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StageSelector {
    Files,
    Database,
    #[default]
    All,
}

impl StageSelector {
    pub fn backup_mode(self) -> BackupMode {
        match self {
            StageSelector::Files => BackupMode::files_only(),
            StageSelector::Database => BackupMode::database_only(),
            StageSelector::All => BackupMode::all(),
        }
    }

    pub fn restore_mode(self) -> RestoreMode {
        match self {
            StageSelector::Files => RestoreMode::files_only(),
            StageSelector::Database => RestoreMode::database_only(),
            StageSelector::All => RestoreMode::all_overwrite(),
        }
    }
}

impl FromStr for StageSelector {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "files" => Ok(StageSelector::Files),
            "db" | "database" => Ok(StageSelector::Database),
            "all" => Ok(StageSelector::All),
            other => Err(VaultError::invalid(format!(
                "unknown mode '{}', expected files, db or all",
                other
            ))),
        }
    }
}

impl fmt::Display for StageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageSelector::Files => "files",
            StageSelector::Database => "db",
            StageSelector::All => "all",
        };
        write!(f, "{}", s)
    }
}

//! Error types for sitevault
//!
//! Every failure reaches the caller as a distinct, typed variant. Nothing is
//! retried and nothing is downgraded to a generic error. Codes follow the
//! `VAULT_CATEGORY_NAME` format so operators can grep for them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::process::CommandOutput;

/// Result type for sitevault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors raised by the backup and restore core.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The site's config file is not where the descriptor says it is
    #[error("config file not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    /// The dump tool or admin client could not be located or started
    #[error("{program} could not be started; is it installed?")]
    ToolNotFound {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The dump tool ran and exited non-zero
    #[error("database dump failed ({}): {}", output.status_label(), output.stderr_lossy().trim())]
    DumpFailed { output: CommandOutput },

    /// The admin client ran and exited non-zero
    #[error("database restore failed during {step} ({}): {}", output.status_label(), output.stderr_lossy().trim())]
    RestoreFailed {
        step: &'static str,
        output: CommandOutput,
    },

    /// The archive to restore from does not exist
    #[error("archive not found: {}", path.display())]
    ArchiveNotFound { path: PathBuf },

    /// Malformed descriptor or missing required parameter
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed settings file
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem failure
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl VaultError {
    pub fn invalid(message: impl Into<String>) -> Self {
        VaultError::InvalidArgument(message.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        VaultError::Io {
            context: context.into(),
            source,
        }
    }

    /// I/O error at a specific path
    pub fn io_at(path: &std::path::Path, source: io::Error) -> Self {
        Self::io(format!("I/O error at {}", path.display()), source)
    }

    /// Stable error code string
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::ConfigNotFound { .. } => "VAULT_CONFIG_NOT_FOUND",
            VaultError::ToolNotFound { .. } => "VAULT_TOOL_NOT_FOUND",
            VaultError::DumpFailed { .. } => "VAULT_DUMP_FAILED",
            VaultError::RestoreFailed { .. } => "VAULT_RESTORE_FAILED",
            VaultError::ArchiveNotFound { .. } => "VAULT_ARCHIVE_NOT_FOUND",
            VaultError::InvalidArgument(_) => "VAULT_INVALID_ARGUMENT",
            VaultError::Config(_) => "VAULT_CONFIG_ERROR",
            VaultError::Io { .. } => "VAULT_IO",
        }
    }

    /// Process exit code the CLI reports for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            VaultError::Io { .. } => 1,
            VaultError::ConfigNotFound { .. } | VaultError::Config(_) => 2,
            VaultError::ToolNotFound { .. } => 3,
            VaultError::DumpFailed { .. } | VaultError::RestoreFailed { .. } => 4,
            VaultError::InvalidArgument(_) => 5,
            VaultError::ArchiveNotFound { .. } => 6,
        }
    }

    /// Captured process output, for failures that carry one
    pub fn command_output(&self) -> Option<&CommandOutput> {
        match self {
            VaultError::DumpFailed { output } | VaultError::RestoreFailed { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }
}

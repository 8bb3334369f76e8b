//! Per-run scratch directory
//!
//! Each orchestrator owns one [`Workspace`]. The dump file lives here between
//! stages. The directory is removed when the workspace is dropped, on success,
//! on error and while unwinding from a panic.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{VaultError, VaultResult};

/// Temporary directory deleted on drop
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `root`
    pub fn create_in(root: &Path) -> VaultResult<Self> {
        let path = root.join(format!("sitevault-{}", Uuid::new_v4()));

        fs::create_dir_all(&path).map_err(|e| {
            VaultError::io(
                format!("Failed to create workspace directory: {}", path.display()),
                e,
            )
        })?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of `name` inside the workspace
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

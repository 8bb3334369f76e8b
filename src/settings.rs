//! Tool settings
//!
//! Optional JSON file, every field defaulted:
//!
//! ```json
//! {
//!   "dump_program": "mysqldump",
//!   "client_program": "mysql",
//!   "config_file_name": "wp-config.php",
//!   "workspace_root": "/var/tmp"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::site::DEFAULT_CONFIG_FILE_NAME;

/// Settings shared by backup and restore
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Program producing the SQL dump on stdout
    #[serde(default = "default_dump_program")]
    pub dump_program: String,

    /// Administrative database client
    #[serde(default = "default_client_program")]
    pub client_program: String,

    /// Name of the site's config file inside the site directory
    #[serde(default = "default_config_file_name")]
    pub config_file_name: String,

    /// Parent directory for per-run workspaces (default: system temp dir)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

fn default_dump_program() -> String {
    "mysqldump".to_string()
}
fn default_client_program() -> String {
    "mysql".to_string()
}
fn default_config_file_name() -> String {
    DEFAULT_CONFIG_FILE_NAME.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dump_program: default_dump_program(),
            client_program: default_client_program(),
            config_file_name: default_config_file_name(),
            workspace_root: None,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> VaultResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            VaultError::Config(format!("Failed to read settings {}: {}", path.display(), e))
        })?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| VaultError::Config(format!("Invalid settings JSON: {}", e)))?;

        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> VaultResult<()> {
        if self.dump_program.trim().is_empty() {
            return Err(VaultError::Config("dump_program must not be empty".into()));
        }
        if self.client_program.trim().is_empty() {
            return Err(VaultError::Config("client_program must not be empty".into()));
        }
        if self.config_file_name.is_empty() || self.config_file_name.contains('/') {
            return Err(VaultError::Config(format!(
                "config_file_name must be a plain file name, got '{}'",
                self.config_file_name
            )));
        }
        Ok(())
    }

    /// Directory under which run workspaces are created
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

//! Partial config rewrite after restore
//!
//! Only keys the descriptor supplies a non-empty value for are written. An
//! absent or empty field leaves the existing definition untouched, so a restore
//! never blanks out a setting the caller did not ask to change.

use crate::error::VaultResult;

use super::config::ConfigStore;
use super::SiteDescriptor;

pub const KEY_DB_HOST: &str = "DB_HOST";
pub const KEY_DB_NAME: &str = "DB_NAME";
pub const KEY_DB_USER: &str = "DB_USER";
pub const KEY_DB_PASSWORD: &str = "DB_PASSWORD";
pub const KEY_WP_SITEURL: &str = "WP_SITEURL";
pub const KEY_WP_HOME: &str = "WP_HOME";

/// A single pending `set` against the config store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub key: &'static str,
    pub value: String,
}

impl ConfigUpdate {
    fn new(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    /// Whether the value should be kept out of logs
    pub fn is_secret(&self) -> bool {
        self.key == KEY_DB_PASSWORD
    }
}

/// Updates implied by `site`, in a fixed key order
pub fn planned_updates(site: &SiteDescriptor) -> Vec<ConfigUpdate> {
    let mut updates = Vec::new();

    if let Some(host) = site.db_host_setting() {
        updates.push(ConfigUpdate::new(KEY_DB_HOST, host));
    }
    if let Some(name) = site.db_name() {
        updates.push(ConfigUpdate::new(KEY_DB_NAME, name));
    }
    if let Some(user) = site.credentials().username() {
        updates.push(ConfigUpdate::new(KEY_DB_USER, user));
    }
    if let Some(password) = site.credentials().password() {
        updates.push(ConfigUpdate::new(KEY_DB_PASSWORD, password));
    }
    if let Some(url) = site.site_url() {
        updates.push(ConfigUpdate::new(KEY_WP_SITEURL, url));
    }
    if let Some(home) = site.site_home() {
        updates.push(ConfigUpdate::new(KEY_WP_HOME, home));
    }

    updates
}

/// Apply `updates` to `store`, stopping at the first failed write
pub fn apply_updates<S: ConfigStore + ?Sized>(
    store: &mut S,
    updates: &[ConfigUpdate],
) -> VaultResult<()> {
    for update in updates {
        store.set(update.key, &update.value)?;
    }
    Ok(())
}

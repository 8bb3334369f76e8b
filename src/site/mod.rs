//! Site descriptor
//!
//! A [`SiteDescriptor`] names where a WordPress site lives on disk and how to
//! reach its database. It is built once per invocation, either field by field
//! through [`SiteDescriptorBuilder`] or by reading the site's `wp-config.php`.
//!
//! Invariant: `site_path` is always a directory. The config file is always
//! `site_path/<config file name>`, never the descriptor's path itself.

pub mod config;
pub mod rewrite;

use std::path::{Path, PathBuf};

use crate::error::{VaultError, VaultResult};

use config::{ConfigStore, WpConfigFile};

/// Port used when neither the caller nor `DB_HOST` names one
pub const DEFAULT_DB_PORT: u16 = 3306;

/// File name of the site's configuration file
pub const DEFAULT_CONFIG_FILE_NAME: &str = "wp-config.php";

/// Database username and password.
///
/// Either part may be absent, and absence is distinct from an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn from_parts(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    /// Username, if present and non-empty
    pub fn username(&self) -> Option<&str> {
        non_empty(&self.username)
    }

    /// Password, if present and non-empty
    pub fn password(&self) -> Option<&str> {
        non_empty(&self.password)
    }

    /// True when neither part carries a usable value
    pub fn is_empty(&self) -> bool {
        self.username().is_none() && self.password().is_none()
    }

    /// Field-wise overlay: values present here win over `base`
    pub fn or(&self, base: &Credentials) -> Credentials {
        Credentials {
            username: pick(&self.username, &base.username),
            password: pick(&self.password, &base.password),
        }
    }
}

/// Identity, location and database connection of one site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteDescriptor {
    site_home: Option<String>,
    site_url: Option<String>,
    site_path: PathBuf,
    config_file_name: String,
    db_host: Option<String>,
    db_port: u16,
    db_socket: Option<String>,
    db_name: Option<String>,
    credentials: Credentials,
    admin_credentials: Option<Credentials>,
}

impl SiteDescriptor {
    /// Start building a descriptor for the site at `site_path`
    pub fn builder(site_path: impl Into<PathBuf>) -> SiteDescriptorBuilder {
        SiteDescriptorBuilder::new(site_path)
    }

    /// Read the descriptor from the config file under `site_path`.
    ///
    /// `site_path` may point at the site directory or at the config file.
    pub fn from_site_path(site_path: &Path, config_file_name: &str) -> VaultResult<Self> {
        let dir = normalize_site_path(site_path, config_file_name);
        let config = WpConfigFile::open(&dir.join(config_file_name))?;
        Self::from_config_store(&config, &dir, config_file_name)
    }

    /// Derive a descriptor from the values held by a config store
    pub fn from_config_store<S: ConfigStore + ?Sized>(
        store: &S,
        site_path: &Path,
        config_file_name: &str,
    ) -> VaultResult<Self> {
        let mut builder = Self::builder(site_path)
            .config_file_name(config_file_name)
            .credentials(Credentials::from_parts(
                store.get(rewrite::KEY_DB_USER),
                store.get(rewrite::KEY_DB_PASSWORD),
            ));

        if let Some(home) = store.get(rewrite::KEY_WP_HOME) {
            builder = builder.site_home(home);
        }
        if let Some(url) = store.get(rewrite::KEY_WP_SITEURL) {
            builder = builder.site_url(url);
        }
        if let Some(host) = store.get(rewrite::KEY_DB_HOST) {
            builder = builder.db_host(host);
        }
        if let Some(name) = store.get(rewrite::KEY_DB_NAME) {
            builder = builder.db_name(name);
        }

        builder.build()
    }

    /// Layer this descriptor's non-empty connection fields over `base`.
    ///
    /// Used by restore to work out which database the restored config points
    /// at once any overrides are applied. The port and socket follow the host
    /// they came with.
    pub fn overlay(&self, base: &SiteDescriptor) -> SiteDescriptor {
        let (db_host, db_port, db_socket) = match self.db_host() {
            Some(host) => (Some(host.to_string()), self.db_port, self.db_socket.clone()),
            None => (base.db_host.clone(), base.db_port, base.db_socket.clone()),
        };

        SiteDescriptor {
            site_home: pick(&self.site_home, &base.site_home),
            site_url: pick(&self.site_url, &base.site_url),
            site_path: self.site_path.clone(),
            config_file_name: self.config_file_name.clone(),
            db_host,
            db_port,
            db_socket,
            db_name: pick(&self.db_name, &base.db_name),
            credentials: self.credentials.or(&base.credentials),
            admin_credentials: self
                .admin_credentials
                .clone()
                .or_else(|| base.admin_credentials.clone()),
        }
    }

    pub fn site_home(&self) -> Option<&str> {
        non_empty(&self.site_home)
    }

    pub fn site_url(&self) -> Option<&str> {
        non_empty(&self.site_url)
    }

    pub fn site_path(&self) -> &Path {
        &self.site_path
    }

    pub fn config_file_name(&self) -> &str {
        &self.config_file_name
    }

    /// Full path of the site's config file
    pub fn config_path(&self) -> PathBuf {
        self.site_path.join(&self.config_file_name)
    }

    pub fn db_host(&self) -> Option<&str> {
        non_empty(&self.db_host)
    }

    pub fn db_port(&self) -> u16 {
        self.db_port
    }

    /// Unix socket path given as `DB_HOST=host:/path/to.sock`
    pub fn db_socket(&self) -> Option<&str> {
        non_empty(&self.db_socket)
    }

    /// `DB_HOST` value for the config file, or `None` without a host
    pub fn db_host_setting(&self) -> Option<String> {
        let host = self.db_host()?;
        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host.to_string()
        };
        Some(match self.db_socket() {
            Some(socket) => format!("{}:{}", host, socket),
            None => format!("{}:{}", host, self.db_port),
        })
    }

    pub fn db_name(&self) -> Option<&str> {
        non_empty(&self.db_name)
    }

    /// Database name, or `InvalidArgument` when the descriptor has none
    pub fn require_db_name(&self) -> VaultResult<&str> {
        self.db_name()
            .ok_or_else(|| VaultError::invalid("no database name is configured for this site"))
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Admin credentials, falling back to the site credentials when unset
    pub fn admin_credentials(&self) -> &Credentials {
        self.admin_credentials.as_ref().unwrap_or(&self.credentials)
    }
}

/// Field-by-field construction of a [`SiteDescriptor`]
#[derive(Debug, Clone)]
pub struct SiteDescriptorBuilder {
    site_path: PathBuf,
    config_file_name: String,
    site_home: Option<String>,
    site_url: Option<String>,
    db_host: Option<String>,
    db_port: Option<u16>,
    db_name: Option<String>,
    credentials: Credentials,
    admin_credentials: Option<Credentials>,
}

impl SiteDescriptorBuilder {
    fn new(site_path: impl Into<PathBuf>) -> Self {
        Self {
            site_path: site_path.into(),
            config_file_name: DEFAULT_CONFIG_FILE_NAME.to_string(),
            site_home: None,
            site_url: None,
            db_host: None,
            db_port: None,
            db_name: None,
            credentials: Credentials::default(),
            admin_credentials: None,
        }
    }

    pub fn config_file_name(mut self, name: impl Into<String>) -> Self {
        self.config_file_name = name.into();
        self
    }

    pub fn site_home(mut self, home: impl Into<String>) -> Self {
        self.site_home = Some(home.into());
        self
    }

    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    /// Database host; a trailing `:port` is split off at build time
    pub fn db_host(mut self, host: impl Into<String>) -> Self {
        self.db_host = Some(host.into());
        self
    }

    pub fn db_port(mut self, port: u16) -> Self {
        self.db_port = Some(port);
        self
    }

    pub fn db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = Some(name.into());
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn admin_credentials(mut self, credentials: Credentials) -> Self {
        self.admin_credentials = Some(credentials);
        self
    }

    pub fn build(self) -> VaultResult<SiteDescriptor> {
        if self.config_file_name.is_empty() {
            return Err(VaultError::invalid("config file name must not be empty"));
        }

        let site_path = normalize_site_path(&self.site_path, &self.config_file_name);
        if site_path.exists() && !site_path.is_dir() {
            return Err(VaultError::invalid(format!(
                "site path is not a directory: {}",
                site_path.display()
            )));
        }

        let address = match self.db_host.as_deref() {
            Some(raw) => DbAddress::parse(raw)?,
            None => DbAddress::default(),
        };

        // an explicit port wins over one embedded in the host string
        let db_port = self.db_port.or(address.port).unwrap_or(DEFAULT_DB_PORT);

        Ok(SiteDescriptor {
            site_home: self.site_home,
            site_url: self.site_url,
            site_path,
            config_file_name: self.config_file_name,
            db_host: address.host,
            db_port,
            db_socket: address.socket,
            db_name: self.db_name,
            credentials: self.credentials,
            admin_credentials: self.admin_credentials,
        })
    }
}

/// Parts of a `DB_HOST` value.
///
/// Accepted forms: `host`, `host:port`, `host:/socket/path`,
/// `host:port:/socket/path`, `[v6]`, `[v6]:port` and a bare IPv6 address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbAddress {
    /// Host name or address, IPv6 brackets stripped
    pub host: Option<String>,
    pub port: Option<u16>,
    pub socket: Option<String>,
}

impl DbAddress {
    pub fn parse(raw: &str) -> VaultResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }

        let (rest, socket) = match raw.find(":/") {
            Some(at) => (&raw[..at], Some(raw[at + 1..].to_string())),
            None => (raw, None),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(|| {
                VaultError::invalid(format!("unclosed '[' in database host '{}'", raw))
            })?;
            match tail {
                "" => (host, None),
                _ => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(parse_port(port, raw)?)),
                    None => {
                        return Err(VaultError::invalid(format!(
                            "invalid database host '{}'",
                            raw
                        )))
                    }
                },
            }
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, Some(parse_port(port, raw)?)),
                _ => (rest, None),
            }
        };

        Ok(Self {
            host: Some(host.to_string()).filter(|h| !h.is_empty()),
            port,
            socket,
        })
    }
}

fn parse_port(port: &str, raw: &str) -> VaultResult<u16> {
    port.parse::<u16>()
        .map_err(|_| VaultError::invalid(format!("invalid database port in '{}'", raw)))
}

fn normalize_site_path(path: &Path, config_file_name: &str) -> PathBuf {
    if path.file_name().map_or(false, |n| n == config_file_name) {
        path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf()
    } else {
        path.to_path_buf()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn pick(preferred: &Option<String>, fallback: &Option<String>) -> Option<String> {
    non_empty(preferred)
        .map(str::to_string)
        .or_else(|| fallback.clone())
}

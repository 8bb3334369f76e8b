//! Key/value access to a site's configuration file
//!
//! [`ConfigStore`] is the only view the core has of the config file: `get` a
//! key, `set` a key. [`WpConfigFile`] implements it over the
//! `define( 'KEY', 'value' );` statements of a `wp-config.php`. Lines that are
//! not touched by a `set` are preserved byte for byte.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{VaultError, VaultResult};

/// Read/write access to key-defined settings
pub trait ConfigStore {
    /// Current value of `key`, if defined
    fn get(&self, key: &str) -> Option<String>;

    /// Define `key` as `value`, replacing any existing definition
    fn set(&mut self, key: &str, value: &str) -> VaultResult<()>;
}

impl ConfigStore for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        BTreeMap::get(self, key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> VaultResult<()> {
        self.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn define_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"define\(\s*['"]([A-Za-z_][A-Za-z0-9_]*)['"]\s*,\s*('(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*"|[^;]*?)\s*\)\s*;"#,
        )
        .expect("define() pattern is valid")
    })
}

/// Marker line WordPress places after the user-editable settings
const STOP_EDITING_MARKER: &str = "That's all, stop editing!";

/// A `wp-config.php` file opened for reading and in-place updates.
///
/// Every `set` is written back to disk immediately.
#[derive(Debug, Clone)]
pub struct WpConfigFile {
    path: PathBuf,
    contents: String,
}

impl WpConfigFile {
    /// Open the config file at `path`
    ///
    /// A missing file is `ConfigNotFound`.
    pub fn open(path: &Path) -> VaultResult<Self> {
        if !path.is_file() {
            return Err(VaultError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = fs::read_to_string(path).map_err(|e| VaultError::io_at(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            contents,
        })
    }

    /// Byte range of the value literal for the live definition of `key`,
    /// with the literal itself. Commented-out definitions are ignored.
    fn find(&self, key: &str) -> Option<(Range<usize>, &str)> {
        define_pattern()
            .captures_iter(&self.contents)
            .filter(|caps| &caps[1] == key)
            .find(|caps| caps.get(0).map_or(false, |m| !is_commented(&self.contents, m.start())))
            .and_then(|caps| caps.get(2))
            .map(|m| (m.range(), m.as_str()))
    }

    fn insert_definition(&mut self, key: &str, literal: &str) {
        let line = format!("define( '{}', {} );\n", key, literal);

        let anchor = self
            .contents
            .find(STOP_EDITING_MARKER)
            .or_else(|| self.contents.find("require_once"))
            .map(|pos| self.contents[..pos].rfind('\n').map_or(0, |nl| nl + 1));

        match anchor {
            Some(at) => self.contents.insert_str(at, &line),
            None => {
                if !self.contents.is_empty() && !self.contents.ends_with('\n') {
                    self.contents.push('\n');
                }
                self.contents.push_str(&line);
            }
        }
    }

    /// Write the current contents back, replacing the file atomically
    fn persist(&self) -> VaultResult<()> {
        let tmp_path = self.path.with_extension("php.sitevault-tmp");

        let mut file = fs::File::create(&tmp_path).map_err(|e| VaultError::io_at(&tmp_path, e))?;
        file.write_all(self.contents.as_bytes())
            .map_err(|e| VaultError::io_at(&tmp_path, e))?;
        file.sync_all().map_err(|e| VaultError::io_at(&tmp_path, e))?;

        if let Ok(metadata) = fs::metadata(&self.path) {
            let _ = fs::set_permissions(&tmp_path, metadata.permissions());
        }

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            VaultError::io(
                format!("Failed to replace config file: {}", self.path.display()),
                e,
            )
        })
    }
}

impl ConfigStore for WpConfigFile {
    fn get(&self, key: &str) -> Option<String> {
        self.find(key).map(|(_, literal)| decode_literal(literal))
    }

    fn set(&mut self, key: &str, value: &str) -> VaultResult<()> {
        let literal = encode_literal(value);

        match self.find(key).map(|(range, _)| range) {
            Some(range) => self.contents.replace_range(range, &literal),
            None => self.insert_definition(key, &literal),
        }

        self.persist()
    }
}

/// True if `pos` sits in a `//` or `#` line comment or an open `/* */` block
fn is_commented(contents: &str, pos: usize) -> bool {
    let before = &contents[..pos];
    let line = &before[before.rfind('\n').map_or(0, |nl| nl + 1)..];
    let line = line.trim_start();
    if line.starts_with("//") || line.starts_with('#') {
        return true;
    }

    match before.rfind("/*") {
        Some(open) => before.rfind("*/").map_or(true, |close| close < open),
        None => false,
    }
}

/// PHP literal to plain value; bare literals (`true`, `42`) come back verbatim
fn decode_literal(literal: &str) -> String {
    let quote = match literal.chars().next() {
        Some(q @ ('\'' | '"')) if literal.len() >= 2 && literal.ends_with(q) => q,
        _ => return literal.to_string(),
    };

    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next) if next == quote || next == '\\' || (quote == '"' && next == '$') => {
                out.push(next)
            }
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Plain value to a single-quoted PHP literal
fn encode_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

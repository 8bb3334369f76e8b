//! Site archive codec
//!
//! A site archive is a gzip-compressed tar with exactly two logical roots:
//!
//! ```text
//! backup.tar.gz
//! ├── database.sql        (present when the database was dumped)
//! └── wp-root/            (present when the files were backed up)
//!     ├── wp-config.php
//!     └── ...
//! ```
//!
//! The write path always uses these fixed names, whatever the real source
//! paths are, so no local path ever ends up in an archive. The read path
//! selects members by name, never by position or count: files-only and
//! database-only archives are both valid.

mod reader;
mod writer;

pub use reader::{ArchiveReader, ExtractSummary};
pub use writer::{remove_partial_archive, ArchiveWriter, TreeStats};

use std::path::{Component, Path, PathBuf};

/// Archive name of the database dump
pub const DUMP_ARCNAME: &str = "database.sql";

/// Archive name of the site directory root
pub const SITE_ROOT_ARCNAME: &str = "wp-root";

/// What an archive member is, judged by its path alone
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    /// The database dump
    Dump,
    /// The `wp-root` directory entry itself
    SiteRoot,
    /// Something under `wp-root/`, with the prefix stripped
    SiteEntry(PathBuf),
    /// Under `wp-root/` but would resolve outside it
    Unsafe,
    /// Not part of the recognized layout
    Foreign,
}

/// Classify an archive member path
pub fn classify_member(member: &Path) -> MemberKind {
    // tar writers commonly prefix members with "./"
    let normalized: PathBuf = member
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if normalized == Path::new(DUMP_ARCNAME) {
        return MemberKind::Dump;
    }

    let rest = match normalized.strip_prefix(SITE_ROOT_ARCNAME) {
        Ok(rest) => rest,
        Err(_) => return MemberKind::Foreign,
    };

    if rest.as_os_str().is_empty() {
        return MemberKind::SiteRoot;
    }

    if rest.components().all(|c| matches!(c, Component::Normal(_))) {
        MemberKind::SiteEntry(rest.to_path_buf())
    } else {
        MemberKind::Unsafe
    }
}

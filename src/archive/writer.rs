//! Archive creation
//!
//! - gzip-compressed tar
//! - Fixed arcnames for both roots
//! - Site entries in sorted order, so the same tree always yields the same
//!   entry sequence
//! - Symlinks stored as links, never followed
//! - The archive file itself is never added, even when it lives inside the
//!   site directory
//! - fsync archive after creation

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::Builder;

use crate::error::{VaultError, VaultResult};

use super::{DUMP_ARCNAME, SITE_ROOT_ARCNAME};

/// Counts from adding a site tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Entries written under the site root, the root itself excluded
    pub entries: usize,
    /// Sockets and other special files left out
    pub skipped: usize,
}

/// A site archive open for writing
pub struct ArchiveWriter {
    path: PathBuf,
    /// Resolved location of the archive file, for skipping it in the tree
    canonical: PathBuf,
    builder: Builder<GzEncoder<BufWriter<File>>>,
}

impl ArchiveWriter {
    /// Create (or truncate) the archive at `path`
    pub fn create(path: &Path) -> VaultResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    VaultError::io(
                        format!("Failed to create archive directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let file = File::create(path).map_err(|e| {
            VaultError::io(format!("Failed to create archive file: {}", path.display()), e)
        })?;

        let canonical = fs::canonicalize(path).map_err(|e| VaultError::io_at(path, e))?;

        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);

        Ok(Self {
            path: path.to_path_buf(),
            canonical,
            builder,
        })
    }

    /// Add the dump file under [`DUMP_ARCNAME`]
    pub fn append_dump(&mut self, dump_path: &Path) -> VaultResult<()> {
        self.builder
            .append_path_with_name(dump_path, DUMP_ARCNAME)
            .map_err(|e| {
                VaultError::io(
                    format!("Failed to add database dump to archive: {}", dump_path.display()),
                    e,
                )
            })
    }

    /// Add the full site directory under [`SITE_ROOT_ARCNAME`]
    pub fn append_site_tree(&mut self, site_dir: &Path) -> VaultResult<TreeStats> {
        if !site_dir.is_dir() {
            return Err(VaultError::invalid(format!(
                "site directory does not exist: {}",
                site_dir.display()
            )));
        }

        self.builder
            .append_dir(SITE_ROOT_ARCNAME, site_dir)
            .map_err(|e| VaultError::io("Failed to add site root to archive", e))?;

        let mut entries = Vec::new();
        collect_entries_recursive(site_dir, Path::new(""), &mut entries)?;

        let mut stats = TreeStats::default();
        for (relative, fs_path, kind) in entries {
            if kind == EntryKind::Special {
                stats.skipped += 1;
                continue;
            }
            if kind == EntryKind::File && self.is_archive_file(&fs_path) {
                continue;
            }

            let arcname = Path::new(SITE_ROOT_ARCNAME).join(&relative);
            self.builder
                .append_path_with_name(&fs_path, &arcname)
                .map_err(|e| {
                    VaultError::io(
                        format!("Failed to add {} to archive", fs_path.display()),
                        e,
                    )
                })?;
            stats.entries += 1;
        }

        Ok(stats)
    }

    fn is_archive_file(&self, fs_path: &Path) -> bool {
        fs::canonicalize(fs_path)
            .map(|resolved| resolved == self.canonical)
            .unwrap_or(false)
    }

    /// Finish the tar stream, the gzip stream and fsync the file
    pub fn finish(self) -> VaultResult<()> {
        let path = self.path;

        let encoder = self
            .builder
            .into_inner()
            .map_err(|e| VaultError::io("Failed to finish archive", e))?;

        let writer = encoder
            .finish()
            .map_err(|e| VaultError::io("Failed to finish gzip stream", e))?;

        let file = writer.into_inner().map_err(|e| {
            VaultError::io("Failed to flush archive buffer", e.into_error())
        })?;

        file.sync_all().map_err(|e| {
            VaultError::io(format!("Failed to fsync archive: {}", path.display()), e)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Symlink,
    Special,
}

fn collect_entries_recursive(
    current_dir: &Path,
    prefix: &Path,
    entries: &mut Vec<(PathBuf, PathBuf, EntryKind)>,
) -> VaultResult<()> {
    let mut dir_entries: Vec<_> = fs::read_dir(current_dir)
        .map_err(|e| VaultError::io_at(current_dir, e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| VaultError::io_at(current_dir, e))?;

    // Sort by file name for deterministic ordering
    dir_entries.sort_by_key(|entry| entry.file_name());

    for entry in dir_entries {
        let fs_path = entry.path();
        let relative = prefix.join(entry.file_name());

        let file_type = entry
            .file_type()
            .map_err(|e| VaultError::io_at(&fs_path, e))?;

        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Special
        };

        entries.push((relative.clone(), fs_path.clone(), kind));

        if kind == EntryKind::Dir {
            collect_entries_recursive(&fs_path, &relative, entries)?;
        }
    }

    Ok(())
}

/// Remove an archive left behind by a failed write
pub fn remove_partial_archive(path: &Path) {
    if path.exists() {
        let _ = fs::remove_file(path);
    }
}

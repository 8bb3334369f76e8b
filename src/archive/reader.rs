//! Archive extraction
//!
//! Members are selected by name. Only entries under `wp-root/` are ever
//! written below the destination, and only when every path component is a
//! plain name. Device files and members whose parent on disk is a symlink
//! are skipped rather than followed. A hard link is recreated only when its
//! target is a `wp-root/` member already written by the same extraction.
//!
//! Directories are created writable during the pass and get their archived
//! mode once every member is in place, so read-only directories round-trip.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::error::{VaultError, VaultResult};

use super::{classify_member, MemberKind, DUMP_ARCNAME};

type ArchiveStream = Archive<GzDecoder<BufReader<File>>>;

/// Outcome of extracting the site tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Entries written below the destination
    pub extracted: usize,
    /// Members left out, with the reason
    pub skipped: Vec<(PathBuf, &'static str)>,
}

/// A site archive open for reading
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    path: PathBuf,
}

impl ArchiveReader {
    /// Open the archive at `path`
    ///
    /// # Errors
    ///
    /// `ArchiveNotFound` when `path` is not an existing file.
    pub fn open(path: &Path) -> VaultResult<Self> {
        if !path.is_file() {
            return Err(VaultError::ArchiveNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn stream(&self) -> VaultResult<ArchiveStream> {
        let file = File::open(&self.path).map_err(|e| {
            VaultError::io(format!("Failed to open archive: {}", self.path.display()), e)
        })?;
        Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
    }

    /// Member paths in archive order
    pub fn members(&self) -> VaultResult<Vec<PathBuf>> {
        let mut archive = self.stream()?;
        let mut members = Vec::new();

        for entry in archive.entries().map_err(|e| self.read_error(e))? {
            let entry = entry.map_err(|e| self.read_error(e))?;
            members.push(entry.path().map_err(|e| self.read_error(e))?.into_owned());
        }

        Ok(members)
    }

    /// Extract every `wp-root/` member into `dest`
    pub fn extract_site_tree(&self, dest: &Path) -> VaultResult<ExtractSummary> {
        fs::create_dir_all(dest).map_err(|e| {
            VaultError::io(format!("Failed to create site directory: {}", dest.display()), e)
        })?;

        let mut archive = self.stream()?;
        archive.set_overwrite(true);

        let mut summary = ExtractSummary::default();
        let mut written: HashSet<PathBuf> = HashSet::new();
        let mut directories: Vec<(PathBuf, u32)> = Vec::new();

        for entry in archive.entries().map_err(|e| self.read_error(e))? {
            let mut entry = entry.map_err(|e| self.read_error(e))?;
            let member = entry.path().map_err(|e| self.read_error(e))?.into_owned();

            let relative = match classify_member(&member) {
                MemberKind::SiteEntry(relative) => relative,
                MemberKind::SiteRoot | MemberKind::Dump => continue,
                MemberKind::Unsafe => {
                    summary.skipped.push((member, "escapes site root"));
                    continue;
                }
                MemberKind::Foreign => {
                    summary.skipped.push((member, "outside archive layout"));
                    continue;
                }
            };

            let entry_type = entry.header().entry_type();
            if !entry_type.is_hard_link() && !is_supported(entry_type) {
                summary.skipped.push((member, "special file"));
                continue;
            }
            if has_symlink_ancestor(dest, &relative) {
                summary.skipped.push((member, "parent is a symlink"));
                continue;
            }

            let link_source = if entry_type.is_hard_link() {
                let link_name = entry
                    .link_name()
                    .map_err(|e| self.read_error(e))?
                    .map(|name| name.into_owned());
                match link_name.map(|name| classify_member(&name)) {
                    Some(MemberKind::SiteEntry(source)) if written.contains(&source) => Some(source),
                    _ => {
                        summary.skipped.push((member, "hard link"));
                        continue;
                    }
                }
            } else {
                None
            };

            let target = dest.join(&relative);
            prepare_target(&target)?;

            if let Some(source) = link_source {
                link_member(&dest.join(&source), &target)?;
                written.insert(relative);
            } else if entry_type.is_dir() {
                let mode = entry.header().mode().map_err(|e| self.read_error(e))? & 0o777;
                create_writable_dir(&target)?;
                written.remove(&relative);
                directories.push((target, mode));
            } else {
                entry.unpack(&target).map_err(|e| {
                    VaultError::io(format!("Failed to extract {}", member.display()), e)
                })?;
                if entry_type.is_file() {
                    written.insert(relative);
                } else {
                    written.remove(&relative);
                }
            }
            summary.extracted += 1;
        }

        // Deepest first, so a read-only parent is locked after its children
        for (dir, mode) in directories.iter().rev() {
            set_dir_mode(dir, *mode)?;
        }

        Ok(summary)
    }

    /// Extract the dump into `dest_dir`, if the archive carries one
    ///
    /// Returns the path of the extracted dump, or `None` for a files-only
    /// archive.
    pub fn extract_dump(&self, dest_dir: &Path) -> VaultResult<Option<PathBuf>> {
        let mut archive = self.stream()?;

        for entry in archive.entries().map_err(|e| self.read_error(e))? {
            let mut entry = entry.map_err(|e| self.read_error(e))?;
            let kind = classify_member(&entry.path().map_err(|e| self.read_error(e))?);
            if kind != MemberKind::Dump {
                continue;
            }

            if !entry.header().entry_type().is_file() {
                return Err(VaultError::invalid(format!(
                    "archive member {} is not a regular file",
                    DUMP_ARCNAME
                )));
            }

            let target = dest_dir.join(DUMP_ARCNAME);
            entry.unpack(&target).map_err(|e| {
                VaultError::io(format!("Failed to extract {}", DUMP_ARCNAME), e)
            })?;
            return Ok(Some(target));
        }

        Ok(None)
    }

    fn read_error(&self, e: std::io::Error) -> VaultError {
        VaultError::io(format!("Failed to read archive: {}", self.path.display()), e)
    }
}

fn is_supported(entry_type: EntryType) -> bool {
    entry_type.is_file() || entry_type.is_dir() || entry_type.is_symlink()
}

/// True if some existing directory between `dest` and the member is a symlink
fn has_symlink_ancestor(dest: &Path, relative: &Path) -> bool {
    let mut current = dest.to_path_buf();
    let mut components = relative.components().peekable();

    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return true,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    false
}

fn prepare_target(target: &Path) -> VaultResult<()> {
    // Never unpack through an existing link at the final component
    if let Ok(meta) = fs::symlink_metadata(target) {
        if meta.file_type().is_symlink() {
            fs::remove_file(target).map_err(|e| VaultError::io_at(target, e))?;
        }
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| VaultError::io_at(parent, e))?;
    }

    Ok(())
}

/// Recreate an in-archive hard link, replacing whatever sits at `target`
fn link_member(source: &Path, target: &Path) -> VaultResult<()> {
    if fs::symlink_metadata(target).is_ok() {
        fs::remove_file(target).map_err(|e| VaultError::io_at(target, e))?;
    }
    fs::hard_link(source, target).map_err(|e| {
        VaultError::io(
            format!("Failed to link {} to {}", target.display(), source.display()),
            e,
        )
    })
}

#[cfg(unix)]
fn create_writable_dir(dir: &Path) -> VaultResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::create_dir_all(dir).map_err(|e| VaultError::io_at(dir, e))?;
    let meta = fs::metadata(dir).map_err(|e| VaultError::io_at(dir, e))?;
    let mode = meta.permissions().mode();
    if mode & 0o700 != 0o700 {
        fs::set_permissions(dir, fs::Permissions::from_mode(mode | 0o700))
            .map_err(|e| VaultError::io_at(dir, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn create_writable_dir(dir: &Path) -> VaultResult<()> {
    fs::create_dir_all(dir).map_err(|e| VaultError::io_at(dir, e))
}

#[cfg(unix)]
fn set_dir_mode(dir: &Path, mode: u32) -> VaultResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(dir, fs::Permissions::from_mode(mode))
        .map_err(|e| VaultError::io_at(dir, e))
}

#[cfg(not(unix))]
fn set_dir_mode(_dir: &Path, _mode: u32) -> VaultResult<()> {
    Ok(())
}

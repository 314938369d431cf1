//! Capability-scoped filesystem helpers for reading a local repository mirror.
//!
//! A mirror is opened once as a [`fs_utf8::Dir`]; every later read is
//! resolved relative to it, so repository paths cannot escape the clone.
#![forbid(unsafe_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};
use std::io;
use std::path::Component;

/// Kind of a directory entry inside a mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorEntryKind {
    /// A regular file.
    File,
    /// A directory.
    Directory,
}

/// A single child of a mirrored directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    /// File or directory name, without any parent components.
    pub name: String,
    /// Whether the entry is a file or a directory.
    pub kind: MirrorEntryKind,
}

/// Open the mirror rooted at `root`, which may be absolute or relative.
pub fn open_mirror(root: &Utf8Path) -> io::Result<fs_utf8::Dir> {
    let (base, relative) = base_dir_and_relative(root)?;
    if relative.as_str().is_empty() {
        return Ok(base);
    }
    base.open_dir(&relative)
}

/// Read a UTF-8 file at `path` relative to `mirror`.
pub fn read_utf8(mirror: &fs_utf8::Dir, path: &Utf8Path) -> io::Result<String> {
    mirror.read_to_string(strip_leading_slash(path))
}

/// Return whether `path` names a regular file inside `mirror`.
///
/// Missing paths yield `Ok(false)`; other IO failures are propagated.
pub fn file_is_file(mirror: &fs_utf8::Dir, path: &Utf8Path) -> io::Result<bool> {
    match mirror.metadata(strip_leading_slash(path)) {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// List the children of the directory at `path` inside `mirror`.
///
/// Entries are sorted by name so listings are stable across platforms.
/// Anything that is neither a file nor a directory is skipped.
pub fn list_entries(mirror: &fs_utf8::Dir, path: &Utf8Path) -> io::Result<Vec<MirrorEntry>> {
    let relative = strip_leading_slash(path);
    let dir = if relative.as_str().is_empty() {
        mirror.try_clone()?
    } else {
        mirror.open_dir(relative)?
    };
    let mut entries = Vec::new();
    for entry in dir.entries()? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let kind = if file_type.is_dir() {
            MirrorEntryKind::Directory
        } else if file_type.is_file() {
            MirrorEntryKind::File
        } else {
            continue;
        };
        entries.push(MirrorEntry {
            name: entry.file_name()?,
            kind,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn strip_leading_slash(path: &Utf8Path) -> &Utf8Path {
    Utf8Path::new(path.as_str().trim_start_matches('/'))
}

/// Split an absolute or relative path into an ambient base directory and a relative suffix.
pub fn base_dir_and_relative(path: &Utf8Path) -> io::Result<(fs_utf8::Dir, Utf8PathBuf)> {
    let std_path = path.as_std_path();

    let (base, relative) = match std_path.components().next() {
        // Windows absolute path with a drive or UNC prefix.
        Some(Component::Prefix(prefix)) => {
            let prefix_str = prefix
                .as_os_str()
                .to_str()
                .ok_or_else(|| io::Error::other("non-UTF-8 path prefix"))?;

            let base = Utf8PathBuf::from(prefix_str).join(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .or_else(|_| std_path.strip_prefix(prefix.as_os_str()))
                .map_err(|_| io::Error::other("failed to strip prefix from mirror path"))?
                .to_path_buf();
            (base, relative)
        }
        Some(Component::RootDir) => {
            let base = Utf8PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
            let relative = std_path
                .strip_prefix(base.as_std_path())
                .map_err(|_| io::Error::other("failed to strip root from absolute path"))?
                .to_path_buf();
            (base, relative)
        }
        _ => (Utf8PathBuf::from("."), std_path.to_path_buf()),
    };

    let dir = fs_utf8::Dir::open_ambient_dir(&base, ambient_authority())?;
    let relative = Utf8PathBuf::from_path_buf(relative)
        .map_err(|_| io::Error::other("non-UTF-8 mirror path"))?;

    Ok((dir, relative))
}

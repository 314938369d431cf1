//! Local-mirror source reading a clone of the repository from disk.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::Dir;
use heroes_fs::{MirrorEntryKind, file_is_file, list_entries, open_mirror, read_utf8};
use log::info;

use super::{BlobContent, EntryKind, HierarchicalSource, RepositoryDetails, SourceEntry, SourceError};

/// [`HierarchicalSource`] over `{root}/{repository name}` on the local disk.
///
/// Blobs are never truncated, so `fetch_raw_blob` returns the same text as
/// `fetch_blob`. File access runs on Tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct LocalSource {
    mirror: Arc<Dir>,
    path: Utf8PathBuf,
}

impl LocalSource {
    /// Open the mirror of `details` that lives under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingMirror`], naming the `git clone` command
    /// that would create it, when the mirror directory cannot be opened.
    pub fn open(root: &Utf8Path, details: &RepositoryDetails) -> Result<Self, SourceError> {
        let path = root.join(&details.name);
        let mirror = open_mirror(&path).map_err(|source| SourceError::MissingMirror {
            root: path.clone(),
            hint: details.clone_hint(),
            source,
        })?;
        info!(
            "using local mirror of {}/{} (branch {}) at {path}",
            details.owner, details.name, details.branch
        );
        Ok(Self {
            mirror: Arc::new(mirror),
            path,
        })
    }

    /// Directory the mirror was opened from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    async fn with_mirror<T, F>(&self, path: &str, op: F) -> Result<T, SourceError>
    where
        T: Send + 'static,
        F: FnOnce(&Dir, &Utf8Path) -> io::Result<T> + Send + 'static,
    {
        let mirror = Arc::clone(&self.mirror);
        let target = Utf8PathBuf::from(path);
        tokio::task::spawn_blocking(move || op(&mirror, &target))
            .await
            .map_err(io::Error::other)
            .and_then(|result| result)
            .map_err(|source| SourceError::Local {
                path: path.to_owned(),
                source,
            })
    }
}

#[async_trait(?Send)]
impl HierarchicalSource for LocalSource {
    async fn fetch_blob(&self, path: &str) -> Result<BlobContent, SourceError> {
        self.fetch_raw_blob(path).await.map(BlobContent::complete)
    }

    async fn fetch_tree(&self, path: &str) -> Result<Vec<SourceEntry>, SourceError> {
        let entries = self.with_mirror(path, |mirror, dir| list_entries(mirror, dir)).await?;
        Ok(entries
            .into_iter()
            .map(|entry| SourceEntry {
                name: entry.name,
                kind: match entry.kind {
                    MirrorEntryKind::File => EntryKind::Blob,
                    MirrorEntryKind::Directory => EntryKind::Tree,
                },
            })
            .collect())
    }

    async fn fetch_raw_blob(&self, path: &str) -> Result<String, SourceError> {
        // Directories yield `None`; missing paths fail inside `list_entries`.
        let text = self
            .with_mirror(path, |mirror, file| {
                if file_is_file(mirror, file)? {
                    read_utf8(mirror, file).map(Some)
                } else {
                    list_entries(mirror, file).map(|_| None)
                }
            })
            .await?;
        text.ok_or_else(|| SourceError::UnexpectedKind {
            path: path.to_owned(),
            expected: EntryKind::Blob,
        })
    }
}

//! In-memory doubles for the source, lookup and persistence seams.
//!
//! The doubles record how they were called so tests can assert on fetch counts
//! and batch sizes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::enrich::{EnrichError, ImageLookup, LookupBatch};
use crate::persist::{KvStore, PersistError};
use crate::source::{BlobContent, HierarchicalSource, SourceEntry, SourceError};

fn locked<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct StubBlob {
    text: String,
    truncated_text: Option<String>,
}

/// Calls made against a [`StubSource`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchCounts {
    /// Paths passed to `fetch_blob`, in call order.
    pub blobs: Vec<String>,
    /// Paths passed to `fetch_tree`, in call order.
    pub trees: Vec<String>,
    /// Paths passed to `fetch_raw_blob`, in call order.
    pub raw: Vec<String>,
}

/// [`HierarchicalSource`] serving files registered by path.
///
/// Trees are derived from the registered paths, so registering
/// `a/b/c.json` makes `a` and `a/b` listable.
#[derive(Debug, Default)]
pub struct StubSource {
    files: BTreeMap<String, StubBlob>,
    calls: Mutex<FetchCounts>,
}

impl StubSource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blob delivered in full by the query path.
    #[must_use]
    pub fn with_blob(mut self, path: &str, text: &str) -> Self {
        self.files.insert(
            path.to_owned(),
            StubBlob {
                text: text.to_owned(),
                truncated_text: None,
            },
        );
        self
    }

    /// Register a blob whose query result is cut to `truncated`; the raw path
    /// serves `full`.
    #[must_use]
    pub fn with_truncated_blob(mut self, path: &str, truncated: &str, full: &str) -> Self {
        self.files.insert(
            path.to_owned(),
            StubBlob {
                text: full.to_owned(),
                truncated_text: Some(truncated.to_owned()),
            },
        );
        self
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> FetchCounts {
        locked(&self.calls).clone()
    }

    /// Number of raw fetches issued for `path`.
    #[must_use]
    pub fn raw_fetches(&self, path: &str) -> usize {
        locked(&self.calls).raw.iter().filter(|p| p.as_str() == path).count()
    }

    fn blob(&self, path: &str) -> Result<&StubBlob, SourceError> {
        self.files.get(path).ok_or_else(|| SourceError::MissingObject {
            path: path.to_owned(),
        })
    }
}

#[async_trait(?Send)]
impl HierarchicalSource for StubSource {
    async fn fetch_blob(&self, path: &str) -> Result<BlobContent, SourceError> {
        locked(&self.calls).blobs.push(path.to_owned());
        let blob = self.blob(path)?;
        Ok(match &blob.truncated_text {
            Some(truncated) => BlobContent {
                text: truncated.clone(),
                truncated: true,
            },
            None => BlobContent::complete(blob.text.clone()),
        })
    }

    async fn fetch_tree(&self, path: &str) -> Result<Vec<SourceEntry>, SourceError> {
        locked(&self.calls).trees.push(path.to_owned());
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut blobs = BTreeSet::new();
        let mut trees = BTreeSet::new();
        for file in self.files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => trees.insert(dir.to_owned()),
                None => blobs.insert(rest.to_owned()),
            };
        }
        if blobs.is_empty() && trees.is_empty() {
            return Err(SourceError::MissingObject {
                path: path.to_owned(),
            });
        }
        let mut entries: Vec<SourceEntry> = trees.into_iter().map(SourceEntry::tree).collect();
        entries.extend(blobs.into_iter().map(SourceEntry::blob));
        Ok(entries)
    }

    async fn fetch_raw_blob(&self, path: &str) -> Result<String, SourceError> {
        locked(&self.calls).raw.push(path.to_owned());
        self.blob(path).map(|blob| blob.text.clone())
    }
}

/// [`ImageLookup`] answering from a fixed title map.
#[derive(Debug, Default)]
pub struct StubImageLookup {
    images: HashMap<String, String>,
    failing: bool,
    batches: Mutex<Vec<usize>>,
}

impl StubImageLookup {
    /// A lookup that knows no images.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A lookup whose every call fails with HTTP 503.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Register the URL for `title`.
    #[must_use]
    pub fn with_image(mut self, title: &str, url: &str) -> Self {
        self.images.insert(title.to_owned(), url.to_owned());
        self
    }

    /// Size of every lookup made so far, in call order.
    #[must_use]
    pub fn batch_sizes(&self) -> Vec<usize> {
        locked(&self.batches).clone()
    }
}

#[async_trait(?Send)]
impl ImageLookup for StubImageLookup {
    async fn lookup(&self, titles: &[String]) -> Result<LookupBatch, EnrichError> {
        locked(&self.batches).push(titles.len());
        if self.failing {
            return Err(EnrichError::Http {
                url: "https://wiki.example.org/api.php".to_owned(),
                status: 503,
                message: "service unavailable".to_owned(),
            });
        }
        Ok(titles
            .iter()
            .filter_map(|title| {
                self.images
                    .get(title)
                    .map(|url| (title.clone(), url.clone()))
            })
            .collect())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    hashes: HashMap<String, Vec<(String, String)>>,
    values: HashMap<String, String>,
    hset_calls: Vec<(String, usize)>,
}

/// [`KvStore`] keeping hashes and scalars in memory.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    state: Mutex<MemoryState>,
    null_reads: bool,
}

impl MemoryKvStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `HMGET` return a null result.
    #[must_use]
    pub fn with_null_reads(mut self) -> Self {
        self.null_reads = true;
        self
    }

    /// Sizes of the `HSET` calls made against hash `name`, in call order.
    #[must_use]
    pub fn hset_batch_sizes(&self, name: &str) -> Vec<usize> {
        locked(&self.state)
            .hset_calls
            .iter()
            .filter(|(hash, _)| hash == name)
            .map(|(_, size)| *size)
            .collect()
    }

    /// Names of the hashes written, in the order of their first `HSET`.
    #[must_use]
    pub fn hash_order(&self) -> Vec<String> {
        let state = locked(&self.state);
        let mut order: Vec<String> = Vec::new();
        for (hash, _) in &state.hset_calls {
            if !order.contains(hash) {
                order.push(hash.clone());
            }
        }
        order
    }

    /// Number of fields stored in hash `name`.
    #[must_use]
    pub fn hash_len(&self, name: &str) -> usize {
        locked(&self.state).hashes.get(name).map_or(0, Vec::len)
    }

    /// Raw JSON stored under field `field` of hash `name`.
    #[must_use]
    pub fn field(&self, name: &str, field: &str) -> Option<String> {
        locked(&self.state).hashes.get(name).and_then(|entries| {
            entries
                .iter()
                .find(|(key, _)| key == field)
                .map(|(_, value)| value.clone())
        })
    }

    /// Raw JSON stored under scalar `key`.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<String> {
        locked(&self.state).values.get(key).cloned()
    }
}

#[async_trait(?Send)]
impl KvStore for MemoryKvStore {
    async fn hset(&self, name: &str, entries: &[(String, String)]) -> Result<(), PersistError> {
        let mut state = locked(&self.state);
        state.hset_calls.push((name.to_owned(), entries.len()));
        let hash = state.hashes.entry(name.to_owned()).or_default();
        for (field, value) in entries {
            match hash.iter_mut().find(|(key, _)| key == field) {
                Some(slot) => slot.1.clone_from(value),
                None => hash.push((field.clone(), value.clone())),
            }
        }
        Ok(())
    }

    async fn hkeys(&self, name: &str) -> Result<Vec<String>, PersistError> {
        Ok(locked(&self.state)
            .hashes
            .get(name)
            .map(|entries| entries.iter().map(|(key, _)| key.clone()).collect())
            .unwrap_or_default())
    }

    async fn hmget(
        &self,
        name: &str,
        fields: &[String],
    ) -> Result<Option<Vec<Option<String>>>, PersistError> {
        if self.null_reads {
            return Ok(None);
        }
        let state = locked(&self.state);
        let Some(entries) = state.hashes.get(name) else {
            return Ok(None);
        };
        Ok(Some(
            fields
                .iter()
                .map(|field| {
                    entries
                        .iter()
                        .find(|(key, _)| key == field)
                        .map(|(_, value)| value.clone())
                })
                .collect(),
        ))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError> {
        locked(&self.state)
            .values
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(locked(&self.state).values.get(key).cloned())
    }
}

//! Write-once indexed storage for ingested records.
//!
//! An [`IndexedStore`] starts [`StoreState::Open`] and accepts writes. The
//! first read through any public accessor moves it to [`StoreState::Frozen`];
//! from then on writes are dropped and reported rather than applied. The
//! transition is one-way, idempotent and checked before every mutation, so a
//! frozen store can be shared for reading without further locking.
//!
//! A record type may be indexed by numeric id, by string key, or by both at
//! once. Both indices point into the same record vector, so a mutation made
//! through one is visible through the other.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        OnceLock,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{debug, error};

use crate::{IdIndexed, KeyIndexed};

/// Lifecycle state of an [`IndexedStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Writes are accepted.
    Open,
    /// A read has happened; writes are rejected.
    Frozen,
}

/// Result of [`IndexedStore::set_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum WriteOutcome {
    /// The given number of records were inserted or replaced.
    Applied(usize),
    /// The store was frozen; the given number of records were dropped.
    Rejected(usize),
}

impl WriteOutcome {
    /// Whether the write was dropped because the store had been read.
    #[must_use]
    pub const fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Identity extractors used by an [`IndexedStore`].
pub struct Indexing<V> {
    id: Option<fn(&V) -> u32>,
    key: Option<fn(&V) -> &str>,
}

impl<V> Clone for Indexing<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Indexing<V> {}

impl<V> fmt::Debug for Indexing<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Indexing")
            .field("by_id", &self.id.is_some())
            .field("by_key", &self.key.is_some())
            .finish()
    }
}

impl<V: IdIndexed> Indexing<V> {
    /// Index records by [`IdIndexed::id_num`].
    #[must_use]
    pub fn by_id() -> Self {
        Self {
            id: Some(<V as IdIndexed>::id_num),
            key: None,
        }
    }
}

impl<V: KeyIndexed> Indexing<V> {
    /// Index records by [`KeyIndexed::id_tag`].
    #[must_use]
    pub fn by_key() -> Self {
        Self {
            id: None,
            key: Some(<V as KeyIndexed>::id_tag),
        }
    }
}

impl<V: IdIndexed + KeyIndexed> Indexing<V> {
    /// Index records by id and by key simultaneously.
    ///
    /// Identity is decided by the id; the key index points at the most
    /// recently written record carrying that key, since keys need not be
    /// unique.
    #[must_use]
    pub fn by_id_and_key() -> Self {
        Self {
            id: Some(<V as IdIndexed>::id_num),
            key: Some(<V as KeyIndexed>::id_tag),
        }
    }
}

/// In-memory record storage with a write-once, read-freezes discipline.
///
/// # Examples
///
/// ```
/// use heroes_core::{IdIndexed, IndexedStore, Indexing, StoreState};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Hero {
///     id_num: u32,
/// }
///
/// impl IdIndexed for Hero {
///     fn id_num(&self) -> u32 {
///         self.id_num
///     }
/// }
///
/// let mut store = IndexedStore::new("heroes", Indexing::by_id());
/// let _ = store.set_many([Hero { id_num: 2 }, Hero { id_num: 1 }]);
/// assert_eq!(store.get_all(), &[Hero { id_num: 1 }, Hero { id_num: 2 }]);
/// assert_eq!(store.state(), StoreState::Frozen);
/// assert!(store.set_many([Hero { id_num: 3 }]).is_rejected());
/// ```
pub struct IndexedStore<V> {
    label: String,
    indexing: Indexing<V>,
    records: Vec<V>,
    ids: HashMap<u32, usize>,
    keys: HashMap<String, usize>,
    frozen: AtomicBool,
    snapshot: OnceLock<Vec<V>>,
}

impl<V> fmt::Debug for IndexedStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedStore")
            .field("label", &self.label)
            .field("indexing", &self.indexing)
            .field("state", &self.state())
            .field("len", &self.records.len())
            .finish_non_exhaustive()
    }
}

impl<V> IndexedStore<V> {
    /// Create an empty, open store. `label` names the store in diagnostics.
    pub fn new(label: impl Into<String>, indexing: Indexing<V>) -> Self {
        Self {
            label: label.into(),
            indexing,
            records: Vec::new(),
            ids: HashMap::new(),
            keys: HashMap::new(),
            frozen: AtomicBool::new(false),
            snapshot: OnceLock::new(),
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StoreState {
        if self.frozen.load(Ordering::Acquire) {
            StoreState::Frozen
        } else {
            StoreState::Open
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace `records`.
    ///
    /// Once the store is frozen the call changes nothing, logs an error and
    /// reports how many records were dropped.
    pub fn set_many<I>(&mut self, records: I) -> WriteOutcome
    where
        I: IntoIterator<Item = V>,
    {
        if self.state() == StoreState::Frozen {
            let dropped = records.into_iter().count();
            error!(
                "{}: modification attempted after the store was read; {dropped} records rejected",
                self.label
            );
            return WriteOutcome::Rejected(dropped);
        }
        let mut written = 0;
        for record in records {
            self.upsert(record);
            written += 1;
        }
        WriteOutcome::Applied(written)
    }

    fn upsert(&mut self, record: V) {
        let id = self.indexing.id.map(|id_of| id_of(&record));
        let key = self.indexing.key.map(|key_of| key_of(&record).to_owned());
        let existing = match (id, key.as_deref()) {
            (Some(id), _) => self.ids.get(&id).copied(),
            (None, Some(key)) => self.keys.get(key).copied(),
            (None, None) => None,
        };

        let position = match existing {
            Some(pos) if pos < self.records.len() => {
                self.replace_at(pos, record);
                pos
            }
            _ => {
                self.records.push(record);
                self.records.len() - 1
            }
        };

        if let Some(id) = id {
            self.ids.insert(id, position);
        }
        if let Some(key) = key {
            self.keys.insert(key, position);
        }
    }

    fn replace_at(&mut self, pos: usize, record: V) {
        let Some(slot) = self.records.get_mut(pos) else {
            return;
        };
        let previous = self.indexing.key.map(|key_of| key_of(slot).to_owned());
        *slot = record;
        let (Some(key_of), Some(previous)) = (self.indexing.key, previous) else {
            return;
        };
        if self.keys.get(&previous) != Some(&pos) {
            return;
        }
        // Another record sharing the old key takes it over.
        match self
            .records
            .iter()
            .rposition(|other| key_of(other) == previous)
        {
            Some(other) => {
                self.keys.insert(previous, other);
            }
            None => {
                self.keys.remove(&previous);
            }
        }
    }

    fn freeze(&self) {
        if !self.frozen.swap(true, Ordering::AcqRel) {
            debug!("{}: frozen with {} records", self.label, self.records.len());
        }
    }

    /// Look up records by id, in the order requested. Freezes the store.
    ///
    /// Ids that are unknown, or a store without an id index, yield `None`.
    pub fn get_many_by_ids(&self, ids: &[u32]) -> Vec<Option<&V>> {
        self.freeze();
        ids.iter()
            .map(|id| self.ids.get(id).and_then(|&pos| self.records.get(pos)))
            .collect()
    }

    /// Look up records by key, in the order requested. Freezes the store.
    pub fn get_many_by_keys<S: AsRef<str>>(&self, keys: &[S]) -> Vec<Option<&V>> {
        self.freeze();
        keys.iter()
            .map(|key| self.lookup_key(key.as_ref()))
            .collect()
    }

    /// Look up a record by key without freezing the store.
    ///
    /// Intended for cross-referencing phases that run before the collection
    /// is published to readers.
    pub fn peek_by_key(&self, key: &str) -> Option<&V> {
        self.lookup_key(key)
    }

    /// Mutable counterpart of [`IndexedStore::peek_by_key`].
    ///
    /// Returns `None` once the store is frozen. Callers must not change the
    /// record's id or key.
    pub fn peek_by_key_mut(&mut self, key: &str) -> Option<&mut V> {
        if self.state() == StoreState::Frozen {
            error!("{}: in-place update of {key} attempted after the store was read", self.label);
            return None;
        }
        let pos = *self.keys.get(key)?;
        self.records.get_mut(pos)
    }

    /// Mutable access to every record while the store is still open.
    ///
    /// Used by enrichment phases that fill in derived fields. Returns `None`
    /// once the store is frozen. Callers must not change ids or keys.
    pub fn records_mut(&mut self) -> Option<&mut [V]> {
        if self.state() == StoreState::Frozen {
            error!("{}: enrichment attempted after the store was read", self.label);
            return None;
        }
        Some(&mut self.records)
    }

    fn lookup_key(&self, key: &str) -> Option<&V> {
        self.keys.get(key).and_then(|&pos| self.records.get(pos))
    }
}

impl<V: Clone> IndexedStore<V> {
    /// All records, materialised once and cached. Freezes the store.
    ///
    /// Id-indexed stores list records in ascending id order; key-only stores
    /// keep insertion order.
    pub fn get_all(&self) -> &[V] {
        self.freeze();
        self.snapshot.get_or_init(|| {
            let mut all = self.records.clone();
            if let Some(id_of) = self.indexing.id {
                all.sort_by_key(id_of);
            }
            debug!("{}: recorded {} entries in get_all", self.label, all.len());
            all
        })
    }

    /// Owned `(id, record)` pairs for persistence. Freezes the store.
    pub fn entries_by_id(&self) -> Vec<(u32, V)> {
        match self.indexing.id {
            Some(id_of) => self
                .get_all()
                .iter()
                .map(|record| (id_of(record), record.clone()))
                .collect(),
            None => {
                self.freeze();
                Vec::new()
            }
        }
    }

    /// Owned `(key, record)` pairs for persistence. Freezes the store.
    ///
    /// Each key appears once, paired with the record its index points at.
    pub fn entries_by_key(&self) -> Vec<(String, V)> {
        self.freeze();
        let Some(key_of) = self.indexing.key else {
            return Vec::new();
        };
        self.records
            .iter()
            .enumerate()
            .filter(|(pos, record)| self.keys.get(key_of(record)) == Some(pos))
            .map(|(_, record)| (key_of(record).to_owned(), record.clone()))
            .collect()
    }
}

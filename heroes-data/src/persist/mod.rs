//! Batched persistence of frozen collections to a key/value service.
//!
//! Hashes are written and read in batches of at most
//! [`PERSIST_BATCH_SIZE`] fields so no single call exceeds the service's
//! payload ceiling. Writes are not atomic across batches; a failed publish is
//! repaired by publishing again, which overwrites every field.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use heroes_core::{BatchSizeError, PERSIST_BATCH_SIZE, partition, partition_entries};
use log::{debug, info, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

mod rest;

pub use rest::{KvDetails, RestKvStore};

/// Errors raised while talking to the key/value service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PersistError {
    /// The server returned an HTTP error status.
    #[error("request to {url} failed with status {status}: {message}")]
    Http {
        /// Fully qualified request URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Short error description supplied by the server.
        message: String,
    },
    /// The request failed before a response was received.
    #[error("network error contacting {url}: {source}")]
    Network {
        /// Fully qualified request URL.
        url: String,
        /// I/O error reported by the transport.
        #[source]
        source: io::Error,
    },
    /// The service rejected a command.
    #[error("{command} failed: {message}")]
    Command {
        /// Command name, e.g. `HSET`.
        command: &'static str,
        /// Error reported by the service.
        message: String,
    },
    /// A response did not have the expected structure.
    #[error("unexpected {command} response: {message}")]
    Response {
        /// Command name, e.g. `HMGET`.
        command: &'static str,
        /// Description of the mismatch.
        message: String,
    },
    /// A value could not be serialised or deserialised.
    #[error("failed to convert value for {key}: {source}")]
    Codec {
        /// Hash field or scalar key the value belongs to.
        key: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A multi-get returned nothing for a whole batch.
    #[error("retrieved batch {batch} of hash {name} was null")]
    NullBatch {
        /// Hash being read.
        name: String,
        /// Zero-based batch index.
        batch: usize,
    },
    /// A stored field name could not be read as the requested key type.
    #[error("field {field:?} of hash {name} is not a valid {expected} key")]
    KeyCoercion {
        /// Hash being read.
        name: String,
        /// Offending field name.
        field: String,
        /// Name of the requested key type.
        expected: &'static str,
    },
    /// The service credentials are missing.
    #[error("no token configured for the key/value service at {url}")]
    MissingToken {
        /// Service URL.
        url: String,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// Entries could not be partitioned into batches.
    #[error(transparent)]
    Batch(#[from] BatchSizeError),
}

/// Hash and scalar operations of a Redis-compatible service.
#[async_trait(?Send)]
pub trait KvStore {
    /// Set `entries` on hash `name` in one call.
    async fn hset(&self, name: &str, entries: &[(String, String)]) -> Result<(), PersistError>;

    /// List every field of hash `name`.
    async fn hkeys(&self, name: &str) -> Result<Vec<String>, PersistError>;

    /// Fetch `fields` of hash `name` in one call.
    ///
    /// `None` means the service returned nothing for the whole request.
    async fn hmget(
        &self,
        name: &str,
        fields: &[String],
    ) -> Result<Option<Vec<Option<String>>>, PersistError>;

    /// Set scalar `key` to `value`.
    async fn set(&self, key: &str, value: &str) -> Result<(), PersistError>;

    /// Read scalar `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
}

/// Field types a hash can be read back as.
///
/// A whole hash is coerced to one key type; a field that does not parse
/// fails the read.
pub trait HashKey: Sized + Eq + Hash {
    /// Name of the key type used in diagnostics.
    const KIND: &'static str;

    /// Parse a stored field name.
    fn from_field(field: &str) -> Option<Self>;
}

impl HashKey for u32 {
    const KIND: &'static str = "numeric";

    fn from_field(field: &str) -> Option<Self> {
        field.parse().ok()
    }
}

impl HashKey for String {
    const KIND: &'static str = "string";

    fn from_field(field: &str) -> Option<Self> {
        Some(field.to_owned())
    }
}

/// Writes and reads collections through a [`KvStore`] in bounded batches.
#[derive(Clone)]
pub struct Persister {
    store: Arc<dyn KvStore>,
    batch_size: usize,
}

impl std::fmt::Debug for Persister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persister")
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Persister {
    /// Persist through `store` using [`PERSIST_BATCH_SIZE`].
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            batch_size: PERSIST_BATCH_SIZE,
        }
    }

    /// Use a different batch size. Zero is rejected when a batch is formed.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Serialise each value to JSON and write the entries to hash `name`.
    ///
    /// Entries are sent in the order given, one `HSET` per batch. Returns the
    /// number of fields written.
    ///
    /// # Errors
    ///
    /// Fails on the first value that cannot be serialised, before any write,
    /// or on the first failed batch, leaving earlier batches in place.
    pub async fn write_hash<K, V, I>(&self, name: &str, entries: I) -> Result<usize, PersistError>
    where
        K: Display,
        V: Serialize,
        I: IntoIterator<Item = (K, V)>,
    {
        let encoded = entries
            .into_iter()
            .map(|(key, value)| {
                let field = key.to_string();
                serde_json::to_string(&value)
                    .map(|json| (field.clone(), json))
                    .map_err(|source| PersistError::Codec { key: field, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let total = encoded.len();
        info!("writing {total} fields to {name}");
        let batches = partition_entries(encoded, self.batch_size)?;
        let batch_count = batches.len();
        for (index, batch) in batches.iter().enumerate() {
            debug!("{name}: HSET batch {}/{batch_count} ({} fields)", index + 1, batch.len());
            self.store.hset(name, batch).await?;
        }
        info!("wrote {total} fields to {name}");
        Ok(total)
    }

    /// Read every field of hash `name`, decoding keys as `K` and values as `V`.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::NullBatch`] when any batch comes back empty,
    /// [`PersistError::KeyCoercion`] when a field is not a valid `K`, and
    /// [`PersistError::Codec`] when a value does not decode as `V`.
    pub async fn read_hash<K, V>(&self, name: &str) -> Result<HashMap<K, V>, PersistError>
    where
        K: HashKey,
        V: DeserializeOwned,
    {
        info!("reading from {name}");
        let fields = self.store.hkeys(name).await?;
        let mut result = HashMap::with_capacity(fields.len());
        for (index, batch) in partition(fields, self.batch_size)?.into_iter().enumerate() {
            let values = self
                .store
                .hmget(name, &batch)
                .await?
                .filter(|values| values.iter().any(Option::is_some))
                .ok_or_else(|| PersistError::NullBatch {
                    name: name.to_owned(),
                    batch: index,
                })?;
            if values.len() != batch.len() {
                return Err(PersistError::Response {
                    command: "HMGET",
                    message: format!("expected {} values, received {}", batch.len(), values.len()),
                });
            }
            for (field, value) in batch.into_iter().zip(values) {
                let key = K::from_field(&field).ok_or_else(|| PersistError::KeyCoercion {
                    name: name.to_owned(),
                    field: field.clone(),
                    expected: K::KIND,
                })?;
                let Some(json) = value else {
                    warn!("{name}: field {field} vanished during read");
                    continue;
                };
                let decoded = serde_json::from_str(&json)
                    .map_err(|source| PersistError::Codec { key: field, source })?;
                result.insert(key, decoded);
            }
        }
        info!("read {} fields from {name}", result.len());
        Ok(result)
    }

    /// Serialise `value` to JSON and store it under `key`.
    ///
    /// # Errors
    ///
    /// Fails when the value cannot be serialised or the write fails.
    pub async fn write_value<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
    ) -> Result<(), PersistError> {
        let json = serde_json::to_string(value).map_err(|source| PersistError::Codec {
            key: key.to_owned(),
            source,
        })?;
        self.store.set(key, &json).await?;
        info!("wrote to {key}");
        Ok(())
    }

    /// Read and decode the scalar stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Fails when the read fails or the stored JSON does not decode as `V`.
    pub async fn read_value<V: DeserializeOwned>(&self, key: &str) -> Result<Option<V>, PersistError> {
        let Some(json) = self.store.get(key).await? else {
            return Ok(None);
        };
        debug!("read from {key}");
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| PersistError::Codec {
                key: key.to_owned(),
                source,
            })
    }
}

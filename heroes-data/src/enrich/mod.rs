//! Enrichment of records with image URLs resolved from a title index.
//!
//! [`Enricher`] derives a file title per record, resolves titles in batches
//! of at most [`LOOKUP_BATCH_SIZE`] through an [`ImageLookup`], and writes the
//! resulting URLs back into the records while their store is still open.
//! Results are re-projected onto the requested order because the lookup
//! service is free to reorder or omit entries.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use heroes_core::{BatchSizeError, LOOKUP_BATCH_SIZE, partition};
use log::{debug, error};
use thiserror::Error;

pub mod file_title;
mod mediawiki;

pub use mediawiki::{DEFAULT_USER_AGENT, MediaWikiImageLookup, WikiDetails};

/// URLs found by one lookup, keyed by the title as it was requested.
///
/// Titles the service knows nothing about are absent.
pub type LookupBatch = HashMap<String, String>;

/// Errors raised while resolving titles.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnrichError {
    /// More titles were passed to a single lookup than the service accepts.
    #[error("image lookup accepts at most {limit} titles, received {requested}")]
    BatchTooLarge {
        /// Number of titles passed.
        requested: usize,
        /// Largest accepted batch.
        limit: usize,
    },
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
    /// The response body could not be decoded.
    #[error("failed to decode image lookup response from {url}: {source}")]
    Decode {
        /// Fully qualified request URL.
        url: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The configured service URL is not usable.
    #[error("invalid image lookup URL {url}: {source}")]
    InvalidUrl {
        /// URL as configured.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// Titles could not be partitioned into batches.
    #[error(transparent)]
    Batch(#[from] BatchSizeError),
}

/// Title-indexed image service.
#[async_trait(?Send)]
pub trait ImageLookup {
    /// Resolve up to [`LOOKUP_BATCH_SIZE`] titles with one upstream request.
    async fn lookup(&self, titles: &[String]) -> Result<LookupBatch, EnrichError>;
}

/// How a missing lookup result is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupPolicy {
    /// Every record should have an image; misses are logged at `error`.
    Required,
    /// Many records have no image; misses are silent.
    Optional,
}

/// Batches title lookups and assigns the results to records.
#[derive(Clone)]
pub struct Enricher {
    lookup: Arc<dyn ImageLookup>,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher").finish_non_exhaustive()
    }
}

impl Enricher {
    /// Enrich through `lookup`.
    pub fn new(lookup: Arc<dyn ImageLookup>) -> Self {
        Self { lookup }
    }

    /// Resolve `titles`, returning one entry per title in the same order.
    ///
    /// Each distinct title is requested once, so records sharing a title
    /// always receive the same URL.
    ///
    /// # Errors
    ///
    /// Propagates the first failed lookup.
    pub async fn resolve(
        &self,
        titles: &[String],
        policy: LookupPolicy,
    ) -> Result<Vec<Option<String>>, EnrichError> {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = titles
            .iter()
            .filter(|title| seen.insert(*title))
            .cloned()
            .collect();
        let batches = partition(distinct, LOOKUP_BATCH_SIZE)?;

        let mut found = LookupBatch::new();
        let batch_count = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            debug!("image lookup batch {}/{batch_count} ({} titles)", index + 1, batch.len());
            found.extend(self.lookup.lookup(&batch).await?);
        }

        Ok(titles
            .iter()
            .map(|title| {
                let url = found.get(title).cloned();
                if url.is_none() && policy == LookupPolicy::Required {
                    error!("no image found for {title}");
                }
                url
            })
            .collect())
    }

    /// Derive a title for each record, resolve them and assign the results.
    ///
    /// Records for which `title_of` yields `None` are skipped and left
    /// untouched. Returns the number of records that received a URL.
    ///
    /// # Errors
    ///
    /// Propagates the first failed lookup; no record is modified in that case.
    pub async fn enrich<V, T, A>(
        &self,
        records: &mut [V],
        title_of: T,
        mut assign: A,
        policy: LookupPolicy,
    ) -> Result<usize, EnrichError>
    where
        T: Fn(&V) -> Option<String>,
        A: FnMut(&mut V, Option<String>),
    {
        let targets: Vec<(usize, String)> = records
            .iter()
            .enumerate()
            .filter_map(|(pos, record)| title_of(record).map(|title| (pos, title)))
            .collect();
        let titles: Vec<String> = targets.iter().map(|(_, title)| title.clone()).collect();
        let urls = self.resolve(&titles, policy).await?;

        let mut resolved = 0;
        for ((pos, _), url) in targets.into_iter().zip(urls) {
            if let Some(record) = records.get_mut(pos) {
                resolved += usize::from(url.is_some());
                assign(record, url);
            }
        }
        Ok(resolved)
    }
}

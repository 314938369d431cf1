//! Recursive ingestion of JSON record arrays from a [`HierarchicalSource`].
//!
//! A walk starts at a [`SourceRoot`]. A blob root is decoded directly; a tree
//! root has its blob children decoded in listing order before each tree child
//! is walked depth-first. Exactly one fetch is in flight at any moment.

use heroes_core::ShapeError;
use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::source::{EntryKind, HierarchicalSource, SourceError, join_path};

/// Where a walk starts and whether that path is a file or a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRoot {
    /// Repository path of the root, without a trailing slash.
    pub path: String,
    /// Whether the root is a single blob or a tree.
    pub kind: EntryKind,
}

impl SourceRoot {
    /// A directory whose blobs are all record arrays.
    pub fn tree(path: impl AsRef<str>) -> Self {
        Self {
            path: path.as_ref().trim_end_matches('/').to_owned(),
            kind: EntryKind::Tree,
        }
    }

    /// A single blob holding one record array.
    pub fn blob(path: impl AsRef<str>) -> Self {
        Self {
            path: path.as_ref().trim_end_matches('/').to_owned(),
            kind: EntryKind::Blob,
        }
    }
}

/// Counters collected during one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Blobs decoded.
    pub blobs: usize,
    /// Trees listed.
    pub trees: usize,
    /// Blobs re-read through the raw path because the query truncated them.
    pub raw_fallbacks: usize,
    /// Records that passed the accept predicate and were transformed.
    pub accepted: usize,
    /// Records dropped by the accept predicate.
    pub rejected: usize,
}

/// Errors that abort a walk.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    /// The source could not be read.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// A blob did not hold a JSON array.
    #[error("blob at {path} is not a JSON array of records: {source}")]
    Decode {
        /// Repository path of the blob.
        path: String,
        /// Underlying parser error.
        #[source]
        source: simd_json::Error,
    },
    /// A record could not be transformed.
    #[error("failed to transform a record from {path}: {source}")]
    Shape {
        /// Repository path of the blob holding the record.
        path: String,
        /// Transform failure.
        #[source]
        source: ShapeError,
    },
}

/// Records produced by a walk together with its counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested<T> {
    /// Transformed records in traversal order.
    pub records: Vec<T>,
    /// Walk statistics.
    pub report: IngestReport,
}

/// Walks one [`SourceRoot`] of a [`HierarchicalSource`].
pub struct Ingestor<'a> {
    source: &'a dyn HierarchicalSource,
    root: SourceRoot,
}

impl<'a> Ingestor<'a> {
    /// Prepare a walk of `root` over `source`.
    pub fn new(source: &'a dyn HierarchicalSource, root: SourceRoot) -> Self {
        Self { source, root }
    }

    /// Root this ingestor walks.
    #[must_use]
    pub fn root(&self) -> &SourceRoot {
        &self.root
    }

    /// Walk the root and return the transformed records.
    ///
    /// Elements rejected by `accept` are dropped silently. The first transform
    /// failure aborts the whole walk.
    ///
    /// # Errors
    ///
    /// Propagates source failures unchanged and reports undecodable blobs and
    /// transform failures with the offending path.
    pub async fn ingest<T, A, F>(&self, accept: A, transform: F) -> Result<Vec<T>, IngestError>
    where
        A: Fn(&Value) -> bool,
        F: Fn(Value) -> Result<T, ShapeError>,
    {
        self.ingest_with_report(accept, transform)
            .await
            .map(|ingested| ingested.records)
    }

    /// As [`Ingestor::ingest`], also returning the walk counters.
    ///
    /// # Errors
    ///
    /// See [`Ingestor::ingest`].
    pub async fn ingest_with_report<T, A, F>(
        &self,
        accept: A,
        transform: F,
    ) -> Result<Ingested<T>, IngestError>
    where
        A: Fn(&Value) -> bool,
        F: Fn(Value) -> Result<T, ShapeError>,
    {
        let mut walk = Walk {
            source: self.source,
            accept,
            transform,
            records: Vec::new(),
            report: IngestReport::default(),
        };
        match self.root.kind {
            EntryKind::Blob => walk.blob(&self.root.path).await?,
            EntryKind::Tree => walk.tree(&self.root.path).await?,
        }
        let Walk { records, report, .. } = walk;
        debug!(
            "ingested {}: {} blobs, {} trees, {} raw fallbacks, {} accepted, {} rejected",
            self.root.path,
            report.blobs,
            report.trees,
            report.raw_fallbacks,
            report.accepted,
            report.rejected
        );
        Ok(Ingested { records, report })
    }
}

struct Walk<'a, T, A, F> {
    source: &'a dyn HierarchicalSource,
    accept: A,
    transform: F,
    records: Vec<T>,
    report: IngestReport,
}

impl<T, A, F> Walk<'_, T, A, F>
where
    A: Fn(&Value) -> bool,
    F: Fn(Value) -> Result<T, ShapeError>,
{
    async fn tree(&mut self, root: &str) -> Result<(), IngestError> {
        // Pending directories in reverse visiting order, so popping yields a
        // depth-first pre-order walk.
        let mut pending = vec![root.to_owned()];
        while let Some(dir) = pending.pop() {
            let entries = self.source.fetch_tree(&dir).await?;
            self.report.trees += 1;
            let mut subtrees = Vec::new();
            for entry in entries {
                let path = join_path(&dir, &entry.name);
                match entry.kind {
                    EntryKind::Blob => self.blob(&path).await?,
                    EntryKind::Tree => subtrees.push(path),
                }
            }
            pending.extend(subtrees.into_iter().rev());
        }
        Ok(())
    }

    async fn blob(&mut self, path: &str) -> Result<(), IngestError> {
        let blob = self.source.fetch_blob(path).await?;
        let text = if blob.truncated {
            debug!("{path} was truncated; fetching raw content");
            self.report.raw_fallbacks += 1;
            self.source.fetch_raw_blob(path).await?
        } else {
            blob.text
        };
        self.report.blobs += 1;

        let mut bytes = text.into_bytes();
        let elements: Vec<Value> =
            simd_json::serde::from_slice(&mut bytes).map_err(|source| IngestError::Decode {
                path: path.to_owned(),
                source,
            })?;
        for element in elements {
            if !(self.accept)(&element) {
                self.report.rejected += 1;
                continue;
            }
            let record = (self.transform)(element).map_err(|source| IngestError::Shape {
                path: path.to_owned(),
                source,
            })?;
            self.records.push(record);
            self.report.accepted += 1;
        }
        Ok(())
    }
}

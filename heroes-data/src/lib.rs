//! Data access for the heroes collections.
//!
//! Responsibilities:
//! - Read record arrays from a GitHub repository or a local mirror of it.
//! - Walk source trees and transform raw records into typed definitions.
//! - Enrich records with image URLs from a MediaWiki instance.
//! - Publish frozen collections to a Redis-compatible key/value service.
//!
//! Boundaries:
//! - Storage, batching and readiness primitives live in `heroes-core`.
//! - Honour classification and skill-name fixes are left to callers, which
//!   plug in through [`dao::TitleNormaliser`].
//!
//! Invariants:
//! - Every path is fetched at most once per load and never retried.
//! - A root's store is written only before its readiness gate resolves.

pub mod dao;
pub mod enrich;
pub mod ingest;
pub mod persist;
pub mod publish;
pub mod source;
pub mod test_support;

pub use dao::{DaoError, DaoResult};
pub use enrich::{EnrichError, Enricher, ImageLookup, LookupPolicy};
pub use ingest::{IngestError, IngestReport, Ingestor, SourceRoot};
pub use persist::{KvStore, PersistError, Persister};
pub use publish::{Catalogue, DEFAULT_PAUSE};
pub use source::{GithubSource, HierarchicalSource, LocalSource, RepositoryDetails, SourceError};

//! Error types emitted by the heroes CLI.
//!
//! Library failures are wrapped with the stage they occurred in so the single
//! line printed by `main` says what was being attempted.

use std::sync::Arc;

use camino::Utf8PathBuf;
use heroes_data::enrich::EnrichError;
use heroes_data::{DaoError, PersistError, SourceError};
use thiserror::Error;

/// Errors emitted by the heroes CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        /// Long flag name of the option.
        field: &'static str,
        /// Environment variable that also supplies it.
        env: &'static str,
    },
    /// The local mirror root does not exist.
    #[error("{field} path {path:?} does not exist")]
    MissingMirrorRoot {
        /// Option naming the path.
        field: &'static str,
        /// Configured path.
        path: Utf8PathBuf,
    },
    /// The local mirror root could not be inspected.
    #[error("failed to inspect {field} path {path:?}: {source}")]
    InspectMirrorRoot {
        /// Option naming the path.
        field: &'static str,
        /// Configured path.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The repository reader could not be constructed.
    #[error("failed to open the record source: {0}")]
    OpenSource(#[source] SourceError),
    /// The wiki client could not be constructed.
    #[error("failed to build the wiki client for {url:?}: {source}")]
    BuildWikiClient {
        /// Wiki API endpoint.
        url: String,
        /// Construction failure.
        #[source]
        source: EnrichError,
    },
    /// The key/value client could not be constructed.
    #[error("failed to build the key/value client for {url:?}: {source}")]
    BuildKvClient {
        /// Service endpoint.
        url: String,
        /// Construction failure.
        #[source]
        source: PersistError,
    },
    /// The async runtime could not be started.
    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Loading or publishing a collection failed.
    #[error("publish failed: {0}")]
    Publish(#[source] Arc<DaoError>),
}

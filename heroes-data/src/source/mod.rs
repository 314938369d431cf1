//! Readers for the hierarchical, versioned source that records are ingested from.
//!
//! Two interchangeable implementations satisfy [`HierarchicalSource`]:
//! [`GithubSource`] queries the GitHub GraphQL API and falls back to the raw
//! content host for oversized blobs, while [`LocalSource`] serves the same
//! contract from a local clone of the repository.

use std::io;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use thiserror::Error;

mod github;
mod local;

pub use github::{DEFAULT_GRAPHQL_URL, DEFAULT_USER_AGENT, GithubSource};
pub use local::LocalSource;

/// Text of a single blob as returned by a query call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobContent {
    /// Blob text, possibly shortened by the transport.
    pub text: String,
    /// Whether `text` is incomplete. Callers must re-read the blob through
    /// [`HierarchicalSource::fetch_raw_blob`] when this is set.
    pub truncated: bool,
}

impl BlobContent {
    /// Content that was delivered in full.
    pub fn complete(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            truncated: false,
        }
    }
}

/// Whether a node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A leaf holding text.
    Blob,
    /// A directory holding named children.
    Tree,
}

/// A named child of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Name of the child, relative to its parent.
    pub name: String,
    /// Whether the child is a blob or a tree.
    pub kind: EntryKind,
}

impl SourceEntry {
    /// Describe a blob child.
    pub fn blob(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Blob,
        }
    }

    /// Describe a tree child.
    pub fn tree(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Tree,
        }
    }
}

/// Coordinates of the repository records are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDetails {
    /// Repository owner (user or organisation).
    pub owner: String,
    /// Repository name.
    pub name: String,
    /// Branch every path expression is resolved against.
    pub branch: String,
    /// Base URL of the raw content host, without the branch.
    pub raw_url: String,
}

impl RepositoryDetails {
    /// Describe `owner/name` on `branch`, served raw from `raw_url`.
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        branch: impl Into<String>,
        raw_url: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
            raw_url: raw_url.into(),
        }
    }

    /// Shell command that creates a local mirror of this repository.
    #[must_use]
    pub fn clone_hint(&self) -> String {
        format!(
            "git clone -b {} https://github.com/{}/{}",
            self.branch, self.owner, self.name
        )
    }
}

/// Errors raised while reading from a [`HierarchicalSource`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SourceError {
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
    /// A response body could not be decoded.
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        /// Fully qualified request URL.
        url: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The query service reported errors for the request.
    #[error("query for {path} failed: {message}")]
    Query {
        /// Repository path the query addressed.
        path: String,
        /// Messages reported by the service, joined.
        message: String,
    },
    /// Nothing exists at the requested path.
    #[error("no object found at {path}")]
    MissingObject {
        /// Repository path that was requested.
        path: String,
    },
    /// The object at the path is not of the requested kind.
    #[error("object at {path} is not a {expected:?}")]
    UnexpectedKind {
        /// Repository path that was requested.
        path: String,
        /// Kind the caller asked for.
        expected: EntryKind,
    },
    /// No API token was configured for the remote source.
    #[error("no GitHub token configured for {owner}/{name}")]
    MissingToken {
        /// Repository owner.
        owner: String,
        /// Repository name.
        name: String,
    },
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// The local mirror does not exist or cannot be opened.
    #[error("could not open local mirror at {root}; create it with `{hint}`: {source}")]
    MissingMirror {
        /// Directory the mirror was expected at.
        root: Utf8PathBuf,
        /// Command that creates the mirror.
        hint: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Reading from the local mirror failed.
    #[error("failed to read {path} from local mirror: {source}")]
    Local {
        /// Repository path that was requested.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// Access to a tree of blobs addressed by slash-separated paths.
///
/// Paths are relative to the repository root and carry no leading slash.
/// Implementations perform exactly one upstream call per method invocation and
/// never retry.
#[async_trait(?Send)]
pub trait HierarchicalSource {
    /// Fetch a blob through the query path. The text may be truncated.
    async fn fetch_blob(&self, path: &str) -> Result<BlobContent, SourceError>;

    /// List the children of a tree.
    async fn fetch_tree(&self, path: &str) -> Result<Vec<SourceEntry>, SourceError>;

    /// Fetch the full text of a blob, bypassing any size-limited query path.
    async fn fetch_raw_blob(&self, path: &str) -> Result<String, SourceError>;
}

pub(crate) fn convert_reqwest_error(error: reqwest::Error, url: &str) -> SourceError {
    if let Some(status) = error.status() {
        return SourceError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
            message: error.to_string(),
        };
    }

    let kind = if error.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    SourceError::Network {
        url: url.to_owned(),
        source: io::Error::new(kind, error),
    }
}

/// Join a parent path and a child name with a single slash.
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    let head = parent.trim_end_matches('/');
    let tail = name.trim_start_matches('/');
    if head.is_empty() {
        tail.to_owned()
    } else {
        format!("{head}/{tail}")
    }
}

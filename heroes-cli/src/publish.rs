//! Publish command implementation for the heroes CLI.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use heroes_data::enrich::{MediaWikiImageLookup, WikiDetails};
use heroes_data::persist::{KvDetails, RestKvStore};
use heroes_data::{
    Catalogue, DEFAULT_PAUSE, Enricher, GithubSource, HierarchicalSource, LocalSource, Persister,
    RepositoryDetails,
};
use heroes_data::source::DEFAULT_GRAPHQL_URL;
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BRANCH, ARG_GITHUB_TOKEN, ARG_GRAPHQL_URL, ARG_KV_TOKEN, ARG_KV_URL, ARG_LOCAL_MIRROR, ARG_PAUSE_MS,
    ARG_RAW_URL, ARG_REPO_NAME, ARG_REPO_OWNER, ARG_WIKI_URL, CliError, ENV_GITHUB_TOKEN,
    ENV_KV_TOKEN, ENV_KV_URL,
};

pub(crate) const DEFAULT_REPO_OWNER: &str = "HertzDevil";
pub(crate) const DEFAULT_REPO_NAME: &str = "feh-assets-json";
pub(crate) const DEFAULT_BRANCH: &str = "master";
pub(crate) const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com/HertzDevil/feh-assets-json";
pub(crate) const DEFAULT_WIKI_URL: &str = "https://feheroes.fandom.com/api.php";
pub(crate) const USER_AGENT: &str = concat!("heroes-dao/", env!("CARGO_PKG_VERSION"));

/// CLI arguments for the `publish` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Read the hero, skill, message and growth vector collections \
                 from GitHub (or a local clone), resolve their image URLs \
                 through the wiki, and write them to the key/value store. \
                 Options can come from CLI flags, configuration files, or \
                 environment variables.",
    about = "Publish every collection to the key/value store"
)]
#[ortho_config(prefix = "HEROES")]
pub(crate) struct PublishArgs {
    /// Token for the GitHub GraphQL API. Not needed with a local mirror.
    #[arg(long = ARG_GITHUB_TOKEN, value_name = "token")]
    #[serde(default)]
    pub(crate) github_token: Option<String>,
    /// Owner of the data repository.
    #[arg(long = ARG_REPO_OWNER, value_name = "owner")]
    #[serde(default)]
    pub(crate) repo_owner: Option<String>,
    /// Name of the data repository.
    #[arg(long = ARG_REPO_NAME, value_name = "name")]
    #[serde(default)]
    pub(crate) repo_name: Option<String>,
    /// Branch to read.
    #[arg(long = ARG_BRANCH, value_name = "branch")]
    #[serde(default)]
    pub(crate) branch: Option<String>,
    /// Raw content URL of the repository, without the branch.
    #[arg(long = ARG_RAW_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) raw_url: Option<String>,
    /// GitHub GraphQL endpoint, for GitHub Enterprise hosts.
    #[arg(long = ARG_GRAPHQL_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) graphql_url: Option<String>,
    /// Directory holding a clone of the data repository. Replaces GitHub.
    #[arg(long = ARG_LOCAL_MIRROR, value_name = "dir")]
    #[serde(default)]
    pub(crate) local_mirror: Option<Utf8PathBuf>,
    /// MediaWiki `api.php` endpoint used to resolve image URLs.
    #[arg(long = ARG_WIKI_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) wiki_url: Option<String>,
    /// REST endpoint of the key/value store.
    #[arg(long = ARG_KV_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) kv_url: Option<String>,
    /// Token authorising writes to the key/value store.
    #[arg(long = ARG_KV_TOKEN, value_name = "token")]
    #[serde(default)]
    pub(crate) kv_token: Option<String>,
    /// Pause between collections, in milliseconds.
    #[arg(long = ARG_PAUSE_MS, value_name = "ms")]
    #[serde(default)]
    pub(crate) pause_ms: Option<u64>,
}

impl PublishArgs {
    pub(crate) fn into_config(self) -> Result<PublishConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        PublishConfig::try_from(merged)
    }
}

/// Where records are read from.
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum SourceChoice {
    /// The GitHub API at `graphql_url`, authenticated by a token.
    Github { token: String, graphql_url: String },
    /// A clone of the repository under `root`.
    Local { root: Utf8PathBuf },
}

impl fmt::Debug for SourceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Github { graphql_url, .. } => f
                .debug_struct("Github")
                .field("token", &"<redacted>")
                .field("graphql_url", graphql_url)
                .finish(),
            Self::Local { root } => f.debug_struct("Local").field("root", root).finish(),
        }
    }
}

/// Resolved `publish` command configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PublishConfig {
    /// Repository the collections are read from.
    pub(crate) repository: RepositoryDetails,
    /// Reader used for the repository.
    pub(crate) source: SourceChoice,
    /// Wiki API endpoint.
    pub(crate) wiki_url: String,
    /// Key/value store endpoint and token.
    pub(crate) kv: KvDetails,
    /// Pause between collections.
    pub(crate) pause: Duration,
}

impl PublishConfig {
    pub(crate) fn validate_sources(&self) -> Result<(), CliError> {
        match &self.source {
            SourceChoice::Github { .. } => Ok(()),
            SourceChoice::Local { root } => Self::require_directory(root, ARG_LOCAL_MIRROR),
        }
    }

    fn require_directory(path: &Utf8Path, field: &'static str) -> Result<(), CliError> {
        match heroes_fs::open_mirror(path) {
            Ok(_) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(CliError::MissingMirrorRoot {
                    field,
                    path: path.to_path_buf(),
                })
            }
            Err(source) => Err(CliError::InspectMirrorRoot {
                field,
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub(crate) fn open_source(&self) -> Result<Arc<dyn HierarchicalSource>, CliError> {
        match &self.source {
            SourceChoice::Github { token, graphql_url } => {
                GithubSource::new(self.repository.clone(), token.as_str())
                    .map(|source| {
                        let source = source
                            .with_graphql_url(graphql_url.as_str())
                            .with_user_agent(USER_AGENT);
                        Arc::new(source) as Arc<dyn HierarchicalSource>
                    })
                    .map_err(CliError::OpenSource)
            }
            SourceChoice::Local { root } => LocalSource::open(root, &self.repository)
                .map(|source| Arc::new(source) as Arc<dyn HierarchicalSource>)
                .map_err(CliError::OpenSource),
        }
    }

    pub(crate) fn enricher(&self) -> Result<Enricher, CliError> {
        let lookup = MediaWikiImageLookup::new(&WikiDetails::new(self.wiki_url.as_str()))
            .map_err(|source| CliError::BuildWikiClient {
                url: self.wiki_url.clone(),
                source,
            })?
            .with_user_agent(USER_AGENT);
        Ok(Enricher::new(Arc::new(lookup)))
    }

    fn persister(&self) -> Result<Persister, CliError> {
        let store = RestKvStore::new(self.kv.clone()).map_err(|source| CliError::BuildKvClient {
            url: self.kv.url.clone(),
            source,
        })?;
        Ok(Persister::new(Arc::new(store)))
    }

    async fn publish(&self) -> Result<(), CliError> {
        let source = self.open_source()?;
        let persister = self.persister()?;
        let catalogue = Catalogue::new(&source, Some(self.enricher()?));
        info!(
            "publishing {}/{}@{} with a {}ms pause",
            self.repository.owner,
            self.repository.name,
            self.repository.branch,
            self.pause.as_millis()
        );
        catalogue
            .publish_all(&persister, self.pause)
            .await
            .map_err(CliError::Publish)?;
        info!("done");
        Ok(())
    }
}

impl TryFrom<PublishArgs> for PublishConfig {
    type Error = CliError;

    fn try_from(args: PublishArgs) -> Result<Self, Self::Error> {
        let source = match (args.local_mirror, args.github_token) {
            (Some(root), _) => SourceChoice::Local { root },
            (None, Some(token)) => SourceChoice::Github {
                token,
                graphql_url: args
                    .graphql_url
                    .unwrap_or_else(|| DEFAULT_GRAPHQL_URL.to_owned()),
            },
            (None, None) => {
                return Err(CliError::MissingArgument {
                    field: ARG_GITHUB_TOKEN,
                    env: ENV_GITHUB_TOKEN,
                });
            }
        };
        let kv_url = args.kv_url.ok_or(CliError::MissingArgument {
            field: ARG_KV_URL,
            env: ENV_KV_URL,
        })?;
        let kv_token = args.kv_token.ok_or(CliError::MissingArgument {
            field: ARG_KV_TOKEN,
            env: ENV_KV_TOKEN,
        })?;
        let repository = RepositoryDetails::new(
            args.repo_owner.unwrap_or_else(|| DEFAULT_REPO_OWNER.to_owned()),
            args.repo_name.unwrap_or_else(|| DEFAULT_REPO_NAME.to_owned()),
            args.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_owned()),
            args.raw_url.unwrap_or_else(|| DEFAULT_RAW_URL.to_owned()),
        );
        Ok(Self {
            repository,
            source,
            wiki_url: args.wiki_url.unwrap_or_else(|| DEFAULT_WIKI_URL.to_owned()),
            kv: KvDetails::new(kv_url, kv_token),
            pause: args.pause_ms.map_or(DEFAULT_PAUSE, Duration::from_millis),
        })
    }
}

/// Resolve the layered configuration and publish every collection.
pub(crate) fn run_publish(args: PublishArgs) -> Result<(), CliError> {
    let config = args.into_config()?;
    config.validate_sources()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;
    runtime.block_on(config.publish())
}

//! Command-line interface publishing the heroes collections.
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod error;
mod publish;

pub use error::CliError;
use publish::PublishArgs;

const ARG_GITHUB_TOKEN: &str = "github-token";
const ARG_REPO_OWNER: &str = "repo-owner";
const ARG_REPO_NAME: &str = "repo-name";
const ARG_BRANCH: &str = "branch";
const ARG_RAW_URL: &str = "raw-url";
const ARG_GRAPHQL_URL: &str = "graphql-url";
const ARG_LOCAL_MIRROR: &str = "local-mirror";
const ARG_WIKI_URL: &str = "wiki-url";
const ARG_KV_URL: &str = "kv-url";
const ARG_KV_TOKEN: &str = "kv-token";
const ARG_PAUSE_MS: &str = "pause-ms";
const ENV_GITHUB_TOKEN: &str = "HEROES_CMDS_PUBLISH_GITHUB_TOKEN";
const ENV_KV_URL: &str = "HEROES_CMDS_PUBLISH_KV_URL";
const ENV_KV_TOKEN: &str = "HEROES_CMDS_PUBLISH_KV_TOKEN";

const DEFAULT_LOG_FILTER: &str = "info";

/// Run the heroes CLI with the current process arguments and environment.
///
/// # Errors
///
/// Returns the first argument, configuration or publish failure.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    init_logging();
    match cli.command {
        Command::Publish(args) => publish::run_publish(args),
    }
}

/// Install the `fmt` subscriber, filtered by `RUST_LOG` and defaulting to
/// `info`. Records emitted through `log` are bridged into it.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Keeps a subscriber installed earlier in the process.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

#[derive(Debug, Parser)]
#[command(
    name = "heroes-dao",
    about = "Load the heroes collections and publish them to a key/value store",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load every collection and write it to the key/value store.
    Publish(PublishArgs),
}

#[cfg(test)]
mod tests;

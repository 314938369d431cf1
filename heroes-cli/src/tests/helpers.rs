//! Test helpers for local mirrors and layered overrides.

use super::*;
use crate::publish::{PublishConfig, SourceChoice};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tempfile::TempDir;

pub(super) const KV_URL: &str = "https://kv.example.test";
pub(super) const KV_TOKEN: &str = "kv-secret";
pub(super) const GITHUB_TOKEN: &str = "gh-secret";

#[derive(Debug, Clone, Default)]
pub(super) struct LayerOverrides {
    pub(super) branch: Option<String>,
    pub(super) pause_ms: Option<u64>,
}

/// Temporary directory holding an (empty) clone of the default repository.
#[derive(Debug)]
pub(super) struct MirrorDir {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl MirrorDir {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        fs::create_dir_all(root.join(crate::publish::DEFAULT_REPO_NAME).join("files"))
            .expect("create mirror");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }
}

/// Convert arguments and validate them without reading the process
/// environment or configuration files.
pub(super) fn resolve_publish_config(args: PublishArgs) -> Result<PublishConfig, CliError> {
    let config = PublishConfig::try_from(args)?;
    config.validate_sources()?;
    Ok(config)
}

pub(super) fn merge_layers(
    mut cli_args: PublishArgs,
    file_layer: Option<LayerOverrides>,
    env_layer: Option<LayerOverrides>,
) -> Result<PublishConfig, CliError> {
    merge_field(
        &mut cli_args.branch,
        extract_field(&env_layer, |layer| &layer.branch),
        extract_field(&file_layer, |layer| &layer.branch),
    );
    merge_field(
        &mut cli_args.pause_ms,
        extract_field(&env_layer, |layer| &layer.pause_ms),
        extract_field(&file_layer, |layer| &layer.pause_ms),
    );
    resolve_publish_config(cli_args)
}

pub(super) fn local_root(config: &PublishConfig) -> Option<&Utf8Path> {
    match &config.source {
        SourceChoice::Local { root } => Some(root),
        SourceChoice::Github { .. } => None,
    }
}

fn merge_field<T: Clone>(target: &mut Option<T>, env_value: Option<T>, file_value: Option<T>) {
    if target.is_none()
        && let Some(value) = env_value.or(file_value)
    {
        *target = Some(value);
    }
}

fn extract_field<T: Clone>(
    layer: &Option<LayerOverrides>,
    accessor: fn(&LayerOverrides) -> &Option<T>,
) -> Option<T> {
    layer.as_ref().and_then(|entry| accessor(entry).clone())
}

use std::path::PathBuf;

use thiserror::Error;
use wikisync_core::RepositoryRef;

use crate::sync::cache::DEFAULT_CACHE_PATH;
use crate::sync::engine::DEFAULT_DOWNLOAD_CONCURRENCY;
use crate::sync::mapping::SyncMapping;

const DEFAULT_WIKI_PATH: &str = "wiki";
const DEFAULT_CONTENT_DIR: &str = "src/content/docs";
const DEFAULT_ATTACHMENTS_DIR: &str = "public/attachments";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("invalid WIKISYNC_MAPPINGS entry `{0}`, expected source:target")]
    InvalidMapping(String),
}

#[derive(Clone, Debug)]
pub struct SyncConfig {
    pub repository: RepositoryRef,
    pub token: String,
    pub api_url: Option<String>,
    pub mappings: Vec<SyncMapping>,
    pub attachments_dir: PathBuf,
    pub cache_path: PathBuf,
    pub download_concurrency: usize,
    pub skip: bool,
}

impl SyncConfig {
    /// Reads settings through `lookup`, normally the process environment.
    pub fn from_lookup<F>(skip_requested: bool, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let skip = skip_requested || read_bool(var("WIKISYNC_SKIP"), false);

        // Credentials are only needed when a sync will actually run.
        let require = |name: &'static str| match var(name) {
            Some(value) => Ok(value),
            None if skip => Ok(String::new()),
            None => Err(ConfigError::Missing(name)),
        };
        let token = require("GITHUB_TOKEN")?;
        let owner = require("GITHUB_REPO_OWNER")?;
        let name = require("GITHUB_REPO_NAME")?;
        let mut repository = RepositoryRef::new(owner, name);
        if let Some(reference) = var("GITHUB_REF") {
            repository = repository.with_reference(reference);
        }

        let collections = var("WIKISYNC_COLLECTIONS")
            .map(|value| split_list(&value))
            .unwrap_or_default();
        let mappings = match var("WIKISYNC_MAPPINGS") {
            Some(value) => parse_mappings(&value)?,
            None => vec![SyncMapping::new(
                var("GITHUB_WIKI_PATH").unwrap_or_else(|| DEFAULT_WIKI_PATH.to_string()),
                var("WIKISYNC_CONTENT_DIR").unwrap_or_else(|| DEFAULT_CONTENT_DIR.to_string()),
            )],
        };
        let mappings = mappings
            .into_iter()
            .map(|mapping| mapping.with_collections(collections.iter().cloned()))
            .collect();

        Ok(Self {
            repository,
            token,
            api_url: var("GITHUB_API_URL"),
            mappings,
            attachments_dir: var("WIKISYNC_ATTACHMENTS_DIR")
                .unwrap_or_else(|| DEFAULT_ATTACHMENTS_DIR.to_string())
                .into(),
            cache_path: var("WIKISYNC_CACHE_PATH")
                .unwrap_or_else(|| DEFAULT_CACHE_PATH.to_string())
                .into(),
            download_concurrency: read_usize(
                var("WIKISYNC_DOWNLOAD_CONCURRENCY"),
                DEFAULT_DOWNLOAD_CONCURRENCY,
            ),
            skip,
        })
    }
}

/// `wiki:src/content/docs,data/guides:src/content/guides`
pub fn parse_mappings(value: &str) -> Result<Vec<SyncMapping>, ConfigError> {
    split_list(value)
        .into_iter()
        .map(|pair| match pair.split_once(':') {
            Some((source, target)) if !target.trim().is_empty() => {
                Ok(SyncMapping::new(source.trim(), target.trim()))
            }
            _ => Err(ConfigError::InvalidMapping(pair)),
        })
        .collect()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_usize(value: Option<String>, default: usize) -> usize {
    value
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| {
            matches!(
                value.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

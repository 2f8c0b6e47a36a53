use std::path::PathBuf;

use thiserror::Error;
use wikisync_core::{ApiErrorClass, GithubClient, GithubError, RemoteTree};

use crate::config::{ConfigError, SyncConfig};
use crate::sync::attachments::{AttachmentResolver, ResolveError, ResolveReport};
use crate::sync::cache::{CacheError, CacheStore};
use crate::sync::engine::{ContentSyncEngine, EngineError, SyncOutcome, SyncReport};
use crate::sync::mapping::SyncMapping;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to resolve the default branch: {0}")]
    DefaultRef(#[source] GithubError),
    #[error("failed to create GitHub client: {0}")]
    Client(#[source] GithubError),
    #[error("sync failed: {0}")]
    Engine(#[from] EngineError),
    #[error("attachment sync failed: {0}")]
    Resolve(#[from] ResolveError),
    #[error("failed to save sync cache: {0}")]
    Cache(#[from] CacheError),
}

impl RunError {
    fn remote(&self) -> Option<&GithubError> {
        match self {
            RunError::DefaultRef(err) | RunError::Client(err) => Some(err),
            RunError::Engine(EngineError::Remote(err)) => Some(err),
            _ => None,
        }
    }

    /// Likely cause of a fatal error, phrased for whoever runs the build.
    pub fn hint(&self) -> Option<&'static str> {
        if let RunError::Config(ConfigError::Missing(_)) = self {
            return Some("set GITHUB_TOKEN, GITHUB_REPO_OWNER and GITHUB_REPO_NAME in the environment or .env");
        }
        match self.remote()?.classification()? {
            ApiErrorClass::Auth => {
                Some("GitHub rejected the credential: GITHUB_TOKEN is invalid, expired or lacks repository access")
            }
            ApiErrorClass::NotFound => Some(
                "repository or ref not found: check GITHUB_REPO_OWNER, GITHUB_REPO_NAME and GITHUB_REF (private repositories also report 404 to tokens without access)",
            ),
            ApiErrorClass::RateLimit => {
                Some("GitHub API rate limit exhausted: wait for the reset or use a token with a higher quota")
            }
            ApiErrorClass::Transient => Some("GitHub is temporarily unavailable: retry the build"),
            ApiErrorClass::Permanent => None,
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    Skipped,
    Unchanged {
        head: String,
    },
    Synced {
        head: String,
        documents: SyncReport,
        attachments: ResolveReport,
    },
}

/// One sync run: load the cache, mirror documents, resolve attachments, save once.
pub struct WikiSync<R: RemoteTree> {
    engine: ContentSyncEngine<R>,
    store: CacheStore,
    reference: Option<String>,
    mappings: Vec<SyncMapping>,
    attachments_dir: PathBuf,
    skip: bool,
}

impl WikiSync<GithubClient> {
    /// Builds a runner from the process environment. `skip_requested` comes from the CLI mode.
    pub fn from_env(skip_requested: bool) -> Result<Self, RunError> {
        Self::from_lookup(skip_requested, |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(skip_requested: bool, lookup: F) -> Result<Self, RunError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_config(SyncConfig::from_lookup(skip_requested, lookup)?)
    }

    pub fn from_config(config: SyncConfig) -> Result<Self, RunError> {
        let client = match config.api_url.as_deref() {
            Some(base) => GithubClient::with_base_url(base, config.repository.clone(), &config.token),
            None => GithubClient::new(config.repository.clone(), &config.token),
        }
        .map_err(RunError::Client)?;
        Ok(Self::new(client, config))
    }
}

impl<R: RemoteTree> WikiSync<R> {
    pub fn new(remote: R, config: SyncConfig) -> Self {
        Self {
            engine: ContentSyncEngine::new(remote)
                .with_download_concurrency(config.download_concurrency),
            store: CacheStore::new(config.cache_path),
            reference: config.repository.reference,
            mappings: config.mappings,
            attachments_dir: config.attachments_dir,
            skip: config.skip,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        if self.skip {
            tracing::info!("sync skipped, keeping existing local content");
            return Ok(RunOutcome::Skipped);
        }

        let reference = match &self.reference {
            Some(reference) => reference.clone(),
            None => self
                .engine
                .remote()
                .default_ref()
                .await
                .map_err(RunError::DefaultRef)?,
        };
        tracing::info!(reference = %reference, "starting sync");

        let mut cache = self.store.load().await;
        let outcome = self.engine.sync(&reference, &self.mappings, &mut cache).await?;

        let (head, documents, references, index) = match outcome {
            SyncOutcome::Unchanged { head } => return Ok(RunOutcome::Unchanged { head }),
            SyncOutcome::Synced {
                head,
                report,
                references,
                index,
            } => (head, report, references, index),
        };

        let attachments = AttachmentResolver::new(self.engine.remote(), &reference, &self.attachments_dir)
            .resolve(&references, &index, &mut cache)
            .await?;

        cache.mark_synced(&head);
        self.store.save(&cache).await?;

        tracing::info!(
            %head,
            downloaded = documents.downloaded,
            unchanged = documents.unchanged,
            removed = documents.removed,
            attachments_downloaded = attachments.downloaded,
            attachments_missing = attachments.missing,
            attachments_removed = attachments.removed,
            "sync complete"
        );
        Ok(RunOutcome::Synced {
            head,
            documents,
            attachments,
        })
    }
}

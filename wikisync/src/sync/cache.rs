use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const CACHE_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_CACHE_PATH: &str = ".cache/github-wiki-cache.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything the previous run synchronised, persisted as one JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDocument {
    pub schema_version: u32,
    pub repository_content_hash: String,
    pub last_sync_timestamp: String,
    #[serde(default)]
    pub files: BTreeMap<String, FileCacheEntry>,
    #[serde(default)]
    pub attachments: BTreeMap<String, AttachmentCacheEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileCacheEntry {
    pub content_hash: String,
    pub local_path: PathBuf,
    pub synced_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentCacheEntry {
    pub content_hash: String,
    pub source_path: String,
    pub local_path: PathBuf,
    pub synced_at: String,
    #[serde(default)]
    pub referenced_by: BTreeSet<String>,
}

impl Default for CacheDocument {
    fn default() -> Self {
        Self::empty()
    }
}

impl CacheDocument {
    pub fn empty() -> Self {
        Self {
            schema_version: CACHE_SCHEMA_VERSION,
            repository_content_hash: String::new(),
            last_sync_timestamp: String::new(),
            files: BTreeMap::new(),
            attachments: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.repository_content_hash.is_empty()
            && self.files.is_empty()
            && self.attachments.is_empty()
    }

    pub fn mark_synced(&mut self, repository_content_hash: &str) {
        self.repository_content_hash = repository_content_hash.to_string();
        self.last_sync_timestamp = now_rfc3339();
    }
}

/// Loads and atomically replaces the cache document at a fixed path.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing, unreadable and other-version documents all load as empty.
    pub async fn load(&self) -> CacheDocument {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no sync cache yet");
                return CacheDocument::empty();
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "sync cache unreadable: {err}");
                return CacheDocument::empty();
            }
        };

        // Peek at the version first so a future layout never fails to parse as ours.
        let version = serde_json::from_slice::<VersionProbe>(&raw).map(|probe| probe.schema_version);
        match version {
            Ok(Some(CACHE_SCHEMA_VERSION)) => {}
            Ok(other) => {
                tracing::warn!(
                    found = ?other,
                    expected = CACHE_SCHEMA_VERSION,
                    "sync cache version mismatch, rebuilding cache"
                );
                return CacheDocument::empty();
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "sync cache is corrupt: {err}");
                return CacheDocument::empty();
            }
        }

        match serde_json::from_slice::<CacheDocument>(&raw) {
            Ok(document) => document,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), "sync cache is corrupt: {err}");
                CacheDocument::empty()
            }
        }
    }

    /// Writes `<path>.tmp` and renames it over the canonical document.
    pub async fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(parent, source))?;
        }

        let payload = serde_json::to_vec_pretty(document)?;
        let temp = temp_path(&self.path);
        tokio::fs::write(&temp, payload)
            .await
            .map_err(|source| self.io_error(&temp, source))?;
        if let Err(source) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(self.io_error(&self.path, source));
        }
        Ok(())
    }

    fn io_error(&self, path: &Path, source: io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub async fn local_file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionProbe {
    #[serde(default)]
    schema_version: Option<u32>,
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use futures_util::{StreamExt, stream};
use thiserror::Error;
use wikisync_core::{GithubError, RemoteTree};

use super::attachments::{AttachmentIndex, remove_if_present};
use super::cache::{CacheDocument, FileCacheEntry, local_file_exists, now_rfc3339};
use super::mapping::SyncMapping;
use super::paths::{PathError, local_path_for};
use super::references::ImageReferences;

pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("remote error: {0}")]
    Remote(#[from] GithubError),
    #[error("path error: {0}")]
    Path(#[from] PathError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub downloaded: usize,
    pub unchanged: usize,
    pub removed: usize,
}

#[derive(Debug)]
pub enum SyncOutcome {
    /// Head unchanged and every cached artifact still on disk; nothing was fetched.
    Unchanged { head: String },
    Synced {
        head: String,
        report: SyncReport,
        references: ImageReferences,
        index: AttachmentIndex,
    },
}

impl SyncOutcome {
    pub fn head(&self) -> &str {
        match self {
            Self::Unchanged { head } | Self::Synced { head, .. } => head,
        }
    }
}

struct Download {
    key: String,
    content_hash: String,
    local_path: PathBuf,
}

/// Mirrors mapped subtrees of a remote tree into local directories.
pub struct ContentSyncEngine<R: RemoteTree> {
    remote: R,
    download_concurrency: usize,
}

impl<R: RemoteTree> ContentSyncEngine<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }

    pub fn with_download_concurrency(mut self, limit: usize) -> Self {
        self.download_concurrency = limit.max(1);
        self
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub async fn sync(
        &self,
        reference: &str,
        mappings: &[SyncMapping],
        cache: &mut CacheDocument,
    ) -> Result<SyncOutcome, EngineError> {
        let head = self.remote.head_content_hash(reference).await?;
        if head == cache.repository_content_hash && fast_path_holds(mappings, cache).await {
            tracing::info!(%head, "repository unchanged since last sync");
            return Ok(SyncOutcome::Unchanged { head });
        }

        let tree = self.remote.tree(reference).await?;
        let index = AttachmentIndex::build(&tree);
        tracing::debug!(entries = tree.len(), attachments = index.len(), "fetched tree");

        let mut report = SyncReport::default();
        let mut references = ImageReferences::new();
        let mut present = BTreeSet::new();
        let mut downloads = Vec::new();

        for mapping in mappings {
            let selected = mapping.select(&tree);
            tracing::info!(
                source = %mapping.source_path,
                target = %mapping.target_dir.display(),
                documents = selected.len(),
                "syncing mapping"
            );
            for (entry, relative) in selected {
                let local_path = local_path_for(&mapping.target_dir, relative)?;
                present.insert(entry.path.clone());

                if let Some(content) =
                    cached_content(cache, &entry.path, &entry.content_hash, &local_path).await
                {
                    tracing::debug!(path = %entry.path, "document unchanged");
                    references.record(&entry.path, &content);
                    report.unchanged += 1;
                    continue;
                }
                downloads.push(Download {
                    key: entry.path.clone(),
                    content_hash: entry.content_hash.clone(),
                    local_path,
                });
            }
        }

        let remote = &self.remote;
        let mut fetched = stream::iter(downloads)
            .map(|job| async move {
                let bytes = remote.blob(&job.content_hash).await;
                (job, bytes)
            })
            .buffer_unordered(self.download_concurrency);

        while let Some((job, bytes)) = fetched.next().await {
            let bytes = bytes?;
            write_document(&job.local_path, &bytes).await?;
            tracing::info!(path = %job.key, local = %job.local_path.display(), "synced document");

            references.record(&job.key, &String::from_utf8_lossy(&bytes));
            let previous = cache.files.insert(
                job.key,
                FileCacheEntry {
                    content_hash: job.content_hash,
                    local_path: job.local_path.clone(),
                    synced_at: now_rfc3339(),
                },
            );
            if let Some(previous) = previous
                && previous.local_path != job.local_path
            {
                remove_relocated(&previous.local_path).await;
            }
            report.downloaded += 1;
        }

        report.removed = remove_stale_documents(cache, &present).await;

        Ok(SyncOutcome::Synced {
            head,
            report,
            references,
            index,
        })
    }
}

/// Every cached artifact still exists and each mapping target holds at least one document.
async fn fast_path_holds(mappings: &[SyncMapping], cache: &CacheDocument) -> bool {
    for entry in cache.files.values() {
        if !local_file_exists(&entry.local_path).await {
            tracing::info!(path = %entry.local_path.display(), "cached document missing locally");
            return false;
        }
    }
    for entry in cache.attachments.values() {
        if !local_file_exists(&entry.local_path).await {
            tracing::info!(path = %entry.local_path.display(), "cached attachment missing locally");
            return false;
        }
    }
    mappings.iter().all(|mapping| {
        let populated = cache
            .files
            .values()
            .any(|entry| entry.local_path.starts_with(&mapping.target_dir));
        if !populated {
            tracing::info!(target = %mapping.target_dir.display(), "mapping target not populated");
        }
        populated
    })
}

/// Local content of a cache hit, or `None` when the document must be fetched.
/// A cached copy outside the current target directory is a miss.
async fn cached_content(
    cache: &CacheDocument,
    key: &str,
    content_hash: &str,
    local_path: &Path,
) -> Option<String> {
    let entry = cache.files.get(key)?;
    if entry.content_hash != content_hash
        || entry.local_path != local_path
        || !local_file_exists(&entry.local_path).await
    {
        return None;
    }
    match tokio::fs::read(&entry.local_path).await {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) => {
            tracing::warn!(path = %entry.local_path.display(), "cached document unreadable: {err}");
            None
        }
    }
}

/// Drops the copy left behind when a document's target directory changed.
async fn remove_relocated(path: &Path) {
    match remove_if_present(path).await {
        Ok(()) => tracing::info!(path = %path.display(), "removed copy from previous target"),
        Err(err) => tracing::warn!(path = %path.display(), "failed to remove previous copy: {err}"),
    }
}

async fn write_document(path: &Path, bytes: &[u8]) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| EngineError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_stale_documents(cache: &mut CacheDocument, present: &BTreeSet<String>) -> usize {
    let stale: Vec<String> = cache
        .files
        .keys()
        .filter(|key| !present.contains(*key))
        .cloned()
        .collect();

    for key in &stale {
        if let Some(entry) = cache.files.remove(key) {
            match remove_if_present(&entry.local_path).await {
                Ok(()) => tracing::info!(path = %key, "removed document deleted upstream"),
                Err(err) => tracing::warn!(
                    path = %entry.local_path.display(),
                    "failed to remove stale document: {err}"
                ),
            }
        }
    }
    stale.len()
}

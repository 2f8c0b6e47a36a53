use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use wikisync_core::{RemoteTree, TreeEntry};

use super::cache::{AttachmentCacheEntry, CacheDocument, local_file_exists, now_rfc3339};
use super::paths::{PathError, local_path_for};
use super::references::ImageReferences;
use crate::slug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentIndexEntry {
    pub filename: String,
    pub repository_path: String,
    pub content_hash: String,
}

/// Every image-like blob in the tree, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct AttachmentIndex {
    entries: BTreeMap<String, AttachmentIndexEntry>,
    collisions: BTreeMap<String, Vec<String>>,
}

impl AttachmentIndex {
    /// Image entries are visited in path order, so when names collide the
    /// lexicographically greatest path is the one kept.
    pub fn build(tree: &[TreeEntry]) -> Self {
        let mut images: Vec<&TreeEntry> = tree
            .iter()
            .filter(|entry| entry.is_file() && slug::is_image_like_filename(&entry.path))
            .collect();
        images.sort_by(|a, b| a.path.cmp(&b.path));

        let mut index = Self::default();
        for entry in images {
            let filename = slug::file_name(&entry.path).to_string();
            let replacement = AttachmentIndexEntry {
                filename: filename.clone(),
                repository_path: entry.path.clone(),
                content_hash: entry.content_hash.clone(),
            };
            if let Some(previous) = index.entries.insert(filename.clone(), replacement) {
                let paths = index.collisions.entry(filename).or_default();
                if paths.is_empty() {
                    paths.push(previous.repository_path);
                }
                paths.push(entry.path.clone());
            }
        }

        for (filename, paths) in &index.collisions {
            tracing::warn!(
                filename,
                kept = paths.last().map(String::as_str).unwrap_or_default(),
                candidates = ?paths,
                "attachment name is ambiguous"
            );
        }
        index
    }

    pub fn get(&self, filename: &str) -> Option<&AttachmentIndexEntry> {
        self.entries.get(filename)
    }

    /// File name -> every repository path sharing it, in scan order.
    pub fn collisions(&self) -> &BTreeMap<String, Vec<String>> {
        &self.collisions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("path error: {0}")]
    Path(#[from] PathError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub missing: usize,
    pub failed: usize,
    pub removed: usize,
}

/// Downloads referenced attachments into one flat directory and prunes unreferenced ones.
pub struct AttachmentResolver<'a, R: RemoteTree> {
    remote: &'a R,
    reference: &'a str,
    attachments_dir: &'a Path,
}

impl<'a, R: RemoteTree> AttachmentResolver<'a, R> {
    pub fn new(remote: &'a R, reference: &'a str, attachments_dir: &'a Path) -> Self {
        Self {
            remote,
            reference,
            attachments_dir,
        }
    }

    pub async fn resolve(
        &self,
        references: &ImageReferences,
        index: &AttachmentIndex,
        cache: &mut CacheDocument,
    ) -> Result<ResolveReport, ResolveError> {
        let mut report = ResolveReport::default();
        if !references.is_empty() {
            tokio::fs::create_dir_all(self.attachments_dir)
                .await
                .map_err(|source| io_error(self.attachments_dir, source))?;
        }

        for filename in references.filenames() {
            let Some(indexed) = index.get(filename) else {
                tracing::warn!(filename, "could not find attachment in repository");
                report.missing += 1;
                continue;
            };
            let referenced_by = references
                .referenced_by(filename)
                .cloned()
                .unwrap_or_default();

            let local_path = local_path_for(self.attachments_dir, filename)?;
            if let Some(cached) = cache.attachments.get_mut(filename)
                && cached.content_hash == indexed.content_hash
                && cached.local_path == local_path
                && local_file_exists(&cached.local_path).await
            {
                tracing::debug!(filename, "attachment unchanged");
                cached.source_path = indexed.repository_path.clone();
                cached.referenced_by = referenced_by;
                report.skipped += 1;
                continue;
            }

            let bytes = match self
                .remote
                .file_at(&indexed.repository_path, self.reference)
                .await
            {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::warn!(
                        filename,
                        source = %indexed.repository_path,
                        "failed to download attachment: {err}"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            tokio::fs::write(&local_path, &bytes)
                .await
                .map_err(|source| io_error(&local_path, source))?;
            tracing::info!(filename, source = %indexed.repository_path, "downloaded attachment");

            let previous = cache.attachments.insert(
                filename.to_string(),
                AttachmentCacheEntry {
                    content_hash: indexed.content_hash.clone(),
                    source_path: indexed.repository_path.clone(),
                    local_path: local_path.clone(),
                    synced_at: now_rfc3339(),
                    referenced_by,
                },
            );
            // The attachments directory moved; the old copy is no longer tracked.
            if let Some(previous) = previous
                && previous.local_path != local_path
                && let Err(err) = remove_if_present(&previous.local_path).await
            {
                tracing::warn!(
                    path = %previous.local_path.display(),
                    "failed to remove previous attachment copy: {err}"
                );
            }
            report.downloaded += 1;
        }

        report.removed = self.prune(references, cache).await?;
        Ok(report)
    }

    async fn prune(
        &self,
        references: &ImageReferences,
        cache: &mut CacheDocument,
    ) -> Result<usize, ResolveError> {
        let stale: Vec<String> = cache
            .attachments
            .keys()
            .filter(|filename| !references.contains(filename))
            .cloned()
            .collect();

        for filename in &stale {
            if let Some(entry) = cache.attachments.remove(filename) {
                remove_if_present(&entry.local_path)
                    .await
                    .map_err(|source| io_error(&entry.local_path, source))?;
                tracing::info!(filename, "removed unreferenced attachment");
            }
        }
        Ok(stale.len())
    }
}

/// Deletes `path`, treating an already-missing file as success.
pub async fn remove_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn io_error(path: &Path, source: io::Error) -> ResolveError {
    ResolveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

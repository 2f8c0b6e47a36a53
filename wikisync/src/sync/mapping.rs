use std::path::PathBuf;

use wikisync_core::TreeEntry;

use super::paths::relative_to;

pub const DEFAULT_DOCUMENT_EXTENSION: &str = ".md";
pub const DEFAULT_EXCLUDED_NAME: &str = "readme.md";
pub const COLLECTION_INDEX_NAME: &str = "index.md";

/// One remote subtree mirrored into one local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMapping {
    pub source_path: String,
    pub target_dir: PathBuf,
    pub exclusions: ExclusionPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionPolicy {
    /// Compared case-insensitively against the file name.
    pub excluded_names: Vec<String>,
    /// Directories, relative to the source path, of which only `index.md` is synced.
    pub collection_dirs: Vec<String>,
    pub document_extension: String,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self {
            excluded_names: vec![DEFAULT_EXCLUDED_NAME.to_string()],
            collection_dirs: Vec::new(),
            document_extension: DEFAULT_DOCUMENT_EXTENSION.to_string(),
        }
    }
}

impl SyncMapping {
    pub fn new(source_path: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into().trim_matches('/').to_string(),
            target_dir: target_dir.into(),
            exclusions: ExclusionPolicy::default(),
        }
    }

    pub fn with_collections<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.collection_dirs = dirs
            .into_iter()
            .map(|dir| dir.into().trim_matches('/').to_string())
            .filter(|dir| !dir.is_empty())
            .collect();
        self
    }

    /// Path of `entry` relative to the source path if the entry is a document this mapping syncs.
    pub fn relative_document_path<'a>(&self, entry: &'a TreeEntry) -> Option<&'a str> {
        if !entry.is_file() {
            return None;
        }
        let relative = relative_to(&entry.path, &self.source_path)?;
        if relative.is_empty() || !relative.ends_with(&self.exclusions.document_extension) {
            return None;
        }

        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        if self
            .exclusions
            .excluded_names
            .iter()
            .any(|name| name.eq_ignore_ascii_case(file_name))
        {
            tracing::debug!(path = %entry.path, "skipping excluded file");
            return None;
        }

        for collection in &self.exclusions.collection_dirs {
            if let Some(inside) = relative_to(relative, collection)
                && inside != COLLECTION_INDEX_NAME
            {
                return None;
            }
        }

        Some(relative)
    }

    pub fn select<'a>(&self, tree: &'a [TreeEntry]) -> Vec<(&'a TreeEntry, &'a str)> {
        tree.iter()
            .filter_map(|entry| {
                self.relative_document_path(entry)
                    .map(|relative| (entry, relative))
            })
            .collect()
    }
}

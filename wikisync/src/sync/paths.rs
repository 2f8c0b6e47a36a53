use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("repository path is empty")]
    Empty,
    #[error("repository path contains unsupported component: {0}")]
    UnsupportedComponent(String),
}

/// Maps a `/`-separated repository-relative path under `root`.
pub fn local_path_for(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    if relative.trim_matches('/').is_empty() {
        return Err(PathError::Empty);
    }

    let mut out = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => {
                return Err(PathError::UnsupportedComponent(relative.to_string()));
            }
        }
    }
    Ok(out)
}

/// `wiki/Guides/Setup.md` relative to source `wiki` is `Guides/Setup.md`.
pub fn relative_to<'a>(path: &'a str, source: &str) -> Option<&'a str> {
    let source = source.trim_matches('/');
    if source.is_empty() {
        return Some(path);
    }
    path.strip_prefix(source)?.strip_prefix('/')
}

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::slug;

static EMBED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[\[([^\]|]+?)(?:\|[^\]]*)?\]\]").expect("valid regex"));
static MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));

/// Attachment file names referenced by synced documents, with the documents referencing each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageReferences {
    by_filename: BTreeMap<String, BTreeSet<String>>,
}

impl ImageReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, document: &str, content: &str) {
        for filename in extract_image_references(content) {
            self.by_filename
                .entry(filename)
                .or_default()
                .insert(document.to_string());
        }
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.by_filename.contains_key(filename)
    }

    pub fn referenced_by(&self, filename: &str) -> Option<&BTreeSet<String>> {
        self.by_filename.get(filename)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.by_filename.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_filename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_filename.is_empty()
    }
}

/// File names of local images referenced by `![[...]]` embeds or `![alt](...)` images.
pub fn extract_image_references(markdown: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    for captures in EMBED.captures_iter(markdown) {
        let target = captures[1].trim();
        let (target, _) = slug::split_fragment(target);
        push_image(&mut found, target);
    }

    for captures in MARKDOWN_IMAGE.captures_iter(markdown) {
        let Some(target) = markdown_target(&captures[2]) else {
            continue;
        };
        if is_remote(target) {
            continue;
        }
        push_image(&mut found, target);
    }

    found
}

fn push_image(found: &mut BTreeSet<String>, target: &str) {
    let filename = slug::file_name(target.trim());
    if !filename.is_empty() && slug::is_image_like_filename(filename) {
        found.insert(filename.to_string());
    }
}

/// `<path with spaces.png> "title"` or `path.png "title"` -> the path alone.
fn markdown_target(raw: &str) -> Option<&str> {
    let raw = raw.trim();
    let target = if let Some(rest) = raw.strip_prefix('<') {
        rest.split_once('>').map(|(inside, _)| inside)?
    } else {
        raw.split_whitespace().next()?
    };
    let target = target.split(['?', '#']).next().unwrap_or(target);
    Some(target)
}

fn is_remote(target: &str) -> bool {
    target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("//")
        || target.starts_with("data:")
}

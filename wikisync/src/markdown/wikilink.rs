//! Tokenizer for Obsidian-style wikilinks.
//!
//! Supports:
//! - Basic links: `[[Note]]`
//! - Aliases: `[[Note|Display Text]]`
//! - Headings: `[[Note#Heading]]`
//! - Embeds: `![[diagram.png]]`
//! - Paths: `[[folder/Note]]`

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::slug;

static WIKILINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(!)?\[\[([^\]]+?)\]\]").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikilinkReference {
    /// Target with alias and heading removed: `folder/Note`
    pub raw_target: String,
    pub alias: Option<String>,
    pub heading: Option<String>,
    pub is_embed: bool,
}

impl WikilinkReference {
    /// Alias if present, otherwise the last path segment of the target.
    pub fn display_text(&self) -> &str {
        match (self.alias.as_deref(), self.heading.as_deref()) {
            (Some(alias), _) if !alias.is_empty() => alias,
            (_, Some(heading)) if self.raw_target.is_empty() => heading,
            _ => slug::file_name(&self.raw_target),
        }
    }

    /// Published URL for a non-image target; `[[#Heading]]` stays on the current page.
    pub fn url(&self) -> String {
        if self.is_image_embed() {
            slug::attachment_url(&self.raw_target)
        } else if self.raw_target.is_empty() {
            slug::fragment_suffix(self.heading.as_deref())
        } else {
            slug::resolve_link_target(&self.raw_target, self.heading.as_deref())
        }
    }

    pub fn is_image_embed(&self) -> bool {
        self.is_embed && slug::is_image_like_filename(&self.raw_target)
    }
}

/// A wikilink together with the byte range it occupies in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikilinkMatch {
    pub span: Range<usize>,
    pub reference: WikilinkReference,
}

pub fn tokenize(text: &str) -> Vec<WikilinkMatch> {
    WIKILINK
        .captures_iter(text)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let inner = captures.get(2)?.as_str();
            Some(WikilinkMatch {
                span: whole.range(),
                reference: parse_inner(inner, captures.get(1).is_some()),
            })
        })
        .collect()
}

fn parse_inner(inner: &str, is_embed: bool) -> WikilinkReference {
    let (target_part, alias) = match inner.split_once('|') {
        Some((target, alias)) => (target, Some(alias.trim().to_string())),
        None => (inner, None),
    };
    let (target, heading) = slug::split_fragment(target_part);

    WikilinkReference {
        raw_target: target.trim().to_string(),
        alias,
        heading: heading
            .map(str::trim)
            .filter(|heading| !heading.is_empty())
            .map(str::to_string),
        is_embed,
    }
}

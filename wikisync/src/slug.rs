//! Path and URL conventions shared by the sync engine and the link rewriter.
//!
//! A document written to `<target>/Getting Started/Setup.md` is published at
//! `/getting-started/setup`, and an attachment named `diagram.png` anywhere in
//! the repository is written to `<attachments>/diagram.png` and published at
//! `/attachments/diagram.png`. Both sides go through these functions.

use once_cell::sync::Lazy;
use regex::Regex;

pub const ATTACHMENTS_URL_PREFIX: &str = "/attachments/";

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "svg", "webp", "apng", "bmp", "ico",
];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static NON_SLUG: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-/]").expect("valid regex"));

pub fn is_image_like_filename(name: &str) -> bool {
    let name = file_name(name);
    match name.rsplit_once('.') {
        Some((_, ext)) => IMAGE_EXTENSIONS
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Last `/`-separated segment of a repository or link path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn strip_legacy_prefix(path: &str) -> Option<&str> {
    path.strip_prefix("/wiki/")
        .or_else(|| path.strip_prefix("wiki/"))
}

pub fn remove_index_suffix(path: &str) -> &str {
    if path == "index" || path == "index.md" {
        ""
    } else if let Some(stripped) = path.strip_suffix("/index.md") {
        stripped
    } else if let Some(stripped) = path.strip_suffix("/index") {
        stripped
    } else if let Some(stripped) = path.strip_suffix(".md") {
        stripped
    } else {
        path
    }
}

/// Lowercase, collapse whitespace runs to `-`, drop anything outside `[\w-/]`.
///
/// `\w` is Unicode-aware, so accented and non-Latin letters survive:
/// `Café Menu` becomes `café-menu`, not `caf-menu`.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    NON_SLUG.replace_all(&hyphenated, "").into_owned()
}

pub fn ensure_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Splits `page#section` into `("page", Some("section"))`.
pub fn split_fragment(target: &str) -> (&str, Option<&str>) {
    match target.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (target, None),
    }
}

pub fn fragment_suffix(fragment: Option<&str>) -> String {
    match fragment.map(slugify) {
        Some(fragment) if !fragment.is_empty() => format!("#{fragment}"),
        _ => String::new(),
    }
}

pub fn attachment_url(target: &str) -> String {
    format!("{ATTACHMENTS_URL_PREFIX}{}", file_name(target))
}

/// Published URL of a repository-relative document path, e.g.
/// `Getting Started/Setup.md` -> `/getting-started/setup`.
pub fn page_url(path: &str, fragment: Option<&str>) -> String {
    let path = remove_index_suffix(path);
    let url = ensure_leading_slash(&slugify(path));
    format!("{url}{}", fragment_suffix(fragment))
}

/// Resolves a wikilink target plus optional heading to its published URL.
pub fn resolve_link_target(target: &str, heading: Option<&str>) -> String {
    let (path, inline_fragment) = split_fragment(target.trim());
    let path = path.trim();
    let path = strip_legacy_prefix(path).unwrap_or(path);
    page_url(path, heading.or(inline_fragment).map(str::trim))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_image_extensions_case_insensitively() {
        assert!(is_image_like_filename("diagram.PNG"));
        assert!(is_image_like_filename("assets/nested/photo.jpeg"));
        assert!(is_image_like_filename("favicon.ico"));
        assert!(!is_image_like_filename("notes.md"));
        assert!(!is_image_like_filename("png"));
        assert!(!is_image_like_filename("archive.png.zip"));
    }

    #[test]
    fn slugify_lowercases_and_hyphenates() {
        assert_eq!(slugify("Getting Started/Setup"), "getting-started/setup");
        assert_eq!(slugify("What's  New?"), "whats-new");
        assert_eq!(slugify("snake_case-ok"), "snake_case-ok");
    }

    #[test]
    fn resolves_nested_targets() {
        assert_eq!(
            resolve_link_target("Getting Started/Setup", None),
            "/getting-started/setup"
        );
        assert_eq!(resolve_link_target("wiki/Team/index.md", None), "/team");
        assert_eq!(resolve_link_target("/wiki/Guides/Intro", None), "/guides/intro");
    }

    #[test]
    fn heading_fragments_are_slugified() {
        assert_eq!(
            resolve_link_target("Page", Some("Section One")),
            "/page#section-one"
        );
        assert_eq!(resolve_link_target("Page#Deep Dive", None), "/page#deep-dive");
        assert_eq!(resolve_link_target("Page", Some("")), "/page");
    }

    #[test]
    fn index_suffixes_are_removed_in_order() {
        assert_eq!(remove_index_suffix("guides/index.md"), "guides");
        assert_eq!(remove_index_suffix("guides/index"), "guides");
        assert_eq!(remove_index_suffix("guides/intro.md"), "guides/intro");
        assert_eq!(remove_index_suffix("guides/intro"), "guides/intro");
        assert_eq!(page_url(remove_index_suffix("index.md"), None), "/");
    }

    #[test]
    fn attachment_urls_flatten_directories() {
        assert_eq!(
            attachment_url("assets/nested/diagram.png"),
            "/attachments/diagram.png"
        );
        assert_eq!(attachment_url("logo.svg"), "/attachments/logo.svg");
    }

    #[test]
    fn slugify_keeps_unicode_letters() {
        assert_eq!(slugify("Café Menu"), "café-menu");
        assert_eq!(slugify("Überblick/Straße"), "überblick/straße");
        assert_eq!(resolve_link_target("Café", None), "/café");
        assert_eq!(slugify("Q&A: Why?"), "qa-why");
    }
}

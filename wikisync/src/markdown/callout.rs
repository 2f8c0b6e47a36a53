use once_cell::sync::Lazy;
use regex::Regex;

use super::ast::AsideKind;

// `[!type]`, `[!type]+` or `[!type]-`, then an optional title up to the end of the line.
// Fold markers are consumed and dropped; asides have no collapsed state.
static HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[!(\w+)\]([-+])?[ \t]*([^\n]*)\n?").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalloutHeader {
    /// Lowercased callout type as written: `warning`
    pub callout_type: String,
    pub kind: AsideKind,
    pub title: Option<String>,
    /// Byte length of the header line, including its newline.
    pub consumed: usize,
}

/// Parses the header line at the very start of a blockquote's first text run.
pub fn parse_header(text: &str) -> Option<CalloutHeader> {
    let captures = HEADER.captures(text)?;
    let callout_type = captures.get(1)?.as_str().to_lowercase();
    let title = captures
        .get(3)
        .map(|title| title.as_str().trim())
        .filter(|title| !title.is_empty())
        .map(str::to_string);

    Some(CalloutHeader {
        kind: aside_kind_for(&callout_type),
        callout_type,
        title,
        consumed: captures.get(0)?.end(),
    })
}

pub fn aside_kind_for(callout_type: &str) -> AsideKind {
    match callout_type.to_ascii_lowercase().as_str() {
        "tip" | "example" | "success" => AsideKind::Tip,
        "warning" | "caution" => AsideKind::Caution,
        "danger" | "error" | "bug" => AsideKind::Danger,
        // note, info, quote, question, todo, abstract, summary and anything unknown
        _ => AsideKind::Note,
    }
}

use super::ast::Node;
use super::callout;
use super::wikilink::{self, WikilinkReference};
use crate::slug;

const INTERNAL_LINK_CLASS: &str = "internal-link";
const INTERNAL_EMBED_CLASS: &str = "internal-link-embed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    StripLegacyPrefix,
    Wikilinks,
    Callouts,
}

/// Rewrites one rendered document so its internal links resolve on the site.
#[derive(Debug, Clone)]
pub struct LinkRewritePipeline {
    stages: Vec<Stage>,
}

impl Default for LinkRewritePipeline {
    fn default() -> Self {
        Self {
            stages: vec![Stage::StripLegacyPrefix, Stage::Wikilinks, Stage::Callouts],
        }
    }
}

impl LinkRewritePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(&self, tree: &mut Node) {
        for stage in &self.stages {
            match stage {
                Stage::StripLegacyPrefix => strip_legacy_prefixes(tree),
                Stage::Wikilinks => expand_wikilinks(tree),
                Stage::Callouts => convert_callouts(tree),
            }
        }
    }
}

pub fn strip_legacy_prefixes(node: &mut Node) {
    match node {
        Node::Link { url, .. } => {
            if let Some(rewritten) = rewrite_legacy_url(url, false) {
                *url = rewritten;
            }
        }
        Node::Image { url, .. } => {
            if let Some(rewritten) = rewrite_legacy_url(url, true) {
                *url = rewritten;
            }
        }
        _ => {}
    }
    if let Some(children) = node.children_mut() {
        children.iter_mut().for_each(strip_legacy_prefixes);
    }
}

fn rewrite_legacy_url(url: &str, is_image: bool) -> Option<String> {
    if url.starts_with("http://") || url.starts_with("https://") || url.starts_with('#') {
        return None;
    }
    let stripped = slug::strip_legacy_prefix(url)?;
    let (path, fragment) = slug::split_fragment(stripped);
    if is_image || slug::is_image_like_filename(path) {
        Some(slug::attachment_url(path))
    } else {
        Some(slug::page_url(path, fragment))
    }
}

pub fn expand_wikilinks(node: &mut Node) {
    // Link text is left alone, and code never contains links.
    if matches!(node, Node::Link { .. }) {
        return;
    }
    let Some(children) = node.children_mut() else {
        return;
    };
    if children
        .iter()
        .any(|child| matches!(child, Node::Text { value } if value.contains("[[")))
    {
        let previous = std::mem::take(children);
        for child in previous {
            match child {
                Node::Text { value } => children.extend(split_text(&value)),
                other => children.push(other),
            }
        }
    }
    children.iter_mut().for_each(expand_wikilinks);
}

/// Replaces each wikilink span in `text` and keeps the text between spans as-is.
fn split_text(text: &str) -> Vec<Node> {
    let matches = wikilink::tokenize(text);
    if matches.is_empty() {
        return vec![Node::text(text)];
    }

    let mut nodes = Vec::with_capacity(matches.len() * 2 + 1);
    let mut cursor = 0;
    for found in matches {
        if found.span.start > cursor {
            nodes.push(Node::text(&text[cursor..found.span.start]));
        }
        nodes.push(wikilink_node(&found.reference));
        cursor = found.span.end;
    }
    if cursor < text.len() {
        nodes.push(Node::text(&text[cursor..]));
    }
    nodes
}

fn wikilink_node(reference: &WikilinkReference) -> Node {
    let display = reference.display_text().to_string();
    if reference.is_image_embed() {
        return Node::image(reference.url(), display);
    }
    let class_name = if reference.is_embed {
        INTERNAL_EMBED_CLASS
    } else {
        INTERNAL_LINK_CLASS
    };
    Node::Link {
        url: reference.url(),
        title: None,
        class_name: Some(class_name.to_string()),
        children: vec![Node::text(display)],
    }
}

pub fn convert_callouts(node: &mut Node) {
    let Some(children) = node.children_mut() else {
        return;
    };
    for child in children.iter_mut() {
        if let Node::Blockquote { children: quoted } = child
            && let Some(aside) = callout_to_aside(quoted)
        {
            *child = aside;
        }
        convert_callouts(child);
    }
}

fn callout_to_aside(quoted: &mut Vec<Node>) -> Option<Node> {
    let Some(Node::Paragraph { children: inline }) = quoted.first() else {
        return None;
    };
    let Some(Node::Text { value: first_text }) = inline.first() else {
        return None;
    };
    let header = callout::parse_header(first_text)?;

    let mut blocks = std::mem::take(quoted).into_iter();
    let Some(Node::Paragraph { children: inline }) = blocks.next() else {
        return None;
    };
    let mut inline = inline.into_iter();
    let remainder = match inline.next() {
        Some(Node::Text { value }) => value[header.consumed..].trim_start().to_string(),
        _ => String::new(),
    };

    let mut first_paragraph = Vec::new();
    if !remainder.trim().is_empty() {
        first_paragraph.push(Node::text(remainder));
    }
    first_paragraph.extend(inline);

    let mut body = Vec::new();
    if !first_paragraph.is_empty() {
        body.push(Node::paragraph(first_paragraph));
    }
    body.extend(blocks);

    if body.is_empty() {
        tracing::debug!(callout = %header.callout_type, "callout has no body");
    }

    Some(Node::Aside {
        kind: header.kind,
        title: header.title,
        children: body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown::ast::AsideKind;

    fn root(children: Vec<Node>) -> Node {
        Node::Root { children }
    }

    #[test]
    fn strips_legacy_prefix_from_links() {
        let mut tree = root(vec![Node::paragraph(vec![
            Node::link("wiki/Getting Started/Setup.md#First Steps", vec![Node::text("setup")]),
            Node::link("/wiki/Team/index", vec![Node::text("team")]),
            Node::link("https://example.com/wiki/page", vec![Node::text("external")]),
            Node::link("#local", vec![Node::text("anchor")]),
            Node::link("other/page.md", vec![Node::text("untouched")]),
        ])]);

        strip_legacy_prefixes(&mut tree);

        let urls: Vec<_> = tree.children().unwrap()[0]
            .children()
            .unwrap()
            .iter()
            .map(|node| match node {
                Node::Link { url, .. } => url.as_str(),
                other => panic!("unexpected node {other:?}"),
            })
            .collect();
        assert_eq!(
            urls,
            vec![
                "/getting-started/setup#first-steps",
                "/team",
                "https://example.com/wiki/page",
                "#local",
                "other/page.md",
            ]
        );
    }

    #[test]
    fn strips_legacy_prefix_from_images() {
        let mut tree = root(vec![
            Node::image("wiki/assets/nested/chart.png", "chart"),
            Node::link("/wiki/files/photo.jpg", vec![Node::text("photo")]),
        ]);

        strip_legacy_prefixes(&mut tree);

        assert_eq!(
            tree.children().unwrap(),
            &[
                Node::image("/attachments/chart.png", "chart"),
                Node::link("/attachments/photo.jpg", vec![Node::text("photo")]),
            ]
        );
    }

    #[test]
    fn wikilinks_are_replaced_span_exactly() {
        let mut tree = root(vec![Node::paragraph(vec![Node::text(
            "Read [[Getting Started/Setup|the setup]] and ![[diagram.png]] now.",
        )])]);

        expand_wikilinks(&mut tree);

        let paragraph = &tree.children().unwrap()[0];
        assert_eq!(
            paragraph.children().unwrap(),
            &[
                Node::text("Read "),
                Node::Link {
                    url: "/getting-started/setup".to_string(),
                    title: None,
                    class_name: Some("internal-link".to_string()),
                    children: vec![Node::text("the setup")],
                },
                Node::text(" and "),
                Node::image("/attachments/diagram.png", "diagram.png"),
                Node::text(" now."),
            ]
        );
        assert_eq!(
            paragraph.plain_text(),
            "Read the setup and diagram.png now."
        );
    }

    #[test]
    fn wikilink_headings_and_document_embeds() {
        let mut tree = root(vec![Node::Heading {
            depth: 2,
            children: vec![Node::text("[[Page#Section One]]![[Meeting Notes]]")],
        }]);

        expand_wikilinks(&mut tree);

        assert_eq!(
            tree.children().unwrap()[0].children().unwrap(),
            &[
                Node::Link {
                    url: "/page#section-one".to_string(),
                    title: None,
                    class_name: Some("internal-link".to_string()),
                    children: vec![Node::text("Page")],
                },
                Node::Link {
                    url: "/meeting-notes".to_string(),
                    title: None,
                    class_name: Some("internal-link-embed".to_string()),
                    children: vec![Node::text("Meeting Notes")],
                },
            ]
        );
    }

    #[test]
    fn wikilinks_inside_code_are_untouched() {
        let code = Node::Code {
            lang: None,
            value: "[[Not A Link]]".to_string(),
        };
        let inline = Node::InlineCode {
            value: "[[Nope]]".to_string(),
        };
        let mut tree = root(vec![code.clone(), Node::paragraph(vec![inline.clone()])]);

        expand_wikilinks(&mut tree);

        assert_eq!(
            tree,
            root(vec![code, Node::paragraph(vec![inline])])
        );
    }

    #[test]
    fn nested_wikilinks_in_lists_are_expanded() {
        let mut tree = root(vec![Node::List {
            ordered: false,
            children: vec![Node::ListItem {
                children: vec![Node::paragraph(vec![Node::Strong {
                    children: vec![Node::text("[[Roadmap]]")],
                }])],
            }],
        }]);

        expand_wikilinks(&mut tree);

        let strong = &tree.children().unwrap()[0].children().unwrap()[0].children().unwrap()[0]
            .children()
            .unwrap()[0];
        assert!(matches!(
            &strong.children().unwrap()[0],
            Node::Link { url, .. } if url == "/roadmap"
        ));
    }

    #[test]
    fn callout_becomes_aside() {
        let mut tree = root(vec![Node::blockquote(vec![Node::paragraph(vec![Node::text(
            "[!warning] Careful\nbody text",
        )])])]);

        convert_callouts(&mut tree);

        assert_eq!(
            tree.children().unwrap(),
            &[Node::Aside {
                kind: AsideKind::Caution,
                title: Some("Careful".to_string()),
                children: vec![Node::paragraph(vec![Node::text("body text")])],
            }]
        );
    }

    #[test]
    fn unknown_callout_type_defaults_to_note() {
        let mut tree = root(vec![Node::blockquote(vec![Node::paragraph(vec![Node::text(
            "[!bogus] X",
        )])])]);

        convert_callouts(&mut tree);

        assert_eq!(
            tree.children().unwrap(),
            &[Node::Aside {
                kind: AsideKind::Note,
                title: Some("X".to_string()),
                children: vec![],
            }]
        );
    }

    #[test]
    fn callout_body_keeps_blocks_in_order() {
        let list = Node::List {
            ordered: true,
            children: vec![Node::ListItem {
                children: vec![Node::paragraph(vec![Node::text("step")])],
            }],
        };
        let code = Node::Code {
            lang: Some("sh".to_string()),
            value: "make".to_string(),
        };
        let mut tree = root(vec![Node::blockquote(vec![
            Node::paragraph(vec![
                Node::text("[!tip]-\nUse "),
                Node::Emphasis {
                    children: vec![Node::text("this")],
                },
            ]),
            Node::paragraph(vec![Node::text("Second paragraph")]),
            list.clone(),
            code.clone(),
        ])]);

        convert_callouts(&mut tree);

        assert_eq!(
            tree.children().unwrap(),
            &[Node::Aside {
                kind: AsideKind::Tip,
                title: None,
                children: vec![
                    Node::paragraph(vec![
                        Node::text("Use "),
                        Node::Emphasis {
                            children: vec![Node::text("this")],
                        },
                    ]),
                    Node::paragraph(vec![Node::text("Second paragraph")]),
                    list,
                    code,
                ],
            }]
        );
    }

    #[test]
    fn plain_blockquotes_are_left_alone() {
        let quote = Node::blockquote(vec![Node::paragraph(vec![Node::text(
            "Someone said this\n[!note] later line",
        )])]);
        let mut tree = root(vec![quote.clone()]);

        convert_callouts(&mut tree);

        assert_eq!(tree, root(vec![quote]));
    }

    #[test]
    fn nested_callouts_are_converted() {
        let mut tree = root(vec![Node::blockquote(vec![
            Node::paragraph(vec![Node::text("[!note] Outer")]),
            Node::blockquote(vec![Node::paragraph(vec![Node::text("[!danger]\nInner")])]),
        ])]);

        convert_callouts(&mut tree);

        let Node::Aside { children, .. } = &tree.children().unwrap()[0] else {
            panic!("expected aside");
        };
        assert!(matches!(
            &children[0],
            Node::Aside {
                kind: AsideKind::Danger,
                ..
            }
        ));
    }

    #[test]
    fn pipeline_runs_all_stages() {
        let mut tree = root(vec![Node::blockquote(vec![Node::paragraph(vec![
            Node::text("[!info] See also\nCheck [[Team/Members]] or "),
            Node::link("wiki/Faq.md", vec![Node::text("the FAQ")]),
        ])])]);

        LinkRewritePipeline::new().run(&mut tree);

        assert_eq!(
            tree.children().unwrap(),
            &[Node::Aside {
                kind: AsideKind::Note,
                title: Some("See also".to_string()),
                children: vec![Node::paragraph(vec![
                    Node::text("Check "),
                    Node::Link {
                        url: "/team/members".to_string(),
                        title: None,
                        class_name: Some("internal-link".to_string()),
                        children: vec![Node::text("Members")],
                    },
                    Node::text(" or "),
                    Node::link("/faq", vec![Node::text("the FAQ")]),
                ])],
            }]
        );
    }
}

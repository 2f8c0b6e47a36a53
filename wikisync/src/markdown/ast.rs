use serde::{Deserialize, Serialize};

/// Markdown document tree as handed over by the site renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Node {
    Root {
        children: Vec<Node>,
    },
    Text {
        value: String,
    },
    Paragraph {
        children: Vec<Node>,
    },
    Heading {
        depth: u8,
        children: Vec<Node>,
    },
    Emphasis {
        children: Vec<Node>,
    },
    Strong {
        children: Vec<Node>,
    },
    Link {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        class_name: Option<String>,
        children: Vec<Node>,
    },
    Image {
        url: String,
        alt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Blockquote {
        children: Vec<Node>,
    },
    List {
        ordered: bool,
        children: Vec<Node>,
    },
    ListItem {
        children: Vec<Node>,
    },
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
        value: String,
    },
    InlineCode {
        value: String,
    },
    /// Any other block the renderer understands but this crate does not inspect.
    Container {
        name: String,
        children: Vec<Node>,
    },
    Aside {
        kind: AsideKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        children: Vec<Node>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsideKind {
    Note,
    Tip,
    Caution,
    Danger,
}

impl AsideKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsideKind::Note => "note",
            AsideKind::Tip => "tip",
            AsideKind::Caution => "caution",
            AsideKind::Danger => "danger",
        }
    }
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text {
            value: value.into(),
        }
    }

    pub fn paragraph(children: Vec<Node>) -> Self {
        Node::Paragraph { children }
    }

    pub fn link(url: impl Into<String>, children: Vec<Node>) -> Self {
        Node::Link {
            url: url.into(),
            title: None,
            class_name: None,
            children,
        }
    }

    pub fn image(url: impl Into<String>, alt: impl Into<String>) -> Self {
        Node::Image {
            url: url.into(),
            alt: alt.into(),
            title: None,
        }
    }

    pub fn blockquote(children: Vec<Node>) -> Self {
        Node::Blockquote { children }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::Root { children }
            | Node::Paragraph { children }
            | Node::Heading { children, .. }
            | Node::Emphasis { children }
            | Node::Strong { children }
            | Node::Link { children, .. }
            | Node::Blockquote { children }
            | Node::List { children, .. }
            | Node::ListItem { children }
            | Node::Container { children, .. }
            | Node::Aside { children, .. } => Some(children),
            Node::Text { .. } | Node::Image { .. } | Node::Code { .. } | Node::InlineCode { .. } => {
                None
            }
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Root { children }
            | Node::Paragraph { children }
            | Node::Heading { children, .. }
            | Node::Emphasis { children }
            | Node::Strong { children }
            | Node::Link { children, .. }
            | Node::Blockquote { children }
            | Node::List { children, .. }
            | Node::ListItem { children }
            | Node::Container { children, .. }
            | Node::Aside { children, .. } => Some(children),
            Node::Text { .. } | Node::Image { .. } | Node::Code { .. } | Node::InlineCode { .. } => {
                None
            }
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn plain_text(&self) -> String {
        match self {
            Node::Text { value } | Node::InlineCode { value } => value.clone(),
            Node::Image { alt, .. } => alt.clone(),
            other => other
                .children()
                .map(|children| children.iter().map(Node::plain_text).collect())
                .unwrap_or_default(),
        }
    }
}

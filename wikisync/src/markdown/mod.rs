pub mod ast;
pub mod callout;
pub mod pipeline;
pub mod wikilink;

pub use ast::{AsideKind, Node};
pub use pipeline::{LinkRewritePipeline, Stage};
pub use wikilink::{WikilinkMatch, WikilinkReference};

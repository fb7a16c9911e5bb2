//! Source model.
//!
//! | Module    | Purpose                                             |
//! |-----------|-----------------------------------------------------|
//! | `tree`    | Owned markup tree (elements, attributes, literals)  |
//! | `lower`   | oxc AST → markup tree                               |
//! | `edit`    | Span-based text edits                               |
//! | `literal` | JSON values rendered as JavaScript                  |
//!
//! Parsing is done with oxc; a module is re-parsed whenever its text changes
//! and the arena is dropped as soon as the tree has been lowered.

mod edit;
pub mod literal;
mod lower;
mod tree;

pub use edit::TextEdits;
pub use tree::{
    AttributeSlot, AttributeValue, InvalidNodeId, MarkupElement, MarkupTree, NamedAttribute,
    NodeId, ObjectMember, Prelude, ValueNode, span_text,
};

use oxc::allocator::Allocator;
use oxc::parser::Parser;
use oxc::span::SourceType;
use std::path::Path;
use thiserror::Error;

/// Malformed source. Fatal for that module's transform.
#[derive(Debug, Clone, Error)]
#[error("failed to parse `{path}`: {}", .messages.join("; "))]
pub struct ParseError {
    pub path: String,
    pub messages: Vec<String>,
}

/// Source type from the file extension. JavaScript files may contain JSX.
pub fn source_type(path: &Path) -> SourceType {
    match SourceType::from_path(path) {
        Ok(ty) if ty.is_javascript() => ty.with_jsx(true),
        Ok(ty) => ty,
        Err(_) => SourceType::tsx(),
    }
}

/// Parse `source` and lower it to a [`MarkupTree`].
pub fn parse_module(path: &Path, source: &str) -> Result<MarkupTree, ParseError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type(path)).parse();

    if ret.panicked || !ret.errors.is_empty() {
        let mut messages: Vec<String> = ret.errors.iter().map(ToString::to_string).collect();
        if messages.is_empty() {
            messages.push("parser gave up".to_string());
        }
        return Err(ParseError {
            path: path.display().to_string(),
            messages,
        });
    }

    Ok(lower::lower_program(source, &ret.program))
}

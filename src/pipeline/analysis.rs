//! Analysis pass: per-element metadata.

use crate::freshness::ContentHash;
use crate::syntax::{self, AttributeSlot, MarkupElement, MarkupTree, NodeId, ParseError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One attribute of a markup element, as far as patching is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AttributeDescriptor {
    /// Literal or literal composite; patchable.
    Static {
        name: String,
        value: serde_json::Value,
    },
    /// Readable at runtime, not patchable.
    Dynamic { name: String },
    /// `{...props}`; keys unknown statically.
    Spread,
}

impl AttributeDescriptor {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Static { name, .. } | Self::Dynamic { name } => Some(name),
            Self::Spread => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(rename = "jsxTagName")]
    pub tag_name: String,
    pub attributes: Vec<AttributeDescriptor>,
}

impl NodeMetadata {
    /// Describe `element`, skipping the identification attribute.
    pub fn describe(element: &MarkupElement, ident_attribute: &str) -> Self {
        let attributes = element
            .attributes
            .iter()
            .filter_map(|slot| match slot {
                AttributeSlot::Spread { .. } => Some(AttributeDescriptor::Spread),
                AttributeSlot::Named(attr) if attr.name == ident_attribute => None,
                AttributeSlot::Named(attr) => Some(match attr.value.literal() {
                    Some(value) => AttributeDescriptor::Static {
                        name: attr.name.clone(),
                        value,
                    },
                    None => AttributeDescriptor::Dynamic {
                        name: attr.name.clone(),
                    },
                }),
            })
            .collect();

        Self {
            tag_name: element.tag_name.clone(),
            attributes,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().rev().find(|d| d.name() == Some(name))
    }
}

/// A parsed module with its metadata, ready for the registry.
#[derive(Debug, Clone)]
pub struct ModuleAnalysis {
    pub fingerprint: ContentHash,
    pub tree: Arc<MarkupTree>,
    pub nodes: BTreeMap<NodeId, NodeMetadata>,
}

/// Parse `text` and describe every element in document order.
pub fn analyze(path: &Path, text: &str, ident_attribute: &str) -> Result<ModuleAnalysis, ParseError> {
    let tree = syntax::parse_module(path, text)?;
    let nodes = tree
        .elements
        .iter()
        .map(|el| (el.node_id, NodeMetadata::describe(el, ident_attribute)))
        .collect();

    Ok(ModuleAnalysis {
        fingerprint: ContentHash::of(text),
        tree: Arc::new(tree),
        nodes,
    })
}

//! Owned markup tree.
//!
//! The oxc AST borrows from its arena, so a parse is lowered into these
//! lifetime-free types that the registry can keep. Only what the pipeline
//! and the patch engine need survives: elements in document order, their
//! attribute slots, and literal value trees with byte spans into the text.

use oxc::span::Span;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// NodeId
// ============================================================================

/// Per-module element identifier, `node-1`, `node-2`, … in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid node id `{0}`, expected `node-<n>`")]
pub struct InvalidNodeId(pub String);

impl FromStr for NodeId {
    type Err = InvalidNodeId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("node-")
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .map(Self)
            .ok_or_else(|| InvalidNodeId(s.to_string()))
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tree
// ============================================================================

/// Where the runtime import goes: after the last import, else after the
/// directive prologue or hashbang, else at the very start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prelude {
    pub offset: u32,
    /// The anchor ends a line comment (hashbang) with no newline after it.
    pub needs_newline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MarkupTree {
    /// Elements in document pre-order; `elements[i].node_id == node-(i+1)`.
    pub elements: Vec<MarkupElement>,
    pub prelude: Prelude,
}

impl MarkupTree {
    pub fn element(&self, id: NodeId) -> Option<&MarkupElement> {
        let index = usize::try_from(id.index()).ok()?.checked_sub(1)?;
        self.elements.get(index).filter(|e| e.node_id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }
}

#[derive(Debug, Clone)]
pub struct MarkupElement {
    pub node_id: NodeId,
    /// Tag name as written, e.g. `div`, `Grid`, `Foo.Bar`, `svg:path`.
    pub tag_name: String,
    /// The whole element, children and closing tag included.
    pub span: Span,
    /// The opening tag, `<` through `>`.
    pub opening: Span,
    /// Offset just after the last attribute (or the tag name).
    pub attr_insert: u32,
    pub attributes: Vec<AttributeSlot>,
}

impl MarkupElement {
    /// The effective attribute named `name`; a later duplicate wins.
    pub fn attribute(&self, name: &str) -> Option<&NamedAttribute> {
        self.attributes.iter().rev().find_map(|slot| match slot {
            AttributeSlot::Named(attr) if attr.name == name => Some(attr),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum AttributeSlot {
    Named(NamedAttribute),
    Spread { span: Span },
}

impl AttributeSlot {
    pub fn span(&self) -> Span {
        match self {
            Self::Named(attr) => attr.span,
            Self::Spread { span } => *span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NamedAttribute {
    pub name: String,
    /// `name` or `name=value`.
    pub span: Span,
    pub name_span: Span,
    pub value: AttributeValue,
}

#[derive(Debug, Clone)]
pub enum AttributeValue {
    /// `<input disabled />`
    Absent,
    /// `title="x"`; span includes the quotes.
    Text { span: Span, value: String },
    /// `columns={...}`; span includes the braces.
    Expression { span: Span, value: ValueNode },
    /// `icon=<Icon />`
    Markup { span: Span },
}

impl AttributeValue {
    /// The value as JSON if it is literal: a bare attribute is `true`, a
    /// string attribute its text, an expression its literal composite.
    pub fn literal(&self) -> Option<serde_json::Value> {
        match self {
            Self::Absent => Some(serde_json::Value::Bool(true)),
            Self::Text { value, .. } => Some(serde_json::Value::String(value.clone())),
            Self::Expression { value, .. } => value.to_json(),
            Self::Markup { .. } => None,
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// Literal view of an expression. Anything that is not a literal composite
/// is `Opaque`.
#[derive(Debug, Clone)]
pub enum ValueNode {
    Scalar {
        span: Span,
        value: serde_json::Value,
    },
    Array {
        span: Span,
        items: Vec<ValueNode>,
    },
    Object {
        span: Span,
        members: Vec<ObjectMember>,
    },
    Opaque {
        span: Span,
    },
}

#[derive(Debug, Clone)]
pub struct ObjectMember {
    pub key: String,
    pub key_span: Span,
    /// `key: value`
    pub span: Span,
    pub value: ValueNode,
}

impl ValueNode {
    pub fn span(&self) -> Span {
        match self {
            Self::Scalar { span, .. }
            | Self::Array { span, .. }
            | Self::Object { span, .. }
            | Self::Opaque { span } => *span,
        }
    }

    /// The JSON value, or `None` if any part is opaque.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Scalar { value, .. } => Some(value.clone()),
            Self::Array { items, .. } => items
                .iter()
                .map(Self::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Self::Object { members, .. } => {
                let mut map = serde_json::Map::with_capacity(members.len());
                for member in members {
                    map.insert(member.key.clone(), member.value.to_json()?);
                }
                Some(serde_json::Value::Object(map))
            }
            Self::Opaque { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar { .. } => "scalar",
            Self::Array { .. } => "array",
            Self::Object { .. } => "object",
            Self::Opaque { .. } => "expression",
        }
    }
}

/// Slice `text` by `span`. Out-of-range spans yield "".
pub fn span_text(text: &str, span: Span) -> &str {
    text.get(span.start as usize..span.end as usize).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_id_display_and_parse() {
        let id = NodeId::new(3);
        assert_eq!(id.to_string(), "node-3");
        assert_eq!("node-3".parse::<NodeId>().unwrap(), id);
        assert!("node-0".parse::<NodeId>().is_err());
        assert!("3".parse::<NodeId>().is_err());
        assert!("node-x".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_serde() {
        let id: NodeId = serde_json::from_str("\"node-12\"").unwrap();
        assert_eq!(id.index(), 12);
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"node-12\"");
    }

    #[test]
    fn test_value_to_json() {
        let span = Span::new(0, 0);
        let node = ValueNode::Array {
            span,
            items: vec![
                ValueNode::Scalar {
                    span,
                    value: json!(1),
                },
                ValueNode::Object {
                    span,
                    members: vec![ObjectMember {
                        key: "field".into(),
                        key_span: span,
                        span,
                        value: ValueNode::Scalar {
                            span,
                            value: json!("id"),
                        },
                    }],
                },
            ],
        };
        assert_eq!(node.to_json(), Some(json!([1, {"field": "id"}])));

        let opaque = ValueNode::Array {
            span,
            items: vec![ValueNode::Opaque { span }],
        };
        assert_eq!(opaque.to_json(), None);
    }

    #[test]
    fn test_span_text() {
        assert_eq!(span_text("<Grid />", Span::new(1, 5)), "Grid");
        assert_eq!(span_text("abc", Span::new(2, 10)), "");
    }
}

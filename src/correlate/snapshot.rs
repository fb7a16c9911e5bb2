//! Rendered tree snapshots posted by the browser runtime.
//!
//! Two wire shapes are accepted. The flat one lists nodes in pre-order with
//! the index of their parent, so depth is unbounded:
//!
//! ```json
//! { "nodes": [
//!     { "type": "App" },
//!     { "type": "div", "props": { ... }, "boundary": 12, "parent": 0 }
//! ] }
//! ```
//!
//! The nested one is convenient for small trees but limited by the JSON
//! parser's recursion depth:
//!
//! ```json
//! { "type": "div", "props": { ... }, "boundary": 12, "children": [ ... ] }
//! ```
//!
//! Either way the tree is stored as an arena with first-child and
//! next-sibling links, which is the shape [`RenderedTree`] walks.

use super::{Boundary, RenderedTree};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::{Map, Value};

/// One node of the nested shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    /// Host tag or component display name.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<Boundary>,
    #[serde(default)]
    pub children: Vec<SnapshotNode>,
}

/// One node of the flat shape. Only the first node has no parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<Boundary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotWire {
    Flat { nodes: Vec<SnapshotEntry> },
    Nested(SnapshotNode),
}

#[derive(Debug, Clone, Default)]
struct FlatNode {
    component: Option<String>,
    props: Map<String, Value>,
    boundary: Option<Boundary>,
    first_child: Option<usize>,
    next_sibling: Option<usize>,
}

/// A snapshot flattened for walking. Index 0 is the root.
#[derive(Debug, Clone)]
pub struct SnapshotTree {
    nodes: Vec<FlatNode>,
}

impl SnapshotTree {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'de> Deserialize<'de> for SnapshotTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match SnapshotWire::deserialize(deserializer)? {
            SnapshotWire::Flat { nodes } => Self::from_entries(nodes).map_err(de::Error::custom),
            SnapshotWire::Nested(root) => Ok(root.into()),
        }
    }
}

impl SnapshotTree {
    /// Link flat entries. Parents must come before their children.
    pub fn from_entries(entries: Vec<SnapshotEntry>) -> Result<Self, String> {
        let mut nodes: Vec<FlatNode> = Vec::with_capacity(entries.len());
        let mut last_child: Vec<Option<usize>> = Vec::with_capacity(entries.len());

        for (index, entry) in entries.into_iter().enumerate() {
            match (index, entry.parent) {
                (0, None) => {}
                (0, Some(_)) => return Err("the first snapshot node cannot have a parent".into()),
                (_, None) => return Err(format!("snapshot node {index} has no parent")),
                (_, Some(parent)) if parent >= index => {
                    return Err(format!(
                        "snapshot node {index} names parent {parent}, which does not precede it"
                    ));
                }
                (_, Some(parent)) => {
                    match last_child[parent] {
                        Some(prev) => nodes[prev].next_sibling = Some(index),
                        None => nodes[parent].first_child = Some(index),
                    }
                    last_child[parent] = Some(index);
                }
            }
            nodes.push(FlatNode {
                component: entry.component,
                props: entry.props,
                boundary: entry.boundary,
                first_child: None,
                next_sibling: None,
            });
            last_child.push(None);
        }

        Ok(Self { nodes })
    }
}

impl From<SnapshotNode> for SnapshotTree {
    fn from(root: SnapshotNode) -> Self {
        let mut nodes = vec![FlatNode::default()];
        let mut work = vec![(root, 0usize)];

        // Siblings get contiguous slots when their parent is expanded.
        while let Some((node, index)) = work.pop() {
            let SnapshotNode {
                component,
                props,
                boundary,
                children,
            } = node;

            let first = nodes.len();
            let count = children.len();
            for i in 0..count {
                nodes.push(FlatNode {
                    next_sibling: (i + 1 < count).then_some(first + i + 1),
                    ..FlatNode::default()
                });
            }

            let slot = &mut nodes[index];
            slot.component = component;
            slot.props = props;
            slot.boundary = boundary;
            slot.first_child = (count > 0).then_some(first);

            work.extend(children.into_iter().enumerate().map(|(i, c)| (c, first + i)));
        }

        Self { nodes }
    }
}

impl RenderedTree for SnapshotTree {
    type Node = usize;

    fn root(&self) -> Option<usize> {
        (!self.nodes.is_empty()).then_some(0)
    }

    fn first_child(&self, node: usize) -> Option<usize> {
        self.nodes.get(node)?.first_child
    }

    fn next_sibling(&self, node: usize) -> Option<usize> {
        self.nodes.get(node)?.next_sibling
    }

    fn props(&self, node: usize) -> Option<&Map<String, Value>> {
        self.nodes.get(node).map(|n| &n.props)
    }

    fn boundary(&self, node: usize) -> Option<Boundary> {
        self.nodes.get(node)?.boundary
    }

    fn component(&self, node: usize) -> Option<&str> {
        self.nodes.get(node)?.component.as_deref()
    }
}

//! Live tree correlator.
//!
//! Walks a rendered tree (through [`RenderedTree`]) and rebuilds the
//! hierarchy of instrumented elements. Intermediate framework nodes that
//! carry no identification attribute are transparent: an element's parent
//! is the nearest instrumented ancestor.
//!
//! The forest is rebuilt from scratch on every call.

mod snapshot;

pub use snapshot::{SnapshotEntry, SnapshotTree};

use crate::pipeline::{AttributeDescriptor, NodeMetadata};
use crate::registry::{ElementKey, ModuleRegistry};
use crate::syntax::NodeId;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Handle of a rendered host element (a DOM node id assigned by the runtime).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Boundary(pub u64);

/// Read access to a framework's internal tree.
pub trait RenderedTree {
    type Node: Copy + PartialEq;

    fn root(&self) -> Option<Self::Node>;
    fn first_child(&self, node: Self::Node) -> Option<Self::Node>;
    fn next_sibling(&self, node: Self::Node) -> Option<Self::Node>;
    fn props(&self, node: Self::Node) -> Option<&Map<String, Value>>;
    /// The host element this node renders to directly, if any.
    fn boundary(&self, node: Self::Node) -> Option<Boundary>;
    fn component(&self, node: Self::Node) -> Option<&str>;

    /// Depth-first search for the node bound to `boundary`.
    fn find_by_boundary(&self, boundary: Boundary) -> Option<Self::Node> {
        let mut stack: Vec<Self::Node> = self.root().into_iter().collect();
        while let Some(node) = stack.pop() {
            if self.boundary(node) == Some(boundary) {
                return Some(node);
            }
            if let Some(next) = self.next_sibling(node) {
                stack.push(next);
            }
            if let Some(child) = self.first_child(node) {
                stack.push(child);
            }
        }
        None
    }
}

#[derive(Debug, Error)]
pub enum CorrelateError {
    #[error("the page exposes no rendered tree to inspect")]
    IntrospectionUnavailable,

    #[error("no rendered node for the requested root")]
    RootNotFound,

    #[error("`{module_id}` {node_id} is rendered but has no metadata")]
    RegistryInconsistency { module_id: String, node_id: String },
}

impl CorrelateError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IntrospectionUnavailable => "introspection_unavailable",
            Self::RootNotFound => "root_not_found",
            Self::RegistryInconsistency { .. } => "registry_inconsistency",
        }
    }
}

// ============================================================================
// Forest
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveNode {
    pub id: ElementKey,
    /// Index of the parent in [`LiveForest::nodes`].
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub module_id: String,
    pub node_id: NodeId,
    #[serde(rename = "jsxTagName")]
    pub tag_name: String,
    pub attributes: Vec<AttributeDescriptor>,
    /// Props as rendered, without the identification attribute.
    pub props: Map<String, Value>,
    pub boundary: Option<Boundary>,
    pub component: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveForest {
    pub nodes: Vec<LiveNode>,
    pub roots: Vec<usize>,
}

impl LiveForest {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, key: ElementKey) -> Option<&LiveNode> {
        self.nodes.iter().find(|n| n.id == key)
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = &LiveNode> {
        self.nodes
            .get(index)
            .into_iter()
            .flat_map(|n| n.children.iter())
            .filter_map(|&i| self.nodes.get(i))
    }
}

// ============================================================================
// Walk
// ============================================================================

/// The identification attribute's payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ident {
    module_id: String,
    node_id: NodeId,
    #[serde(flatten)]
    inline: Option<NodeMetadata>,
}

enum Frame<N> {
    Enter(N),
    Exit { opened: bool },
}

pub struct Correlator<'a> {
    registry: &'a ModuleRegistry,
    attribute: &'a str,
}

impl<'a> Correlator<'a> {
    pub fn new(registry: &'a ModuleRegistry, attribute: &'a str) -> Self {
        Self {
            registry,
            attribute,
        }
    }

    /// `correlate(rootElement)`. Starts at the node bound to `anchor`, or the
    /// tree root without one.
    pub fn correlate<T: RenderedTree>(
        &self,
        tree: Option<&T>,
        anchor: Option<Boundary>,
    ) -> Result<LiveForest, CorrelateError> {
        let tree = tree.ok_or(CorrelateError::IntrospectionUnavailable)?;
        let start = match anchor {
            Some(boundary) => tree.find_by_boundary(boundary),
            None => tree.root(),
        }
        .ok_or(CorrelateError::RootNotFound)?;

        let mut forest = LiveForest::default();
        let mut open: Vec<usize> = Vec::new();
        let mut seen: FxHashSet<(String, NodeId)> = FxHashSet::default();
        let mut frames = vec![Frame::Enter(start)];

        while let Some(frame) = frames.pop() {
            let node = match frame {
                Frame::Exit { opened } => {
                    if opened {
                        open.pop();
                    }
                    continue;
                }
                Frame::Enter(node) => node,
            };

            let mut opened = false;
            if let Some(ident) = self.ident(tree, node)
                && seen.insert((ident.module_id.clone(), ident.node_id))
            {
                let index = self.push_node(&mut forest, open.last().copied(), tree, node, ident)?;
                open.push(index);
                opened = true;
            }

            if let Some(&current) = open.last()
                && forest.nodes[current].boundary.is_none()
            {
                forest.nodes[current].boundary = tree.boundary(node);
            }

            frames.push(Frame::Exit { opened });
            let mut children = Vec::new();
            let mut next = tree.first_child(node);
            while let Some(child) = next {
                children.push(child);
                next = tree.next_sibling(child);
            }
            frames.extend(children.into_iter().rev().map(Frame::Enter));
        }

        Ok(forest)
    }

    fn ident<T: RenderedTree>(&self, tree: &T, node: T::Node) -> Option<Ident> {
        let value = tree.props(node)?.get(self.attribute)?;
        serde_json::from_value(value.clone()).ok()
    }

    fn push_node<T: RenderedTree>(
        &self,
        forest: &mut LiveForest,
        parent: Option<usize>,
        tree: &T,
        node: T::Node,
        ident: Ident,
    ) -> Result<usize, CorrelateError> {
        let metadata = self
            .registry
            .node(&ident.module_id, ident.node_id)
            .map(|(_, metadata)| metadata)
            .or(ident.inline)
            .ok_or_else(|| CorrelateError::RegistryInconsistency {
                module_id: ident.module_id.clone(),
                node_id: ident.node_id.to_string(),
            })?;

        let mut props = tree.props(node).cloned().unwrap_or_default();
        props.remove(self.attribute);

        let index = forest.nodes.len();
        forest.nodes.push(LiveNode {
            id: ElementKey::new(&ident.module_id, ident.node_id),
            parent,
            children: Vec::new(),
            module_id: ident.module_id,
            node_id: ident.node_id,
            tag_name: metadata.tag_name,
            attributes: metadata.attributes,
            props,
            boundary: None,
            component: tree.component(node).map(str::to_string),
        });
        match parent {
            Some(p) => forest.nodes[p].children.push(index),
            None => forest.roots.push(index),
        }
        Ok(index)
    }
}

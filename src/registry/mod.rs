//! Module registry.
//!
//! Maps module id (absolute path) to the module's current generation: raw
//! text, fingerprint, markup tree and node metadata. Entries are immutable
//! and replaced wholesale, so readers never see text from one generation
//! paired with a tree from another.
//!
//! The registry is an explicit object shared by `Arc` between the transform
//! pipeline, the patch engine and the correlator. It is bounded: storing a
//! module beyond `capacity` evicts the least recently stored one.
//!
//! A reverse index maps [`ElementKey`] (hash of module id + node id) to its
//! (module, node) pair in O(1).

use crate::freshness::ContentHash;
use crate::pipeline::{ModuleAnalysis, NodeMetadata};
use crate::syntax::{MarkupTree, NodeId};
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// ElementKey
// ============================================================================

/// Identity of one element across the whole project: 64 bits of
/// blake3(module id, node id). Stable as long as the node id is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(u64);

impl ElementKey {
    pub fn new(module_id: &str, node_id: NodeId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(module_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(node_id.to_string().as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        Self(u64::from_be_bytes(bytes))
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 16 {
            return None;
        }
        u64::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for ElementKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ElementKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid element key `{s}`")))
    }
}

// ============================================================================
// ModuleEntry
// ============================================================================

/// One generation of a module.
#[derive(Debug)]
pub struct ModuleEntry {
    pub id: String,
    pub path: PathBuf,
    pub fingerprint: ContentHash,
    pub text: String,
    pub tree: Arc<MarkupTree>,
    pub nodes: BTreeMap<NodeId, NodeMetadata>,
}

impl ModuleEntry {
    pub fn new(path: &Path, text: String, analysis: ModuleAnalysis) -> Self {
        Self {
            id: module_id(path),
            path: path.to_path_buf(),
            fingerprint: analysis.fingerprint,
            text,
            tree: analysis.tree,
            nodes: analysis.nodes,
        }
    }

    pub fn node(&self, node_id: NodeId) -> Option<&NodeMetadata> {
        self.nodes.get(&node_id)
    }

    fn keys(&self) -> impl Iterator<Item = (ElementKey, NodeId)> + '_ {
        self.nodes
            .keys()
            .map(|node_id| (ElementKey::new(&self.id, *node_id), *node_id))
    }
}

/// Module id for a path: the path as a string.
pub fn module_id(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ============================================================================
// ModuleRegistry
// ============================================================================

struct Slot {
    entry: Arc<ModuleEntry>,
    stamp: u64,
}

pub struct ModuleRegistry {
    modules: DashMap<String, Slot>,
    elements: DashMap<ElementKey, (Arc<str>, NodeId)>,
    capacity: Option<usize>,
    clock: AtomicU64,
    /// Serializes writers so the reverse index follows the module map.
    write: Mutex<()>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.modules.len())
            .field("elements", &self.elements.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModuleRegistry {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            modules: DashMap::new(),
            elements: DashMap::new(),
            capacity: capacity.filter(|c| *c > 0),
            clock: AtomicU64::new(0),
            write: Mutex::new(()),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ModuleEntry>> {
        self.modules.get(id).map(|slot| Arc::clone(&slot.entry))
    }

    /// Metadata for one element, with the entry it belongs to.
    pub fn node(&self, module_id: &str, node_id: NodeId) -> Option<(Arc<ModuleEntry>, NodeMetadata)> {
        let entry = self.get(module_id)?;
        let metadata = entry.node(node_id)?.clone();
        Some((entry, metadata))
    }

    /// Reverse lookup of an element key.
    pub fn resolve(&self, key: ElementKey) -> Option<(String, NodeId)> {
        self.elements
            .get(&key)
            .map(|r| (r.0.to_string(), r.1))
    }

    /// Store a new generation, replacing the old one. Returns the stored entry.
    pub fn insert(&self, entry: ModuleEntry) -> Arc<ModuleEntry> {
        let _guard = self.write.lock();
        let entry = Arc::new(entry);
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed);

        let previous = self.modules.insert(
            entry.id.clone(),
            Slot {
                entry: Arc::clone(&entry),
                stamp,
            },
        );
        if let Some(previous) = previous {
            self.unindex(&previous.entry);
        }
        let id: Arc<str> = Arc::from(entry.id.as_str());
        for (key, node_id) in entry.keys() {
            self.elements.insert(key, (Arc::clone(&id), node_id));
        }

        self.evict_over_capacity(&entry.id);
        entry
    }

    pub fn remove(&self, id: &str) -> Option<Arc<ModuleEntry>> {
        let _guard = self.write.lock();
        self.remove_locked(id)
    }

    /// Keep only modules for which `keep` returns true. Returns how many were dropped.
    pub fn retain(&self, mut keep: impl FnMut(&ModuleEntry) -> bool) -> usize {
        let _guard = self.write.lock();
        let doomed: Vec<String> = self
            .modules
            .iter()
            .filter(|slot| !keep(&slot.entry))
            .map(|slot| slot.key().clone())
            .collect();
        for id in &doomed {
            self.remove_locked(id);
        }
        doomed.len()
    }

    /// Drop modules that are no longer part of the build graph.
    pub fn evict_unreachable(&self, reachable: &FxHashSet<String>) -> usize {
        self.retain(|entry| reachable.contains(&entry.id))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.modules.iter().map(|slot| slot.key().clone()).collect()
    }

    fn remove_locked(&self, id: &str) -> Option<Arc<ModuleEntry>> {
        let (_, slot) = self.modules.remove(id)?;
        self.unindex(&slot.entry);
        Some(slot.entry)
    }

    fn unindex(&self, entry: &ModuleEntry) {
        for (key, _) in entry.keys() {
            self.elements
                .remove_if(&key, |_, (module, _)| module.as_ref() == entry.id);
        }
    }

    fn evict_over_capacity(&self, keep: &str) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.modules.len() > capacity {
            let oldest = self
                .modules
                .iter()
                .filter(|slot| slot.key() != keep)
                .min_by_key(|slot| slot.stamp)
                .map(|slot| slot.key().clone());
            match oldest {
                Some(id) => {
                    crate::debug!("registry"; "evicting {}", id);
                    self.remove_locked(&id);
                }
                None => break,
            }
        }
    }
}

//! Insertion-ordered child mapping.

use rustc_hash::FxHashMap;

use super::NodeId;

/// Name → child mapping that remembers insertion order.
#[derive(Debug, Default, Clone)]
pub(crate) struct Children {
    order: Vec<NodeId>,
    index: FxHashMap<String, NodeId>,
}

impl Children {
    pub(crate) fn get(&self, name: &str) -> Option<NodeId> {
        self.index.get(name).copied()
    }

    pub(crate) fn ids(&self) -> &[NodeId] {
        &self.order
    }

    pub(crate) fn contains_id(&self, id: NodeId) -> bool {
        self.order.contains(&id)
    }

    /// Insert `id` under `name`. An existing entry of the same name keeps its
    /// position and is replaced; the replaced id is returned.
    pub(crate) fn insert(&mut self, name: &str, id: NodeId) -> Option<NodeId> {
        match self.index.insert(name.to_string(), id) {
            Some(old) => {
                if let Some(slot) = self.order.iter_mut().find(|slot| **slot == old) {
                    *slot = id;
                }
                Some(old)
            }
            None => {
                self.order.push(id);
                None
            }
        }
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<NodeId> {
        let id = self.index.remove(name)?;
        self.order.retain(|slot| *slot != id);
        Some(id)
    }

    /// Remove every entry, returning the ids in insertion order.
    pub(crate) fn take(&mut self) -> Vec<NodeId> {
        self.index.clear();
        std::mem::take(&mut self.order)
    }
}

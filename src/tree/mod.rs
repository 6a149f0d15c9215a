//! In-memory node tree.
//!
//! ```text
//! Tree
//! └── slots: Vec<Option<Slot>>   (indexed by NodeId, never reused)
//!     └── Slot
//!         ├── node: Node                 descriptor (name, kind, handler, policy)
//!         ├── parent: Option<NodeId>     non-owning back reference
//!         ├── children: Option<Children> directories only, cached results
//!         ├── adopted: Children          transient views of uncached results
//!         ├── detached: Vec<NodeId>      removed from children, freed on next refresh
//!         ├── cache_valid: bool
//!         └── dynamic_parameters         set only while a call runs
//! ```
//!
//! The tree owns every node; parents refer to children and children to
//! parents only through ids, so there is no ownership cycle. Removed subtrees
//! free their slots.

mod children;

use std::fmt;

use children::Children;

use crate::diagnostic::ProviderError;
use crate::handler::{Node, Parameters};

/// Identifier of a node inside a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot {
    node: Node,
    parent: Option<NodeId>,
    children: Option<Children>,
    adopted: Children,
    detached: Vec<NodeId>,
    cache_valid: bool,
    dynamic_parameters: Option<Parameters>,
}

/// The virtual namespace: a root directory and everything fetched below it.
pub struct Tree {
    slots: Vec<Option<Slot>>,
    root: NodeId,
}

impl Tree {
    /// Create a tree with `root` as its only node.
    ///
    /// The root must be a directory with a non-empty name.
    pub fn new(root: Node) -> Result<Self, ProviderError> {
        if root.name().is_empty() {
            return Err(ProviderError::EmptyName);
        }
        if !root.is_directory() {
            return Err(ProviderError::RootNotContainer {
                name: root.name().to_string(),
            });
        }
        let mut tree = Self {
            slots: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.alloc(root, None);
        Ok(tree)
    }

    /// The root directory.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// A tree always holds at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check if `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.slot(id).is_some()
    }

    /// The node descriptor, if `id` is live.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slot(id).map(|slot| &slot.node)
    }

    /// The node descriptor, or [`ProviderError::UnknownNode`].
    pub fn node(&self, id: NodeId) -> Result<&Node, ProviderError> {
        self.get(id).ok_or(ProviderError::UnknownNode(id))
    }

    /// The parent of `id`, `None` for the root.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).and_then(|slot| slot.parent)
    }

    /// Cached children of `id` in insertion order (empty for leaves).
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.slot(id)
            .and_then(|slot| slot.children.as_ref())
            .map(Children::ids)
            .unwrap_or(&[])
    }

    /// Cached child of `id` named `name`.
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.slot(id)?.children.as_ref()?.get(name)
    }

    /// Transient child of `id` named `name`, adopted from an uncached listing.
    pub fn adopted_child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.slot(id)?.adopted.get(name)
    }

    /// Whether the children of `id` come from a successful fetch that has not
    /// been invalidated since.
    pub fn is_cache_valid(&self, id: NodeId) -> bool {
        self.slot(id).is_some_and(|slot| slot.cache_valid)
    }

    /// Whether `id` is reachable from its parent's children (always true for
    /// the root).
    pub fn is_attached(&self, id: NodeId) -> bool {
        match self.parent(id) {
            None => id == self.root,
            Some(parent) => self
                .slot(parent)
                .and_then(|slot| slot.children.as_ref())
                .is_some_and(|children| children.contains_id(id)),
        }
    }

    /// Dynamic parameters bound to the call currently running on `id`.
    pub fn dynamic_parameters(&self, id: NodeId) -> Option<&Parameters> {
        self.slot(id)?.dynamic_parameters.as_ref()
    }

    /// Logical path of `id`: names below the root joined by `/`.
    pub fn path(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(cursor) = current {
            if cursor == self.root {
                break;
            }
            let Some(slot) = self.slot(cursor) else { break };
            names.push(slot.node.name());
            current = slot.parent;
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Drop the cached children of `id` and mark it not fetched.
    pub fn invalidate(&mut self, id: NodeId) {
        self.clear_children(id);
        if let Some(slot) = self.slot_mut(id) {
            slot.cache_valid = false;
        }
    }

    // =========================================================================
    // Engine-side mutation
    // =========================================================================

    pub(crate) fn mark_visited(&mut self, id: NodeId) {
        if let Some(slot) = self.slot_mut(id) {
            slot.cache_valid = true;
        }
    }

    pub(crate) fn set_dynamic_parameters(&mut self, id: NodeId, parameters: Option<Parameters>) {
        if let Some(slot) = self.slot_mut(id) {
            slot.dynamic_parameters = parameters;
        }
    }

    pub(crate) fn clear_dynamic_parameters(&mut self, id: NodeId) {
        self.set_dynamic_parameters(id, None);
    }

    /// Free every cached, adopted and detached child of `id`.
    pub(crate) fn clear_children(&mut self, id: NodeId) {
        let Some(slot) = self.slot_mut(id) else { return };
        let mut removed = std::mem::take(&mut slot.detached);
        removed.extend(slot.adopted.take());
        if let Some(children) = slot.children.as_mut() {
            removed.extend(children.take());
        }
        for child in removed {
            self.free_subtree(child);
        }
    }

    /// Remove `id` from its parent's children. The node keeps its parent link
    /// so its path stays printable, but no listing reaches it anymore. Its
    /// subtree stays live until the parent's children are next replaced or
    /// cleared.
    pub(crate) fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else { return };
        let Some(name) = self.get(id).map(|node| node.name().to_string()) else {
            return;
        };
        if let Some(slot) = self.slot_mut(parent)
            && let Some(children) = slot.children.as_mut()
            && children.get(&name) == Some(id)
        {
            children.remove(&name);
            slot.detached.push(id);
        }
    }

    /// Replace the children of `id` with `nodes`.
    ///
    /// A previous child with the same name and kind keeps its id and its own
    /// subtree, only its descriptor is updated. Children that do not reappear
    /// are freed, and so are children detached since the last refresh. Returns
    /// the resulting child ids in order.
    pub(crate) fn replace_children(&mut self, id: NodeId, nodes: Vec<Node>) -> Vec<NodeId> {
        let Some(slot) = self.slot_mut(id) else {
            return Vec::new();
        };
        let detached = std::mem::take(&mut slot.detached);
        let previous = match slot.children.as_mut() {
            Some(children) => std::mem::take(children),
            None => return Vec::new(),
        };
        for gone in detached {
            self.free_subtree(gone);
        }

        let mut next = Children::default();
        for node in nodes {
            let reused = next
                .get(node.name())
                .or_else(|| previous.get(node.name()))
                .filter(|old| self.get(*old).is_some_and(|n| n.kind() == node.kind()));
            let child = match reused {
                Some(old) => {
                    self.update(old, node.clone());
                    old
                }
                None => self.alloc(node.clone(), Some(id)),
            };
            if let Some(replaced) = next.insert(node.name(), child)
                && replaced != child
            {
                self.free_subtree(replaced);
            }
        }

        for old in previous.ids() {
            if next.get(self.name_of(*old)) != Some(*old) {
                self.free_subtree(*old);
            }
        }

        let ids = next.ids().to_vec();
        if let Some(slot) = self.slot_mut(id) {
            slot.children = Some(next);
        }
        ids
    }

    /// Give a transient node an id under `parent` without listing it among the
    /// parent's cached children. Adopting the same name again updates the
    /// existing adoption.
    pub fn adopt(&mut self, parent: NodeId, node: Node) -> Result<NodeId, ProviderError> {
        let parent_node = self.node(parent)?;
        if !parent_node.is_directory() {
            return Err(ProviderError::NotContainer {
                name: parent_node.name().to_string(),
            });
        }
        if node.name().is_empty() {
            return Err(ProviderError::EmptyName);
        }

        if let Some(existing) = self.adopted_child(parent, node.name())
            && self.get(existing).is_some_and(|n| n.kind() == node.kind())
        {
            self.update(existing, node);
            return Ok(existing);
        }

        let name = node.name().to_string();
        let child = self.alloc(node, Some(parent));
        let replaced = self
            .slot_mut(parent)
            .and_then(|slot| slot.adopted.insert(&name, child));
        if let Some(replaced) = replaced {
            self.free_subtree(replaced);
        }
        Ok(child)
    }

    // =========================================================================
    // Slot management
    // =========================================================================

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    fn name_of(&self, id: NodeId) -> &str {
        self.get(id).map(Node::name).unwrap_or_default()
    }

    fn alloc(&mut self, node: Node, parent: Option<NodeId>) -> NodeId {
        let children = node.is_directory().then(Children::default);
        let id = NodeId(self.slots.len());
        self.slots.push(Some(Slot {
            node,
            parent,
            children,
            adopted: Children::default(),
            detached: Vec::new(),
            cache_valid: false,
            dynamic_parameters: None,
        }));
        id
    }

    fn update(&mut self, id: NodeId, node: Node) {
        if let Some(slot) = self.slot_mut(id) {
            slot.node = node;
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some(mut slot) = self.slots.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            pending.append(&mut slot.detached);
            pending.extend(slot.adopted.take());
            if let Some(children) = slot.children.as_mut() {
                pending.extend(children.take());
            }
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("nodes", &self.len())
            .finish()
    }
}

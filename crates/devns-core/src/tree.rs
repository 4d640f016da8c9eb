// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory-node namespace tree
//!
//! Nodes live in an arena keyed by [`NodeId`]. A directory owns its children
//! top-down (by id, in insertion order) and every child points back at its
//! parent by id, so there are no ownership cycles.
//!
//! The tree has no internal locking. Mutation takes `&mut self`, which forces
//! callers to serialise structural changes, refcount changes and multi-call
//! enumeration behind whatever lock covers the tree.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::config::NamespaceConfig;
use crate::error::{NsError, NsResult};
use crate::fault::{FaultInjector, FaultOp};
use crate::name::NameStore;
use crate::types::{NodeId, NodeKind, NodeState};
use crate::vnode::{MemVnode, Vnode};

/// Slot of a child inside its parent's collection.
///
/// `seq` is handed out by the parent from a counter that never goes backwards;
/// directory cursors resume from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ChildEntry {
    pub(crate) seq: u64,
    pub(crate) id: NodeId,
}

/// A named entry in the namespace.
pub struct Node {
    name: NameStore,
    kind: NodeKind,
    refcount: u32,
    state: NodeState,
    parent: Option<NodeId>,
    children: Vec<ChildEntry>,
    next_seq: u64,
    target: Arc<dyn Vnode>,
}

impl Node {
    fn new(name: NameStore, target: Arc<dyn Vnode>, state: NodeState) -> Self {
        Self {
            name,
            kind: target.kind(),
            refcount: 1,
            state,
            parent: None,
            children: Vec::new(),
            next_seq: 1,
            target,
        }
    }

    pub fn name(&self) -> &[u8] {
        self.name.read()
    }

    pub fn name_store(&self) -> &NameStore {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn target(&self) -> &Arc<dyn Vnode> {
        &self.target
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("refcount", &self.refcount)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("children", &self.children.len())
            .finish()
    }
}

/// The namespace: an arena of nodes plus the distinguished root.
pub struct NamespaceTree {
    config: NamespaceConfig,
    faults: FaultInjector,
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
}

impl NamespaceTree {
    /// Create a tree whose root names `root_target`, which must be a directory.
    pub fn new(root_target: Arc<dyn Vnode>) -> NsResult<Self> {
        Self::with_config(root_target, NamespaceConfig::default())
    }

    pub fn with_config(root_target: Arc<dyn Vnode>, config: NamespaceConfig) -> NsResult<Self> {
        if !root_target.kind().is_dir() {
            return Err(NsError::WrongType);
        }

        let faults = FaultInjector::with_policy(config.fault.clone().unwrap_or_default());
        let root = NodeId::allocate();
        let node = Node::new(NameStore::root(), root_target, NodeState::Attached);
        node.target.link_name(root);

        let mut nodes = HashMap::new();
        nodes.insert(root, node);
        debug!(target: "devns::tree", event = "init", root = %root);

        Ok(Self {
            config,
            faults,
            nodes,
            root,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Allocation fault controller; install a policy to exercise OOM paths.
    pub fn faults(&self) -> &FaultInjector {
        &self.faults
    }

    /// Number of nodes not yet freed, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    fn get(&self, id: NodeId) -> NsResult<&Node> {
        self.nodes.get(&id).ok_or(NsError::NotFound)
    }

    fn get_mut(&mut self, id: NodeId) -> NsResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(NsError::NotFound)
    }

    pub fn name(&self, id: NodeId) -> NsResult<&[u8]> {
        Ok(self.get(id)?.name())
    }

    pub fn kind(&self, id: NodeId) -> NsResult<NodeKind> {
        Ok(self.get(id)?.kind)
    }

    pub fn state(&self, id: NodeId) -> NsResult<NodeState> {
        Ok(self.get(id)?.state)
    }

    pub fn refcount(&self, id: NodeId) -> NsResult<u32> {
        Ok(self.get(id)?.refcount)
    }

    pub fn parent(&self, id: NodeId) -> NsResult<Option<NodeId>> {
        Ok(self.get(id)?.parent)
    }

    pub fn target(&self, id: NodeId) -> NsResult<Arc<dyn Vnode>> {
        Ok(self.get(id)?.target.clone())
    }

    /// Children of a directory in insertion order.
    pub fn children(&self, dir: NodeId) -> NsResult<Vec<NodeId>> {
        Ok(self.child_entries(dir)?.iter().map(|c| c.id).collect())
    }

    pub(crate) fn child_entries(&self, dir: NodeId) -> NsResult<&[ChildEntry]> {
        let node = self.get(dir)?;
        if !node.kind.is_dir() {
            return Err(NsError::WrongType);
        }
        Ok(&node.children)
    }

    /// Build a new unattached node named `name` for `target`, holding one reference.
    pub fn create(&mut self, name: &[u8], target: Arc<dyn Vnode>) -> NsResult<NodeId> {
        let name = NameStore::encode_with(name, Some(&self.faults)).inspect_err(|err| {
            warn!(target: "devns::tree", event = "create_rejected", len = name.len(), %err);
        })?;
        self.faults.check(FaultOp::NodeAlloc)?;
        self.nodes.try_reserve(1).map_err(|_| NsError::OutOfMemory)?;

        let id = NodeId::allocate();
        let node = Node::new(name, target, NodeState::Unattached);
        debug!(
            target: "devns::tree",
            event = "create",
            node = %id,
            name = ?node.name,
            kind = %node.kind
        );
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Link the unattached `child` under the directory `parent`.
    ///
    /// The caller must already know that no sibling has the child's name (for
    /// example from a prior [`lookup`](Self::lookup)). The check is only made
    /// when `reject_duplicate_names` is configured; otherwise a duplicate trips
    /// a debug assertion.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> NsResult<()> {
        if parent == child {
            return Err(NsError::InvalidArgument);
        }
        let parent_node = self.get(parent)?;
        if !parent_node.kind.is_dir() {
            return Err(NsError::WrongType);
        }
        if parent_node.state == NodeState::Detached {
            return Err(NsError::BadState);
        }
        let child_node = self.get(child)?;
        if child_node.state != NodeState::Unattached {
            return Err(NsError::BadState);
        }
        if self.is_ancestor(child, parent) {
            return Err(NsError::InvalidArgument);
        }

        let duplicate = parent_node.children.iter().any(|entry| {
            self.nodes
                .get(&entry.id)
                .is_some_and(|sibling| sibling.name == child_node.name)
        });
        if duplicate {
            if self.config.reject_duplicate_names {
                warn!(
                    target: "devns::tree",
                    event = "duplicate_rejected",
                    parent = %parent,
                    name = ?child_node.name
                );
                return Err(NsError::AlreadyExists);
            }
            debug_assert!(
                !duplicate,
                "add_child: {:?} already present under {}",
                child_node.name, parent
            );
        }

        let parent_node = self.get_mut(parent)?;
        parent_node.children.try_reserve(1).map_err(|_| NsError::OutOfMemory)?;
        let seq = parent_node.next_seq;
        parent_node.next_seq += 1;
        parent_node.children.push(ChildEntry { seq, id: child });

        let child_node = self.get_mut(child)?;
        child_node.parent = Some(parent);
        child_node.state = NodeState::Attached;
        child_node.target.link_name(child);
        debug!(target: "devns::tree", event = "add_child", parent = %parent, node = %child, seq);
        Ok(())
    }

    /// True when `ancestor` is `node` or lies on the parent chain above it.
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cursor = Some(node);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Find the child of `parent` named exactly `name`.
    ///
    /// The refcount is untouched; hold the returned id past the caller's lock
    /// only after [`acquire`](Self::acquire).
    pub fn lookup(&self, parent: NodeId, name: &[u8]) -> NsResult<NodeId> {
        let found = self
            .child_entries(parent)?
            .iter()
            .map(|entry| entry.id)
            .find(|id| self.nodes.get(id).is_some_and(|n| n.name.matches(name)));
        trace!(
            target: "devns::tree",
            event = "lookup",
            parent = %parent,
            name = %String::from_utf8_lossy(name),
            hit = found.is_some()
        );
        found.ok_or(NsError::NotFound)
    }

    /// Unlink the attached `node` from its parent and from its target's
    /// back-reference list.
    ///
    /// The node is freed immediately when nobody holds a reference, otherwise
    /// it stays addressable as [`NodeState::Detached`] until the last release.
    /// A node that was never attached is discarded through
    /// [`release`](Self::release) instead.
    pub fn delete(&mut self, node: NodeId) -> NsResult<()> {
        let current = self.get(node)?;
        match current.state {
            NodeState::Detached => return Err(NsError::NotFound),
            NodeState::Unattached => {
                warn!(
                    target: "devns::tree",
                    event = "delete_rejected",
                    node = %node,
                    state = ?current.state
                );
                return Err(NsError::BadState);
            }
            NodeState::Attached => {}
        }
        if node == self.root {
            return Err(NsError::BadState);
        }
        if current.kind.is_dir() && !current.children.is_empty() {
            warn!(
                target: "devns::tree",
                event = "delete_rejected",
                node = %node,
                children = current.children.len()
            );
            return Err(NsError::BadState);
        }

        let parent = current.parent;
        let mut orphaned_parent = None;
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|entry| entry.id != node);
                if parent_node.state == NodeState::Unattached
                    && parent_node.refcount == 0
                    && parent_node.children.is_empty()
                {
                    orphaned_parent = Some(parent);
                }
            }
        }

        let current = self.get_mut(node)?;
        if !current.target.unlink_name(node) {
            warn!(target: "devns::tree", event = "backref_missing", node = %node);
        }
        current.parent = None;
        current.state = NodeState::Detached;
        let refcount = current.refcount;
        debug!(target: "devns::tree", event = "delete", node = %node, refcount);

        if refcount == 0 {
            self.free(node);
        }
        // An unreferenced, never-attached directory was only kept for its children
        if let Some(parent) = orphaned_parent {
            self.free(parent);
        }
        Ok(())
    }

    /// Take an additional reference on `node`.
    pub fn acquire(&mut self, node: NodeId) -> NsResult<u32> {
        let current = self.get_mut(node)?;
        current.refcount = current.refcount.checked_add(1).ok_or(NsError::BadState)?;
        trace!(target: "devns::tree", event = "acquire", node = %node, refcount = current.refcount);
        Ok(current.refcount)
    }

    /// Drop a reference on `node`. Returns true if this freed the node.
    ///
    /// A node is freed when its last reference goes and it is either detached
    /// or was never attached. An unattached directory still holding children
    /// stays until its last child is deleted, as it remains their parent.
    pub fn release(&mut self, node: NodeId) -> NsResult<bool> {
        let current = self.get_mut(node)?;
        if current.refcount == 0 {
            return Err(NsError::BadState);
        }
        current.refcount -= 1;
        trace!(target: "devns::tree", event = "release", node = %node, refcount = current.refcount);
        let discard = match current.state {
            NodeState::Detached => true,
            NodeState::Unattached => current.children.is_empty(),
            NodeState::Attached => false,
        };
        if current.refcount == 0 && discard {
            self.free(node);
            return Ok(true);
        }
        Ok(false)
    }

    fn free(&mut self, node: NodeId) {
        if let Some(freed) = self.nodes.remove(&node) {
            debug!(target: "devns::tree", event = "free", node = %node, name = ?freed.name);
        }
    }

    /// Create `name` under `parent` for `target` unless the name is taken.
    ///
    /// Unlike [`create`](Self::create), the returned node carries no caller
    /// reference; the tree alone keeps it alive.
    pub fn link(
        &mut self,
        parent: NodeId,
        name: &[u8],
        target: Arc<dyn Vnode>,
    ) -> NsResult<NodeId> {
        match self.lookup(parent, name) {
            Ok(_) => return Err(NsError::AlreadyExists),
            Err(NsError::NotFound) => {}
            Err(err) => return Err(err),
        }
        let child = self.create(name, target)?;
        if let Err(err) = self.add_child(parent, child) {
            self.release(child)?;
            return Err(err);
        }
        self.release(child)?;
        Ok(child)
    }

    /// Create a directory backed by a fresh in-memory vnode.
    pub fn mkdir(&mut self, parent: NodeId, name: &[u8]) -> NsResult<NodeId> {
        self.link(parent, name, Arc::new(MemVnode::directory()))
    }

    /// Resolve a `/`-separated path starting at `start` (or at the root for
    /// absolute paths), following symlinks up to `max_symlink_depth`.
    pub fn walk(&self, start: NodeId, path: &[u8]) -> NsResult<NodeId> {
        let mut depth = 0;
        self.walk_from(start, path, &mut depth)
    }

    fn walk_from(&self, start: NodeId, path: &[u8], depth: &mut u32) -> NsResult<NodeId> {
        let mut current = if path.first() == Some(&b'/') {
            self.root
        } else {
            start
        };
        self.get(current)?;

        for component in path.split(|b| *b == b'/') {
            match component {
                b"" | b"." => continue,
                b".." => {
                    current = self.get(current)?.parent.unwrap_or(current);
                    continue;
                }
                _ => {}
            }
            let next = self.lookup(current, component)?;
            current = self.follow(current, next, depth)?;
        }
        Ok(current)
    }

    fn follow(&self, dir: NodeId, node: NodeId, depth: &mut u32) -> NsResult<NodeId> {
        let current = self.get(node)?;
        if current.kind != NodeKind::Symlink {
            return Ok(node);
        }
        let Some(body) = current.target.symlink_target() else {
            return Ok(node);
        };
        *depth += 1;
        if *depth > self.config.max_symlink_depth {
            warn!(target: "devns::tree", event = "symlink_depth", node = %node, depth = *depth);
            return Err(NsError::RecurseTooDeep);
        }
        self.walk_from(dir, &body, depth)
    }

    /// Indented listing of everything reachable from the root.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(self.root, 0usize)];
        while let Some((id, indent)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            let name = if id == self.root {
                Cow::Borrowed("/")
            } else {
                String::from_utf8_lossy(node.name())
            };
            let _ = writeln!(
                out,
                "{:indent$}{} ({}, refs={})",
                "",
                name,
                node.kind,
                node.refcount,
                indent = indent * 2
            );
            // Reversed so the first child is printed first
            stack.extend(node.children.iter().rev().map(|entry| (entry.id, indent + 1)));
        }
        out
    }
}

impl std::fmt::Debug for NamespaceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceTree")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Storage object ("vnode") capability consumed by the tree
//!
//! The tree never looks at vnode content. It reads the type tag when a node is
//! created and keeps the vnode's back-reference list in step with the nodes
//! attached to it.

use crate::types::{NodeId, NodeKind};
use std::sync::{Mutex, PoisonError};

/// Capability the namespace tree needs from a storage object.
#[cfg_attr(test, mockall::automock)]
pub trait Vnode: Send + Sync {
    /// Type tag of the object.
    fn kind(&self) -> NodeKind;

    /// Record `node` as one of the names of this object.
    fn link_name(&self, node: NodeId);

    /// Forget `node`. Returns false if it was not recorded.
    fn unlink_name(&self, node: NodeId) -> bool;

    /// Number of nodes currently naming this object.
    fn name_count(&self) -> usize;

    /// Link body of a symlink object, if the object exposes one.
    fn symlink_target(&self) -> Option<Vec<u8>> {
        None
    }
}

/// In-memory vnode used by device publication and tests.
#[derive(Debug)]
pub struct MemVnode {
    kind: NodeKind,
    link_body: Option<Vec<u8>>,
    names: Mutex<Vec<NodeId>>,
}

impl MemVnode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            link_body: None,
            names: Mutex::new(Vec::new()),
        }
    }

    pub fn directory() -> Self {
        Self::new(NodeKind::Directory)
    }

    pub fn file() -> Self {
        Self::new(NodeKind::File)
    }

    pub fn device() -> Self {
        Self::new(NodeKind::Device)
    }

    pub fn symlink(target: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: NodeKind::Symlink,
            link_body: Some(target.into()),
            names: Mutex::new(Vec::new()),
        }
    }

    /// Nodes naming this object, in link order.
    pub fn names(&self) -> Vec<NodeId> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Vnode for MemVnode {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn link_name(&self, node: NodeId) {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).push(node);
    }

    fn unlink_name(&self, node: NodeId) -> bool {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        match names.iter().position(|n| *n == node) {
            Some(idx) => {
                names.remove(idx);
                true
            }
            None => false,
        }
    }

    fn name_count(&self) -> usize {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn symlink_target(&self) -> Option<Vec<u8>> {
        self.link_body.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_reference_list_tracks_links() {
        let vn = MemVnode::file();
        let a = NodeId::allocate();
        let b = NodeId::allocate();
        vn.link_name(a);
        vn.link_name(b);
        assert_eq!(vn.name_count(), 2);
        assert!(vn.unlink_name(a));
        assert!(!vn.unlink_name(a));
        assert_eq!(vn.names(), vec![b]);
    }

    #[test]
    fn symlink_exposes_body() {
        let vn = MemVnode::symlink("class/ethernet");
        assert_eq!(vn.kind(), NodeKind::Symlink);
        assert_eq!(vn.symlink_target().as_deref(), Some(&b"class/ethernet"[..]));
        assert_eq!(MemVnode::device().symlink_target(), None);
    }
}

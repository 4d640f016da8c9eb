// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions for the namespace tree

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable identifier of a namespace node.
///
/// Ids come from a process-wide counter, so a vnode named from several trees
/// never sees two nodes with the same id in its back-reference list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn allocate() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "dn#{}", self.0)
    }
}

/// Kind of a namespace node, taken from the type tag of the vnode it names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
    Device,
    Symlink,
}

impl NodeKind {
    /// Type byte used in directory records.
    pub fn wire_tag(self) -> u8 {
        match self {
            NodeKind::Directory => 1,
            NodeKind::File => 2,
            NodeKind::Device => 3,
            NodeKind::Symlink => 4,
        }
    }

    pub fn from_wire_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(NodeKind::Directory),
            2 => Some(NodeKind::File),
            3 => Some(NodeKind::Device),
            4 => Some(NodeKind::Symlink),
            _ => None,
        }
    }

    pub fn is_dir(self) -> bool {
        self == NodeKind::Directory
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Directory => "dir",
            NodeKind::File => "file",
            NodeKind::Device => "device",
            NodeKind::Symlink => "symlink",
        };
        f.write_str(s)
    }
}

/// Position of a node in its lifecycle. A freed node is no longer addressable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    /// Created, not yet linked under a parent.
    Unattached,
    /// Linked into the tree (the root is always attached).
    Attached,
    /// Unlinked by delete, waiting for its last reference to go away.
    Detached,
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! devns-core: directory-node namespace for the device manager
//!
//! A [`NamespaceTree`] maps names to storage objects ([`Vnode`]s). Devices,
//! files and subdirectories are published under directory nodes, looked up one
//! path component at a time and listed through the cursor-driven enumerator in
//! [`readdir`].

pub mod config;
pub mod error;
pub mod fault;
pub mod name;
pub mod readdir;
pub mod tree;
pub mod types;
pub mod vnode;

pub use config::{ConfigError, NamespaceConfig};
pub use error::{NsError, NsResult, Status};
pub use fault::{FaultInjector, FaultOp, FaultPolicy, FaultRule};
pub use name::{NameStore, NAME_INLINE_MAX, NAME_MAX};
pub use readdir::{Cursor, DirEntry, DirentReader, ReadDirOutcome};
pub use tree::{NamespaceTree, Node};
pub use types::{NodeId, NodeKind, NodeState};
pub use vnode::{MemVnode, Vnode};

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! TOML description of a namespace to publish

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use devns_core::{MemVnode, NamespaceConfig, NamespaceTree, NodeId, NodeKind, NsError, Vnode};
use devns_logging::LoggingConfig;
use serde::Deserialize;
use tracing::debug;

/// Manifest file contents
///
/// ```toml
/// [namespace]
/// reject-duplicate-names = true
///
/// [[entry]]
/// path = "class/ethernet/000"
/// kind = "device"
/// target = "eth0"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Manifest {
    pub namespace: NamespaceConfig,
    pub logging: LoggingConfig,
    #[serde(rename = "entry")]
    pub entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Entry {
    /// Slash-separated path below the root
    pub path: String,
    pub kind: NodeKind,
    /// Entries naming the same target are hard links to one object
    #[serde(default)]
    pub target: Option<String>,
    /// Body of a symlink entry
    #[serde(default)]
    pub link: Option<String>,
}

impl Manifest {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing manifest")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {:?}", path))?;
        Self::from_toml_str(&content)
    }

    /// Build a tree holding every entry, creating missing parent directories.
    pub fn build(&self) -> Result<NamespaceTree> {
        let mut tree = NamespaceTree::with_config(
            Arc::new(MemVnode::directory()),
            self.namespace.clone(),
        )?;
        let mut targets: HashMap<&str, Arc<dyn Vnode>> = HashMap::new();

        for entry in &self.entries {
            let (dir, name) = split_path(&entry.path)?;
            let parent = mkdir_all(&mut tree, dir)
                .with_context(|| format!("creating parent directories of {}", entry.path))?;

            let target = match entry.target.as_deref() {
                Some(key) => match targets.get(key) {
                    Some(existing) => {
                        if existing.kind() != entry.kind {
                            bail!(
                                "{}: target {key} is a {}, not a {}",
                                entry.path,
                                existing.kind(),
                                entry.kind
                            );
                        }
                        existing.clone()
                    }
                    None => {
                        let vnode = new_vnode(entry)?;
                        targets.insert(key, vnode.clone());
                        vnode
                    }
                },
                None => new_vnode(entry)?,
            };

            let id = tree
                .link(parent, name.as_bytes(), target)
                .with_context(|| format!("publishing {}", entry.path))?;
            debug!(path = %entry.path, node = %id, kind = %entry.kind, "published");
        }
        Ok(tree)
    }
}

fn new_vnode(entry: &Entry) -> Result<Arc<dyn Vnode>> {
    let vnode = match (entry.kind, &entry.link) {
        (NodeKind::Symlink, Some(link)) => MemVnode::symlink(link.as_bytes()),
        (NodeKind::Symlink, None) => bail!("{}: symlink entry needs `link`", entry.path),
        (_, Some(_)) => bail!("{}: only symlink entries take `link`", entry.path),
        (kind, None) => MemVnode::new(kind),
    };
    Ok(Arc::new(vnode))
}

/// Split `a/b/c` into (`a/b`, `c`).
fn split_path(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_matches('/');
    let (dir, name) = trimmed.rsplit_once('/').unwrap_or(("", trimmed));
    if name.is_empty() || name == "." || name == ".." {
        return Err(anyhow!("invalid entry path {path:?}"));
    }
    Ok((dir, name))
}

fn mkdir_all(tree: &mut NamespaceTree, dir: &str) -> Result<NodeId> {
    let mut current = tree.root();
    for component in dir.split('/').filter(|c| !c.is_empty()) {
        current = match tree.lookup(current, component.as_bytes()) {
            Ok(existing) => existing,
            Err(NsError::NotFound) => tree.mkdir(current, component.as_bytes())?,
            Err(err) => return Err(anyhow!("{component}: {err}")),
        };
    }
    Ok(current)
}

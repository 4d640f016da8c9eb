// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Namespace tree configuration

use crate::fault::FaultPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of symlinks `walk` follows before giving up.
pub const DEFAULT_MAX_SYMLINK_DEPTH: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path:?}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct NamespaceConfig {
    /// Reject a sibling with an existing name in `add_child` instead of
    /// trusting the caller to have looked it up first.
    pub reject_duplicate_names: bool,
    /// Symlinks followed by a single `walk` call.
    pub max_symlink_depth: u32,
    /// Allocation failures to inject (testing only).
    pub fault: Option<FaultPolicy>,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            reject_duplicate_names: false,
            max_symlink_depth: DEFAULT_MAX_SYMLINK_DEPTH,
            fault: None,
        }
    }
}

impl NamespaceConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn strict() -> Self {
        Self {
            reject_duplicate_names: true,
            ..Self::default()
        }
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging configuration types

use serde::{Deserialize, Serialize};

use crate::{CliLogLevel, CliLoggingArgs, LogFormat};

/// `[logging]` section of a devns configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    /// Logging verbosity level
    pub log_level: Option<CliLogLevel>,
    pub log_format: Option<LogFormat>,
    pub log_file: Option<String>,
}

impl CliLoggingArgs {
    /// Fill options not given on the command line from a config file section.
    pub fn with_config(mut self, config: &LoggingConfig) -> Self {
        self.log_level = self.log_level.or(config.log_level);
        self.log_format = self.log_format.or(config.log_format);
        if self.log_file.is_none() {
            self.log_file = config.log_file.clone();
        }
        self
    }
}

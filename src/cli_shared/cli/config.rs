// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::Client;
use crate::utils::misc::LoggingColor;

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    /// Per-module level overrides, applied on top of the default `info` level.
    pub filters: Vec<LogValue>,
    /// Directory for hourly rolling log files. Console only if unset.
    pub dir: Option<PathBuf>,
    pub color: LoggingColor,
}

impl LogConfig {
    pub(in crate::cli_shared) fn to_filter_string(&self) -> String {
        self.filters
            .iter()
            .map(|f| format!("{}={}", f.module, f.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filters: vec![LogValue::new("sqlx", "warn")],
            dir: None,
            color: LoggingColor::default(),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Hash, Debug, Clone)]
pub struct LogValue {
    pub module: String,
    pub level: String,
}

impl LogValue {
    pub fn new(module: &str, level: &str) -> Self {
        Self {
            module: module.to_string(),
            level: level.to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub client: Client,
    pub log: LogConfig,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.client.data_dir.join(&self.client.db_name)
    }
}

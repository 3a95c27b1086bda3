// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Client {
    pub data_dir: PathBuf,
    /// Database file name, relative to `data_dir`.
    pub db_name: String,
}

impl Default for Client {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("com", "ChainSafe", "Chainwatch")
            .map(|dir| dir.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir,
            db_name: "chainwatch.db".into(),
        }
    }
}

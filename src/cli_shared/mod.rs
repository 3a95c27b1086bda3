// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod cli;
pub mod logger;

use crate::cli_shared::cli::Config;
use crate::utils::io::read_toml;
use anyhow::Context as _;
use std::path::Path;

/// Reads the configuration file at `path`, or the defaults when no path is given.
pub fn read_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let toml = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            read_toml(&toml)
        }
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_config_default() {
        let config = read_config(None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn read_config_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut expected = Config::default();
        expected.client.db_name = "test.db".into();
        std::fs::write(&path, toml::to_string(&expected).unwrap()).unwrap();

        assert_eq!(read_config(Some(&path)).unwrap(), expected);
    }

    #[test]
    fn read_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_config(Some(&dir.path().join("absent.toml"))).is_err());
    }
}

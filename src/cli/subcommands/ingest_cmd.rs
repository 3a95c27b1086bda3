// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;

use crate::cli_shared::cli::Config;
use crate::processor::json::IngestBundle;
use crate::processor::{Processor, tips};
use crate::utils::io::read_json;

#[derive(Debug, clap::Args)]
pub struct IngestCommand {
    /// JSON bundle holding the actor observations, address change sets and tipset heights of one
    /// cycle
    bundle: PathBuf,
}

impl IngestCommand {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let json = tokio::fs::read_to_string(&self.bundle)
            .await
            .with_context(|| format!("failed to read {}", self.bundle.display()))?;
        let bundle: IngestBundle = read_json(&json)
            .with_context(|| format!("malformed bundle {}", self.bundle.display()))?;

        let processor = Processor::open(&config.db_path()).await?;
        let summary = processor
            .handle_common_actors_changes(
                Arc::new(bundle.actor_changes()),
                &bundle.address_changes(),
            )
            .await?;

        let mut new_heights = 0;
        for sh in &bundle.state_heights {
            if tips::record_state_height(
                processor.db(),
                &sh.tipset,
                sh.height,
                &sh.parent_state_root,
            )
            .await?
            {
                new_heights += 1;
            }
        }

        println!(
            "{} new heads, {} new states, {new_heights} new tipset heights",
            summary.new_heads, summary.new_states
        );
        Ok(())
    }
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use crate::cli_shared::cli::Config;
use crate::processor::Processor;

#[derive(Debug, clap::Args)]
pub struct InitCommand {}

impl InitCommand {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let path = config.db_path();
        Processor::open(&path).await?;
        println!("Database ready at {}", path.display());
        Ok(())
    }
}

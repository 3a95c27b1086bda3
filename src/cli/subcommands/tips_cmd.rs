// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::ValueEnum;
use fvm_shared4::clock::ChainEpoch;
use tabled::{builder::Builder, settings::Style};

use crate::cli_shared::cli::Config;
use crate::processor::json::ActorTipJson;
use crate::processor::{ActorTip, Processor};

/// Output format
#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum TipsFormat {
    /// Markdown table
    #[default]
    Table,
    /// JSON
    Json,
}

#[derive(Debug, clap::Args)]
pub struct TipsCommand {
    /// Only lineage entries strictly below this epoch are considered
    epoch: ChainEpoch,
    /// The output format.
    #[arg(long, value_enum, default_value_t = TipsFormat::Table)]
    format: TipsFormat,
}

impl TipsCommand {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let processor = Processor::open(&config.db_path()).await?;
        let tips = processor.actor_tips(self.epoch).await?;
        match self.format {
            TipsFormat::Table => println!("{}", format_as_markdown(&tips)),
            TipsFormat::Json => {
                let tips = tips.iter().map(ActorTipJson::from).collect::<Vec<_>>();
                println!("{}", serde_json::to_string_pretty(&tips)?);
            }
        }
        Ok(())
    }
}

fn format_as_markdown(tips: &[ActorTip]) -> String {
    let mut builder = Builder::default();

    builder.push_record(["ID", "Code", "Head", "Nonce", "Balance", "Height"]);

    for tip in tips {
        builder.push_record([
            tip.id.to_string(),
            tip.code.to_string(),
            tip.head.to_string(),
            tip.nonce.to_string(),
            tip.balance.atto().to_string(),
            tip.height.to_string(),
        ]);
    }

    builder.build().with(Style::markdown()).to_string()
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod ingest_cmd;
mod init_cmd;
mod tips_cmd;

use std::path::PathBuf;

pub(super) use self::{ingest_cmd::IngestCommand, init_cmd::InitCommand, tips_cmd::TipsCommand};
use crate::cli_shared::cli::{Config, HELP_MESSAGE};
use clap::Parser;

/// CLI structure generated when interacting with the chainwatch binary
#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), bin_name = "chainwatch", author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"), about = env!("CARGO_PKG_DESCRIPTION"))]
#[command(help_template(HELP_MESSAGE))]
pub struct Cli {
    /// A TOML file containing relevant configurations
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Subcommand,
}

/// chainwatch sub-commands available.
#[derive(clap::Subcommand, Debug)]
pub enum Subcommand {
    /// Create the database and bring its schema up to date
    Init(InitCommand),

    /// Ingest one cycle of actor changes from a JSON bundle
    Ingest(IngestCommand),

    /// Print the latest known state of every actor as of an epoch
    Tips(TipsCommand),
}

impl Subcommand {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        match self {
            Self::Init(cmd) => cmd.run(config).await,
            Self::Ingest(cmd) => cmd.run(config).await,
            Self::Tips(cmd) => cmd.run(config).await,
        }
    }
}

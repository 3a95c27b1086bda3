// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

use crate::cli_shared::cli::LogConfig;

/// Keeps the file writer flushing. Drop it on shutdown, not before.
#[derive(Default)]
pub struct Guards {
    _file: Option<WorkerGuard>,
}

pub fn setup_logger(config: &LogConfig) -> Guards {
    let mut guards = Guards::default();
    let mut layers: Vec<Box<dyn tracing_subscriber::layer::Layer<Registry> + Send + Sync>> =
        // console logger
        vec![Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(config.color.coloring_enabled())
                .with_writer(std::io::stderr)
                .with_filter(get_env_filter(default_env_filter(config))),
        )];

    // file logger
    if let Some(log_dir) = &config.dir {
        let file_appender = tracing_appender::rolling::hourly(log_dir, "chainwatch.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        guards._file = Some(guard);
        layers.push(Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(get_env_filter(default_env_filter(config))),
        ));
    }

    tracing_subscriber::registry().with(layers).init();
    guards
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable, or `def`.
fn get_env_filter(def: EnvFilter) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => def,
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

fn default_env_filter(config: &LogConfig) -> EnvFilter {
    let overrides = config.to_filter_string();
    let directives = if overrides.is_empty() {
        "info".to_string()
    } else {
        format!("info,{overrides}")
    };
    // malformed overrides are skipped
    EnvFilter::builder().parse_lossy(directives)
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod cli;
mod cli_shared;
pub mod processor;
#[cfg(test)]
mod test_utils;
mod utils;

pub use cli::main::main as chainwatch_main;

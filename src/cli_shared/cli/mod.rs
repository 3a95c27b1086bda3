// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod client;
mod config;

pub use self::{client::*, config::*};

pub const HELP_MESSAGE: &str = "\
{name} {version}
{author}
{about}

{usage-heading} {usage}

{all-args}
";

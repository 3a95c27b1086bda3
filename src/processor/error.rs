// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_shared4::address::Address;
use thiserror::Error;

use super::types::Transition;

/// Ingestion and query errors. A failed stage commits nothing.
#[derive(Debug, Error)]
pub enum Error {
    /// Store failure, including constraint violations and lost connections.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// An observation references an identifier that has no address binding.
    #[error("actor {id} (code {code}) has no entry in the address map")]
    UndefinedIdentifier { code: Cid, id: Address },
    /// Observations must be keyed by ID address.
    #[error("actor {addr} (code {code}) is not identified by an ID address")]
    NotAnIdAddress { code: Cid, addr: Address },
    /// An observation filed under one actor code reports another.
    #[error("actor {addr} filed under code {key} reports code {code}")]
    CodeMismatch { key: Cid, addr: Address, code: Cid },
    /// The state-diff evaluator produced a change set that cannot be applied.
    #[error("malformed address change set for {transition}: {reason}")]
    MalformedChangeSet {
        transition: Transition,
        reason: String,
    },
    /// A stored value could not be decoded.
    #[error("invalid {column} value {value:?} in store")]
    InvalidRow { column: &'static str, value: String },
    #[error("address change evaluation failed: {0:#}")]
    ChangeSource(anyhow::Error),
    #[error("ingestion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

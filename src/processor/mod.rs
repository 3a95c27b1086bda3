// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Ingestion of per-epoch actor-state diffs into `id_address_map`, `actors` and `actor_states`.
//!
//! One cycle resolves addresses first, since head rows reference identifiers that must already be
//! correct, and then stores heads and states concurrently. Each stage commits on its own; a cycle
//! succeeds only if all of them do.

pub mod addresses;
mod error;
pub mod heads;
pub mod json;
pub mod schema;
pub mod states;
pub mod tips;
pub mod types;

#[cfg(test)]
mod tests;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use fvm_shared4::address::Address;
use fvm_shared4::clock::ChainEpoch;
use sqlx::SqlitePool;
use tokio::task::JoinSet;

pub use self::addresses::AddressUpdates;
pub use self::error::Error;
pub use self::types::*;

/// Row counts written by one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub new_heads: u64,
    pub new_states: u64,
}

enum Stored {
    Heads(u64),
    States(u64),
}

#[derive(Debug, Clone)]
pub struct Processor {
    db: SqlitePool,
}

impl Processor {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Opens (or creates) the database at `path` and brings the schema up to date.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let processor = Self::new(crate::utils::sqlite::open_file(path).await?);
        processor.setup().await?;
        Ok(processor)
    }

    pub async fn setup(&self) -> anyhow::Result<()> {
        schema::setup(&self.db).await
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    /// Runs one ingestion cycle.
    ///
    /// Head and state persistence only start once the address map is committed. They run as two
    /// tasks; the first failure aborts the other one, whose open transaction is then rolled back.
    /// Rows committed by a stage that finished before the failure are kept: every stage merges
    /// with insert-if-absent semantics, so the whole cycle can simply be retried.
    pub async fn handle_common_actors_changes(
        &self,
        actors: Arc<ActorChanges>,
        source: &dyn AddressChangeSource,
    ) -> Result<CycleSummary, Error> {
        let start = Instant::now();

        for (code, info) in observations(&actors) {
            heads::check_observation(code, info)?;
        }
        let updates = AddressUpdates::collect(&actors, source)?;
        addresses::store_actor_addresses(&self.db, &updates).await?;

        let mut tasks = JoinSet::new();
        {
            let (db, actors) = (self.db.clone(), actors.clone());
            tasks.spawn(async move {
                heads::store_actor_heads(&db, &actors)
                    .await
                    .map(Stored::Heads)
            });
        }
        {
            let (db, actors) = (self.db.clone(), actors.clone());
            tasks.spawn(async move {
                states::store_actor_states(&db, &actors)
                    .await
                    .map(Stored::States)
            });
        }

        let mut summary = CycleSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined.map_err(Error::from).and_then(|stored| stored) {
                Ok(Stored::Heads(n)) => summary.new_heads = n,
                Ok(Stored::States(n)) => summary.new_states = n,
                Err(e) => {
                    tasks.abort_all();
                    tracing::warn!("Ingestion cycle failed: {e}");
                    return Err(e);
                }
            }
        }

        tracing::info!(
            "Ingested {} observations ({} new heads, {} new states) in {}",
            observations(&actors).count(),
            summary.new_heads,
            summary.new_states,
            humantime::format_duration(start.elapsed())
        );
        Ok(summary)
    }

    /// See [`tips::actor_tips`].
    pub async fn actor_tips(&self, epoch: ChainEpoch) -> Result<Vec<ActorTip>, Error> {
        tips::actor_tips(&self.db, epoch).await
    }

    pub async fn resolve_id(&self, address: &Address) -> Result<Option<Address>, Error> {
        addresses::resolve_id(&self.db, address).await
    }

    pub async fn resolve_address(&self, id: &Address) -> Result<Option<Address>, Error> {
        addresses::resolve_address(&self.db, id).await
    }
}

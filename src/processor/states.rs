// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Instant;

use cid::Cid;
use sqlx::SqlitePool;

use super::error::Error;
use super::types::{ActorChanges, observations};

/// Persists actor state blobs keyed by `(head, code)`. The key is a content address, so the first
/// blob stored for a key is kept and later ones are dropped.
pub async fn store_actor_states(db: &SqlitePool, changes: &ActorChanges) -> Result<u64, Error> {
    let start = Instant::now();

    let mut tx = db.begin().await?;
    sqlx::query("DROP TABLE IF EXISTS temp.s")
        .execute(tx.as_mut())
        .await?;
    sqlx::query("CREATE TEMP TABLE s (head TEXT NOT NULL, code TEXT NOT NULL, state BLOB NOT NULL)")
        .execute(tx.as_mut())
        .await?;

    for (code, info) in observations(changes) {
        sqlx::query("INSERT INTO temp.s (head, code, state) VALUES (?, ?, ?)")
            .bind(info.act.head.to_string())
            .bind(code.to_string())
            .bind(info.state.as_slice())
            .execute(tx.as_mut())
            .await?;
    }

    let inserted = sqlx::query(
        "INSERT INTO actor_states (head, code, state) SELECT head, code, state FROM temp.s WHERE true ORDER BY rowid ON CONFLICT DO NOTHING",
    )
    .execute(tx.as_mut())
    .await?
    .rows_affected();

    sqlx::query("DROP TABLE temp.s").execute(tx.as_mut()).await?;
    tx.commit().await?;

    tracing::debug!(
        "Stored Actor States: {inserted} new rows in {}",
        humantime::format_duration(start.elapsed())
    );
    Ok(inserted)
}

/// Loads the state blob stored for `(head, code)`.
pub async fn load_actor_state(
    db: &SqlitePool,
    head: &Cid,
    code: &Cid,
) -> Result<Option<Vec<u8>>, Error> {
    Ok(
        sqlx::query_scalar("SELECT state FROM actor_states WHERE head = ? AND code = ?")
            .bind(head.to_string())
            .bind(code.to_string())
            .fetch_optional(db)
            .await?,
    )
}

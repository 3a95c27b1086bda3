// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::time::Instant;

use cid::Cid;
use sqlx::SqlitePool;

use super::addresses::parse_address;
use super::error::Error;
use super::types::{ActorChanges, ActorInfo, is_id_address, observations};

/// Rejects an observation that is not keyed by an ID address, or whose code differs from the
/// code it is filed under.
pub(super) fn check_observation(code: &Cid, info: &ActorInfo) -> Result<(), Error> {
    if !is_id_address(&info.addr) {
        return Err(Error::NotAnIdAddress {
            code: *code,
            addr: info.addr,
        });
    }
    if info.act.code != *code {
        return Err(Error::CodeMismatch {
            key: *code,
            addr: info.addr,
            code: info.act.code,
        });
    }
    Ok(())
}

/// Persists one `actors` row per observation. Rows are staged in a temporary table and merged
/// with insert-if-absent semantics on the natural key, so re-ingesting a diff adds nothing.
///
/// Every staged identifier must already be bound in `id_address_map`, otherwise the whole batch
/// is rolled back.
pub async fn store_actor_heads(db: &SqlitePool, changes: &ActorChanges) -> Result<u64, Error> {
    let start = Instant::now();

    let mut tx = db.begin().await?;
    sqlx::query("DROP TABLE IF EXISTS temp.a")
        .execute(tx.as_mut())
        .await?;
    sqlx::query(
        r#"CREATE TEMP TABLE a (
            id TEXT NOT NULL,
            code TEXT NOT NULL,
            head TEXT NOT NULL,
            nonce INTEGER NOT NULL,
            balance TEXT NOT NULL,
            stateroot TEXT NOT NULL
        )"#,
    )
    .execute(tx.as_mut())
    .await?;

    for (code, info) in observations(changes) {
        check_observation(code, info)?;
        let nonce = i64::try_from(info.act.nonce).map_err(|_| Error::InvalidRow {
            column: "nonce",
            value: info.act.nonce.to_string(),
        })?;
        sqlx::query(
            "INSERT INTO temp.a (id, code, head, nonce, balance, stateroot) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(info.addr.to_string())
        .bind(code.to_string())
        .bind(info.act.head.to_string())
        .bind(nonce)
        .bind(info.act.balance.atto().to_string())
        .bind(info.state_root.to_string())
        .execute(tx.as_mut())
        .await?;
    }

    // The merge goes first: it is the statement that takes the write lock.
    let inserted = sqlx::query(
        "INSERT INTO actors (id, code, head, nonce, balance, stateroot) SELECT id, code, head, nonce, balance, stateroot FROM temp.a WHERE true ON CONFLICT DO NOTHING",
    )
    .execute(tx.as_mut())
    .await?
    .rows_affected();

    let undefined: Option<(String, String)> = sqlx::query_as(
        "SELECT a.id, a.code FROM temp.a a LEFT JOIN id_address_map m ON m.id = a.id WHERE m.id IS NULL ORDER BY a.rowid LIMIT 1",
    )
    .fetch_optional(tx.as_mut())
    .await?;
    if let Some((id, code)) = undefined {
        return Err(Error::UndefinedIdentifier {
            code: code
                .parse()
                .map_err(|_| Error::InvalidRow {
                    column: "code",
                    value: code,
                })?,
            id: parse_address("id", id)?,
        });
    }

    sqlx::query("DROP TABLE temp.a").execute(tx.as_mut()).await?;
    tx.commit().await?;

    tracing::debug!(
        "Stored Actor Heads: {inserted} new rows in {}",
        humantime::format_duration(start.elapsed())
    );
    Ok(inserted)
}

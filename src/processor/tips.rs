// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Point-in-time reconstruction of actor metadata.
//!
//! An observation made at state root `S` becomes visible at every tipset whose parent state root
//! is `S`. `state_heights` records that lineage, so the tip of an actor as of epoch `H` is its
//! observation joined to the highest lineage entry strictly below `H`.

use cid::Cid;
use fvm_shared4::bigint::BigInt;
use fvm_shared4::clock::ChainEpoch;
use fvm_shared4::econ::TokenAmount;
use sqlx::SqlitePool;

use super::addresses::parse_address;
use super::error::Error;
use super::types::{ActorTip, TipsetKey};

// Ties on height are broken by the smallest state root, then the smallest head.
const ACTOR_TIPS: &str = r#"
SELECT id, code, head, nonce, balance, stateroot, height, parentstateroot FROM (
    SELECT a.id, a.code, a.head, a.nonce, a.balance, a.stateroot, sh.height, sh.parentstateroot,
        ROW_NUMBER() OVER (
            PARTITION BY a.id ORDER BY sh.height DESC, a.stateroot ASC, a.head ASC
        ) AS rn
    FROM actors a
    INNER JOIN state_heights sh ON sh.parentstateroot = a.stateroot
    WHERE sh.height < ?
)
WHERE rn = 1
ORDER BY id
"#;

#[derive(sqlx::FromRow)]
struct ActorTipRow {
    id: String,
    code: String,
    head: String,
    nonce: i64,
    balance: String,
    stateroot: String,
    height: i64,
    parentstateroot: String,
}

fn parse_cid(column: &'static str, value: String) -> Result<Cid, Error> {
    Cid::try_from(value.as_str()).map_err(|_| Error::InvalidRow { column, value })
}

impl TryFrom<ActorTipRow> for ActorTip {
    type Error = Error;

    fn try_from(row: ActorTipRow) -> Result<Self, Self::Error> {
        let balance = row
            .balance
            .parse::<BigInt>()
            .map_err(|_| Error::InvalidRow {
                column: "balance",
                value: row.balance.clone(),
            })?;
        Ok(ActorTip {
            id: parse_address("id", row.id)?,
            code: parse_cid("code", row.code)?,
            head: parse_cid("head", row.head)?,
            nonce: u64::try_from(row.nonce).map_err(|_| Error::InvalidRow {
                column: "nonce",
                value: row.nonce.to_string(),
            })?,
            balance: TokenAmount::from_atto(balance),
            state_root: parse_cid("stateroot", row.stateroot)?,
            height: row.height,
            parent_state_root: parse_cid("parentstateroot", row.parentstateroot)?,
        })
    }
}

/// Returns, for every identifier, its most recent observation whose lineage height is strictly
/// below `epoch`. Identifiers without such an observation are absent from the result.
pub async fn actor_tips(db: &SqlitePool, epoch: ChainEpoch) -> Result<Vec<ActorTip>, Error> {
    let rows: Vec<ActorTipRow> = sqlx::query_as(ACTOR_TIPS)
        .bind(epoch)
        .fetch_all(db)
        .await?;
    rows.into_iter().map(ActorTip::try_from).collect()
}

/// Records that the tipset `tipset` at `height` was executed on top of `parent_state_root`.
/// Returns `false` if the tipset was already known.
pub async fn record_state_height(
    db: &SqlitePool,
    tipset: &TipsetKey,
    height: ChainEpoch,
    parent_state_root: &Cid,
) -> Result<bool, Error> {
    let result = sqlx::query(
        "INSERT INTO state_heights (tipset, parentstateroot, height) VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
    )
    .bind(tipset.to_string())
    .bind(parent_state_root.to_string())
    .bind(height)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

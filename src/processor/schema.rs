// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_shared4::address::Address;
use sqlx::SqlitePool;

use crate::utils::sqlite::{self, SqliteQuery};

const DB_NAME: &str = "chainwatch";

/// Singleton actors that exist from genesis and never show up in an address-map diff.
pub const WELL_KNOWN_ACTORS: [Address; 8] = [
    Address::new_id(0),  // system
    Address::new_id(1),  // init
    Address::new_id(2),  // reward
    Address::new_id(3),  // cron
    Address::new_id(4),  // storage power
    Address::new_id(5),  // storage market
    Address::new_id(6),  // verified registry
    Address::new_id(99), // burnt funds
];

const DDLS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS id_address_map (
        id TEXT NOT NULL,
        address TEXT NOT NULL,
        CONSTRAINT id_address_map_pk PRIMARY KEY (id, address)
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS id_address_map_id_uindex ON id_address_map (id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS id_address_map_address_uindex ON id_address_map (address)",
    // `stateroot` takes part in the natural key, so it must not be NULL: NULLs never collide in
    // a unique index.
    r#"CREATE TABLE IF NOT EXISTS actors (
        id TEXT NOT NULL,
        code TEXT NOT NULL,
        head TEXT NOT NULL,
        nonce INTEGER NOT NULL,
        balance TEXT NOT NULL,
        stateroot TEXT NOT NULL,
        CONSTRAINT actors_natural_key UNIQUE (id, code, head, nonce, balance, stateroot)
    )"#,
    "CREATE INDEX IF NOT EXISTS actors_id_index ON actors (id)",
    "CREATE INDEX IF NOT EXISTS actors_stateroot_index ON actors (stateroot)",
    r#"CREATE TABLE IF NOT EXISTS actor_states (
        head TEXT NOT NULL,
        code TEXT NOT NULL,
        state BLOB NOT NULL
    )"#,
    "CREATE UNIQUE INDEX IF NOT EXISTS actor_states_head_code_uindex ON actor_states (head, code)",
    "CREATE INDEX IF NOT EXISTS actor_states_head_index ON actor_states (head)",
    // tipset lineage, one row per executed tipset
    r#"CREATE TABLE IF NOT EXISTS state_heights (
        tipset TEXT NOT NULL,
        parentstateroot TEXT NOT NULL,
        height INTEGER NOT NULL,
        CONSTRAINT state_heights_tipset_uindex UNIQUE (tipset)
    )"#,
    "CREATE INDEX IF NOT EXISTS state_heights_height_index ON state_heights (height)",
    "CREATE INDEX IF NOT EXISTS state_heights_parentstateroot_index ON state_heights (parentstateroot)",
];

fn seed_well_known() -> impl Iterator<Item = SqliteQuery<'static>> {
    WELL_KNOWN_ACTORS.into_iter().map(|addr| {
        sqlx::query("INSERT OR IGNORE INTO id_address_map (id, address) VALUES (?, ?)")
            .bind(addr.to_string())
            .bind(addr.to_string())
    })
}

/// Creates the tables on a fresh database, or brings an existing one up to date.
pub async fn setup(db: &SqlitePool) -> anyhow::Result<()> {
    sqlite::init_db(
        db,
        DB_NAME,
        DDLS.iter().copied().map(sqlx::query).chain(seed_well_known()),
        vec![],
    )
    .await
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_shared4::address::Address;
use multihash_codetable::{Code, MultihashDigest as _};
use sqlx::SqlitePool;

const DAG_CBOR: u64 = 0x71;

/// A deterministic CID derived from `seed`.
pub fn cid_of(seed: &str) -> Cid {
    Cid::new_v1(DAG_CBOR, Code::Blake2b256.digest(seed.as_bytes()))
}

/// A deterministic robust (actor protocol) address.
pub fn robust_address(n: u64) -> Address {
    Address::new_actor(&n.to_be_bytes())
}

/// A fresh on-disk database. The directory must outlive the pool.
pub async fn temp_db() -> (tempfile::TempDir, SqlitePool) {
    let dir = tempfile::tempdir().unwrap();
    let db = crate::utils::sqlite::open_file(&dir.path().join("chainwatch.db"))
        .await
        .unwrap();
    (dir, db)
}

// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Keeps `id_address_map` a bijection between robust addresses and ID addresses.
//!
//! Each cycle gathers the init actor's address-map changes for every transition in the diff.
//! Modified bindings (a reorg moved an address to another ID, or an ID to another address) are
//! rewritten in place, new bindings are inserted with first-writer-wins semantics per identifier.
//! Both passes share one transaction so no reader ever sees an address bound twice.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use fvm_shared4::address::Address;
use indexmap::IndexMap;
use sqlx::SqlitePool;

use super::error::Error;
use super::schema::WELL_KNOWN_ACTORS;
use super::types::{
    ActorChanges, AddressChange, AddressChangeSet, AddressChangeSource, AddressPair, Transition,
    is_id_address, observations,
};

/// Everything one cycle will write to the address map.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AddressUpdates {
    /// `address -> id`, in the order the bindings were first seen.
    pub bindings: IndexMap<Address, Address>,
    /// Corrections of bindings committed by earlier cycles, applied before any new binding.
    pub corrections: Vec<AddressChange>,
}

impl AddressUpdates {
    fn with_well_known() -> Self {
        Self {
            bindings: WELL_KNOWN_ACTORS.iter().map(|a| (*a, *a)).collect(),
            corrections: vec![],
        }
    }

    /// Evaluates the address-map changes of every transition in `changes`. Transitions are
    /// visited in key order, so a later binding of the same address replaces an earlier one
    /// deterministically. A correction of a binding added earlier in the same cycle is folded
    /// into that binding instead of being sent to the store.
    pub fn collect(
        changes: &ActorChanges,
        source: &dyn AddressChangeSource,
    ) -> Result<Self, Error> {
        let transitions: BTreeSet<&Transition> = observations(changes)
            .map(|(_, info)| &info.transition)
            .collect();

        let mut updates = Self::with_well_known();
        let mut added_here = HashSet::new();
        for transition in transitions {
            let Some(set) = source
                .address_changes(transition)
                .map_err(Error::ChangeSource)?
            else {
                continue;
            };
            validate(transition, &set)?;
            for AddressPair { id, address } in set.added {
                updates.bindings.insert(address, id);
                added_here.insert(address);
            }
            for change in set.modified {
                let AddressChange { from, to } = change;
                if added_here.contains(&from.address)
                    && updates.bindings.get(&from.address) == Some(&from.id)
                {
                    if from.address != to.address {
                        updates.bindings.shift_remove(&from.address);
                        added_here.remove(&from.address);
                    }
                    updates.bindings.insert(to.address, to.id);
                    added_here.insert(to.address);
                } else {
                    updates.corrections.push(change);
                }
            }
        }
        Ok(updates)
    }
}

fn validate(transition: &Transition, set: &AddressChangeSet) -> Result<(), Error> {
    let malformed = |reason: String| Error::MalformedChangeSet {
        transition: transition.clone(),
        reason,
    };
    let check_pair = |pair: &AddressPair| {
        if !is_id_address(&pair.id) {
            return Err(malformed(format!("{} is not an ID address", pair.id)));
        }
        if is_id_address(&pair.address) && pair.address != pair.id {
            return Err(malformed(format!(
                "{} cannot be bound to another ID address {}",
                pair.id, pair.address
            )));
        }
        Ok(())
    };

    let mut seen: IndexMap<&Address, &Address> = IndexMap::new();
    for pair in &set.added {
        check_pair(pair)?;
        if let Some(previous) = seen.insert(&pair.address, &pair.id)
            && previous != &pair.id
        {
            return Err(malformed(format!(
                "{} added with two identifiers {previous} and {}",
                pair.address, pair.id
            )));
        }
    }
    for change in &set.modified {
        check_pair(&change.from)?;
        check_pair(&change.to)?;
    }
    Ok(())
}

/// Applies corrections then new bindings in a single transaction.
pub async fn store_actor_addresses(db: &SqlitePool, updates: &AddressUpdates) -> Result<(), Error> {
    let start = Instant::now();

    let mut tx = db.begin().await?;

    for AddressChange { from, to } in &updates.corrections {
        let result = sqlx::query(
            "UPDATE id_address_map SET id = ?, address = ? WHERE id = ? AND address = ?",
        )
        .bind(to.id.to_string())
        .bind(to.address.to_string())
        .bind(from.id.to_string())
        .bind(from.address.to_string())
        .execute(tx.as_mut())
        .await?;
        if result.rows_affected() == 0 {
            tracing::debug!(
                "No binding {} <-> {} to correct, keeping the map as is",
                from.id,
                from.address
            );
        }
    }

    sqlx::query("DROP TABLE IF EXISTS temp.iam")
        .execute(tx.as_mut())
        .await?;
    sqlx::query("CREATE TEMP TABLE iam (id TEXT NOT NULL, address TEXT NOT NULL)")
        .execute(tx.as_mut())
        .await?;
    for (address, id) in &updates.bindings {
        sqlx::query("INSERT INTO temp.iam (id, address) VALUES (?, ?)")
            .bind(id.to_string())
            .bind(address.to_string())
            .execute(tx.as_mut())
            .await?;
    }
    // `WHERE true` keeps the upsert clause from being parsed as a join constraint. Only an
    // already bound identifier is skipped; an address bound to another identifier aborts.
    let inserted = sqlx::query(
        "INSERT INTO id_address_map (id, address) SELECT id, address FROM temp.iam WHERE true ORDER BY rowid ON CONFLICT (id) DO NOTHING",
    )
    .execute(tx.as_mut())
    .await?
    .rows_affected();
    sqlx::query("DROP TABLE temp.iam")
        .execute(tx.as_mut())
        .await?;

    tx.commit().await?;

    tracing::debug!(
        "Stored Actor Addresses: {} corrections, {inserted} new bindings in {}",
        updates.corrections.len(),
        humantime::format_duration(start.elapsed())
    );
    Ok(())
}

/// Looks up the ID address currently bound to `address`.
pub async fn resolve_id(db: &SqlitePool, address: &Address) -> Result<Option<Address>, Error> {
    let id: Option<String> = sqlx::query_scalar("SELECT id FROM id_address_map WHERE address = ?")
        .bind(address.to_string())
        .fetch_optional(db)
        .await?;
    id.map(|id| parse_address("id", id)).transpose()
}

/// Looks up the robust address currently bound to the ID address `id`.
pub async fn resolve_address(db: &SqlitePool, id: &Address) -> Result<Option<Address>, Error> {
    let address: Option<String> =
        sqlx::query_scalar("SELECT address FROM id_address_map WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(db)
            .await?;
    address.map(|a| parse_address("address", a)).transpose()
}

/// Dumps the whole address map, ordered by address.
pub async fn address_map(db: &SqlitePool) -> Result<Vec<AddressPair>, Error> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT id, address FROM id_address_map ORDER BY address")
            .fetch_all(db)
            .await?;
    rows.into_iter()
        .map(|(id, address)| {
            Ok(AddressPair {
                id: parse_address("id", id)?,
                address: parse_address("address", address)?,
            })
        })
        .collect()
}

pub(super) fn parse_address(column: &'static str, value: String) -> Result<Address, Error> {
    value
        .parse()
        .map_err(|_| Error::InvalidRow { column, value })
}

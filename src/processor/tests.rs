// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;

use super::*;
use crate::test_utils::{cid_of, robust_address, temp_db};
use fvm_shared4::econ::TokenAmount;
use pretty_assertions::assert_eq;

type Sources = BTreeMap<Transition, AddressChangeSet>;

fn transition(epoch: i64) -> Transition {
    Transition {
        parent: TipsetKey::from(vec![cid_of(&format!("block-{}", epoch - 1))]),
        tipset: TipsetKey::from(vec![cid_of(&format!("block-{epoch}"))]),
    }
}

fn info(code: &str, id: Address, epoch: i64) -> ActorInfo {
    ActorInfo {
        addr: id,
        act: ActorState {
            code: cid_of(code),
            head: cid_of(&format!("{code}-{id}-{epoch}")),
            nonce: epoch as u64,
            balance: TokenAmount::from_atto(epoch * 10),
        },
        state_root: cid_of(&format!("root-{epoch}")),
        state: format!("state of {id} at {epoch}").into_bytes(),
        transition: transition(epoch),
    }
}

fn diff(epoch: i64, infos: Vec<ActorInfo>) -> Arc<ActorChanges> {
    let mut changes = ActorChanges::new();
    for info in infos {
        changes
            .entry(info.act.code)
            .or_default()
            .entry(transition(epoch).tipset)
            .or_default()
            .push(info);
    }
    Arc::new(changes)
}

fn pair(id: u64, address: Address) -> AddressPair {
    AddressPair {
        id: Address::new_id(id),
        address,
    }
}

fn added(epoch: i64, pairs: Vec<AddressPair>) -> Sources {
    BTreeMap::from([(
        transition(epoch),
        AddressChangeSet {
            added: pairs,
            modified: vec![],
        },
    )])
}

async fn processor() -> (tempfile::TempDir, Processor) {
    let (dir, db) = temp_db().await;
    let processor = Processor::new(db);
    processor.setup().await.unwrap();
    (dir, processor)
}

async fn count(p: &Processor, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT count(*) FROM {table}"))
        .fetch_one(p.db())
        .await
        .unwrap()
}

type ActorRow = (String, String, String, i64, String, String);

async fn dump(p: &Processor) -> (Vec<(String, String)>, Vec<ActorRow>, Vec<(String, String, Vec<u8>)>) {
    let map: Vec<(String, String)> =
        sqlx::query_as("SELECT id, address FROM id_address_map ORDER BY id")
            .fetch_all(p.db())
            .await
            .unwrap();
    let actors: Vec<ActorRow> = sqlx::query_as(
        "SELECT id, code, head, nonce, balance, stateroot FROM actors ORDER BY id, head",
    )
    .fetch_all(p.db())
    .await
    .unwrap();
    let states: Vec<(String, String, Vec<u8>)> =
        sqlx::query_as("SELECT head, code, state FROM actor_states ORDER BY head, code")
            .fetch_all(p.db())
            .await
            .unwrap();
    (map, actors, states)
}

async fn assert_bijection(p: &Processor) {
    let addresses_with_two_ids: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM (SELECT address FROM id_address_map GROUP BY address HAVING count(DISTINCT id) > 1)",
    )
    .fetch_one(p.db())
    .await
    .unwrap();
    let ids_with_two_addresses: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM (SELECT id FROM id_address_map GROUP BY id HAVING count(DISTINCT address) > 1)",
    )
    .fetch_one(p.db())
    .await
    .unwrap();
    assert_eq!((addresses_with_two_ids, ids_with_two_addresses), (0, 0));
}

#[tokio::test]
async fn well_known_actors_resolve_before_any_diff() {
    let (_dir, p) = processor().await;
    for addr in schema::WELL_KNOWN_ACTORS {
        assert_eq!(p.resolve_id(&addr).await.unwrap(), Some(addr));
        assert_eq!(p.resolve_address(&addr).await.unwrap(), Some(addr));
    }
    assert_eq!(
        count(&p, "id_address_map").await,
        schema::WELL_KNOWN_ACTORS.len() as i64
    );
}

#[tokio::test]
async fn cycle_is_idempotent() {
    let (_dir, p) = processor().await;
    let x = robust_address(1);
    let changes = diff(
        10,
        vec![
            info("init", Address::new_id(1), 10),
            info("account", Address::new_id(1000), 10),
        ],
    );
    let sources = added(10, vec![pair(1000, x)]);

    let first = p
        .handle_common_actors_changes(changes.clone(), &sources)
        .await
        .unwrap();
    assert_eq!(
        first,
        CycleSummary {
            new_heads: 2,
            new_states: 2
        }
    );
    let before = dump(&p).await;

    let second = p
        .handle_common_actors_changes(changes, &sources)
        .await
        .unwrap();
    assert_eq!(second, CycleSummary::default());
    assert_eq!(dump(&p).await, before);
    assert_eq!(p.resolve_id(&x).await.unwrap(), Some(Address::new_id(1000)));
}

#[tokio::test]
async fn reorg_rewrites_the_binding() {
    let (_dir, p) = processor().await;
    let x = robust_address(1);
    p.handle_common_actors_changes(
        diff(10, vec![info("init", Address::new_id(1), 10)]),
        &added(10, vec![pair(1000, x)]),
    )
    .await
    .unwrap();

    // The competing history assigned `x` another identifier, and the cycle already observes the
    // actor under its new identifier.
    let sources = BTreeMap::from([(
        transition(11),
        AddressChangeSet {
            added: vec![],
            modified: vec![AddressChange {
                from: pair(1000, x),
                to: pair(1001, x),
            }],
        },
    )]);
    p.handle_common_actors_changes(
        diff(
            11,
            vec![
                info("init", Address::new_id(1), 11),
                info("account", Address::new_id(1001), 11),
            ],
        ),
        &sources,
    )
    .await
    .unwrap();

    assert_eq!(p.resolve_id(&x).await.unwrap(), Some(Address::new_id(1001)));
    assert_eq!(
        p.resolve_address(&Address::new_id(1000)).await.unwrap(),
        None
    );
    let bound: i64 = sqlx::query_scalar("SELECT count(*) FROM id_address_map WHERE address = ?")
        .bind(x.to_string())
        .fetch_one(p.db())
        .await
        .unwrap();
    assert_eq!(bound, 1);
    assert_bijection(&p).await;
}

#[tokio::test]
async fn first_binding_of_an_identifier_wins() {
    let (_dir, p) = processor().await;
    let (x, y) = (robust_address(1), robust_address(2));
    p.handle_common_actors_changes(
        diff(10, vec![info("init", Address::new_id(1), 10)]),
        &added(10, vec![pair(1000, x)]),
    )
    .await
    .unwrap();
    p.handle_common_actors_changes(
        diff(11, vec![info("init", Address::new_id(1), 11)]),
        &added(11, vec![pair(1000, y)]),
    )
    .await
    .unwrap();

    assert_eq!(p.resolve_id(&x).await.unwrap(), Some(Address::new_id(1000)));
    assert_eq!(p.resolve_id(&y).await.unwrap(), None);
    assert_bijection(&p).await;
}

#[tokio::test]
async fn address_bound_to_another_identifier_fails_the_cycle() {
    let (_dir, p) = processor().await;
    let (x, z) = (robust_address(1), robust_address(3));
    p.handle_common_actors_changes(
        diff(10, vec![info("init", Address::new_id(1), 10)]),
        &added(10, vec![pair(1000, x)]),
    )
    .await
    .unwrap();
    let before = dump(&p).await;

    let err = p
        .handle_common_actors_changes(
            diff(11, vec![info("init", Address::new_id(1), 11)]),
            &added(11, vec![pair(1003, z), pair(1002, x)]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)), "{err}");

    assert_eq!(dump(&p).await, before);
    assert_eq!(p.resolve_id(&z).await.unwrap(), None);
    assert_eq!(
        p.resolve_address(&Address::new_id(1002)).await.unwrap(),
        None
    );
    assert_bijection(&p).await;
}

#[tokio::test]
async fn correction_within_one_cycle_keeps_the_map_canonical() {
    let (_dir, p) = processor().await;
    let x = robust_address(1);
    // the binding is added at whichever transition is visited first
    let (first, second) = if transition(10) < transition(11) {
        (10, 11)
    } else {
        (11, 10)
    };
    let mut changes = ActorChanges::new();
    for info in [
        info("init", Address::new_id(1), first),
        info("init", Address::new_id(1), second),
        info("account", Address::new_id(1001), second),
    ] {
        changes
            .entry(info.act.code)
            .or_default()
            .entry(info.transition.tipset.clone())
            .or_default()
            .push(info);
    }
    let sources = BTreeMap::from([
        (
            transition(first),
            AddressChangeSet {
                added: vec![pair(1000, x)],
                modified: vec![],
            },
        ),
        (
            transition(second),
            AddressChangeSet {
                added: vec![],
                modified: vec![AddressChange {
                    from: pair(1000, x),
                    to: pair(1001, x),
                }],
            },
        ),
    ]);

    p.handle_common_actors_changes(Arc::new(changes), &sources)
        .await
        .unwrap();

    assert_eq!(p.resolve_id(&x).await.unwrap(), Some(Address::new_id(1001)));
    assert_eq!(
        p.resolve_address(&Address::new_id(1000)).await.unwrap(),
        None
    );
    assert_bijection(&p).await;
}

#[tokio::test]
async fn observation_code_must_match_its_key() {
    let (_dir, p) = processor().await;
    let before = dump(&p).await;
    let mut mislabelled = info("init", Address::new_id(1), 10);
    mislabelled.act.code = cid_of("account");
    let mut changes = ActorChanges::new();
    changes
        .entry(cid_of("init"))
        .or_default()
        .entry(transition(10).tipset)
        .or_default()
        .push(mislabelled);

    let err = p
        .handle_common_actors_changes(Arc::new(changes), &Sources::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CodeMismatch { .. }), "{err}");
    assert_eq!(dump(&p).await, before);
}

#[tokio::test]
async fn failed_address_resolution_stores_nothing() {
    let (_dir, p) = processor().await;
    let (x, y, z) = (robust_address(1), robust_address(2), robust_address(3));
    p.handle_common_actors_changes(
        diff(10, vec![info("init", Address::new_id(1), 10)]),
        &added(10, vec![pair(1000, x), pair(1001, y)]),
    )
    .await
    .unwrap();
    let before = dump(&p).await;

    // Moving `x` onto an identifier that is still bound to `y` would break the bijection.
    let sources = BTreeMap::from([(
        transition(11),
        AddressChangeSet {
            added: vec![pair(1002, z)],
            modified: vec![AddressChange {
                from: pair(1000, x),
                to: pair(1001, x),
            }],
        },
    )]);
    let err = p
        .handle_common_actors_changes(
            diff(
                11,
                vec![
                    info("init", Address::new_id(1), 11),
                    info("account", Address::new_id(1000), 11),
                ],
            ),
            &sources,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Database(_)), "{err}");

    assert_eq!(dump(&p).await, before);
    assert_eq!(p.resolve_id(&z).await.unwrap(), None);
    assert_bijection(&p).await;
}

#[tokio::test]
async fn malformed_change_set_fails_the_cycle() {
    let (_dir, p) = processor().await;
    let before = dump(&p).await;
    let err = p
        .handle_common_actors_changes(
            diff(10, vec![info("init", Address::new_id(1), 10)]),
            &added(10, vec![AddressPair {
                id: robust_address(1),
                address: robust_address(2),
            }]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MalformedChangeSet { .. }), "{err}");
    assert_eq!(dump(&p).await, before);
}

#[tokio::test]
async fn state_failure_fails_the_cycle() {
    let (_dir, p) = processor().await;
    sqlx::query(
        "CREATE TRIGGER reject_states BEFORE INSERT ON actor_states BEGIN SELECT RAISE(ABORT, 'rejected'); END",
    )
    .execute(p.db())
    .await
    .unwrap();

    let changes = diff(
        10,
        vec![
            info("init", Address::new_id(1), 10),
            info("reward", Address::new_id(2), 10),
        ],
    );
    let err = p
        .handle_common_actors_changes(changes.clone(), &Sources::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("rejected"), "{err}");

    assert_eq!(count(&p, "actor_states").await, 0);
    // The head store either committed its whole batch before the failure or was rolled back.
    let heads = count(&p, "actors").await;
    assert!(heads == 0 || heads == 2, "partial head batch: {heads}");

    // Once the store recovers, retrying the cycle completes it.
    sqlx::query("DROP TRIGGER reject_states")
        .execute(p.db())
        .await
        .unwrap();
    let summary = p
        .handle_common_actors_changes(changes, &Sources::new())
        .await
        .unwrap();
    assert_eq!(summary.new_states, 2);
    assert_eq!(count(&p, "actors").await, 2);
}

#[tokio::test]
async fn tips_follow_ingested_cycles() {
    let (_dir, p) = processor().await;
    let id = Address::new_id(1000);
    let sources = added(10, vec![pair(1000, robust_address(1))]);
    p.handle_common_actors_changes(diff(10, vec![info("account", id, 10)]), &sources)
        .await
        .unwrap();
    p.handle_common_actors_changes(diff(20, vec![info("account", id, 20)]), &sources)
        .await
        .unwrap();
    for epoch in [10, 20] {
        tips::record_state_height(
            p.db(),
            &transition(epoch).tipset,
            epoch,
            &cid_of(&format!("root-{epoch}")),
        )
        .await
        .unwrap();
    }

    assert!(p.actor_tips(5).await.unwrap().is_empty());
    let tips = p.actor_tips(15).await.unwrap();
    assert_eq!(tips.len(), 1);
    assert_eq!(tips[0].id, id);
    assert_eq!(tips[0].nonce, 10);
    let tips = p.actor_tips(25).await.unwrap();
    assert_eq!(tips.len(), 1);
    assert_eq!(tips[0].nonce, 20);
    assert_eq!(tips[0].balance, TokenAmount::from_atto(200));
}

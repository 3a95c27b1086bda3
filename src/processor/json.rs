// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! JSON form of one ingestion cycle, as exported by the state-diff evaluator.
//!
//! ```json
//! {
//!   "Actors": [{ "Code": "bafk..", "ParentTipset": "bafy..", "Tipset": "bafy..,bafy..",
//!                "Address": "f01000", "Head": "bafy..", "Nonce": 0, "Balance": "1000",
//!                "StateRoot": "bafy..", "State": "gA==" }],
//!   "AddressChanges": [{ "ParentTipset": "..", "Tipset": "..",
//!                        "Added": [{ "Id": "f01000", "Address": "f3.." }],
//!                        "Modified": [{ "From": {..}, "To": {..} }] }],
//!   "StateHeights": [{ "Tipset": "..", "Height": 10, "ParentStateRoot": ".." }]
//! }
//! ```

use std::collections::BTreeMap;

use cid::Cid;
use fvm_shared4::address::Address;
use fvm_shared4::bigint::BigInt;
use fvm_shared4::clock::ChainEpoch;
use fvm_shared4::econ::TokenAmount;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, base64::Base64, serde_as};

use super::types::{
    ActorChanges, ActorInfo, ActorState, ActorTip, AddressChange, AddressChangeSet, AddressPair,
    TipsetKey, Transition,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct IngestBundle {
    pub actors: Vec<ActorJson>,
    pub address_changes: Vec<AddressChangesJson>,
    pub state_heights: Vec<StateHeightJson>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActorJson {
    #[serde_as(as = "DisplayFromStr")]
    pub code: Cid,
    #[serde_as(as = "DisplayFromStr")]
    pub parent_tipset: TipsetKey,
    #[serde_as(as = "DisplayFromStr")]
    pub tipset: TipsetKey,
    #[serde_as(as = "DisplayFromStr")]
    pub address: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub head: Cid,
    pub nonce: u64,
    /// attoFIL
    #[serde_as(as = "DisplayFromStr")]
    pub balance: BigInt,
    #[serde_as(as = "DisplayFromStr")]
    pub state_root: Cid,
    #[serde_as(as = "Base64")]
    pub state: Vec<u8>,
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressPairJson {
    #[serde_as(as = "DisplayFromStr")]
    pub id: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub address: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressChangeJson {
    pub from: AddressPairJson,
    pub to: AddressPairJson,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressChangesJson {
    #[serde_as(as = "DisplayFromStr")]
    pub parent_tipset: TipsetKey,
    #[serde_as(as = "DisplayFromStr")]
    pub tipset: TipsetKey,
    #[serde(default)]
    pub added: Vec<AddressPairJson>,
    #[serde(default)]
    pub modified: Vec<AddressChangeJson>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateHeightJson {
    #[serde_as(as = "DisplayFromStr")]
    pub tipset: TipsetKey,
    pub height: ChainEpoch,
    #[serde_as(as = "DisplayFromStr")]
    pub parent_state_root: Cid,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActorTipJson {
    #[serde_as(as = "DisplayFromStr")]
    pub id: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub code: Cid,
    #[serde_as(as = "DisplayFromStr")]
    pub head: Cid,
    pub nonce: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub balance: BigInt,
    #[serde_as(as = "DisplayFromStr")]
    pub state_root: Cid,
    pub height: ChainEpoch,
    #[serde_as(as = "DisplayFromStr")]
    pub parent_state_root: Cid,
}

impl From<&ActorTip> for ActorTipJson {
    fn from(tip: &ActorTip) -> Self {
        Self {
            id: tip.id,
            code: tip.code,
            head: tip.head,
            nonce: tip.nonce,
            balance: tip.balance.atto().clone(),
            state_root: tip.state_root,
            height: tip.height,
            parent_state_root: tip.parent_state_root,
        }
    }
}

impl From<AddressPairJson> for AddressPair {
    fn from(AddressPairJson { id, address }: AddressPairJson) -> Self {
        Self { id, address }
    }
}

impl IngestBundle {
    /// Groups the flat actor list by code and tipset, keeping the order within each tipset.
    pub fn actor_changes(&self) -> ActorChanges {
        let mut changes = ActorChanges::new();
        for actor in &self.actors {
            changes
                .entry(actor.code)
                .or_default()
                .entry(actor.tipset.clone())
                .or_default()
                .push(ActorInfo {
                    addr: actor.address,
                    act: ActorState {
                        code: actor.code,
                        head: actor.head,
                        nonce: actor.nonce,
                        balance: TokenAmount::from_atto(actor.balance.clone()),
                    },
                    state_root: actor.state_root,
                    state: actor.state.clone(),
                    transition: Transition {
                        parent: actor.parent_tipset.clone(),
                        tipset: actor.tipset.clone(),
                    },
                });
        }
        changes
    }

    /// Change sets keyed by transition. Sets listed twice for the same transition are merged.
    pub fn address_changes(&self) -> BTreeMap<Transition, AddressChangeSet> {
        let mut sets: BTreeMap<Transition, AddressChangeSet> = BTreeMap::new();
        for changes in &self.address_changes {
            let set = sets
                .entry(Transition {
                    parent: changes.parent_tipset.clone(),
                    tipset: changes.tipset.clone(),
                })
                .or_default();
            set.added
                .extend(changes.added.iter().copied().map(AddressPair::from));
            set.modified
                .extend(changes.modified.iter().map(|m| AddressChange {
                    from: m.from.into(),
                    to: m.to.into(),
                }));
        }
        sets
    }
}

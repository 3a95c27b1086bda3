// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use cid::Cid;
use fvm_shared4::address::{Address, Protocol};
use fvm_shared4::clock::ChainEpoch;
use fvm_shared4::econ::TokenAmount;
use itertools::Itertools as _;

/// The set of block CIDs forming a tipset, in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TipsetKey(Vec<Cid>);

impl TipsetKey {
    pub fn cids(&self) -> &[Cid] {
        &self.0
    }
}

impl From<Vec<Cid>> for TipsetKey {
    fn from(cids: Vec<Cid>) -> Self {
        Self(cids)
    }
}

impl fmt::Display for TipsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(","))
    }
}

impl FromStr for TipsetKey {
    type Err = cid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .filter(|it| !it.is_empty())
            .map(Cid::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// A `(parent tipset, tipset)` state transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transition {
    pub parent: TipsetKey,
    pub tipset: TipsetKey,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] -> [{}]", self.parent, self.tipset)
    }
}

/// Actor metadata as found in the state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorState {
    pub code: Cid,
    pub head: Cid,
    pub nonce: u64,
    pub balance: TokenAmount,
}

/// One observed actor at one tipset, as produced by the state-diff evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorInfo {
    /// ID address of the actor.
    pub addr: Address,
    pub act: ActorState,
    pub state_root: Cid,
    /// Serialized actor state, stored verbatim.
    pub state: Vec<u8>,
    pub transition: Transition,
}

/// Observations of a single actor code, per tipset.
pub type ActorTips = BTreeMap<TipsetKey, Vec<ActorInfo>>;

/// Observations for one ingestion cycle keyed by actor code.
///
/// Iteration order is code, then tipset key, then position in the list, which makes every pass
/// over the diff deterministic.
pub type ActorChanges = BTreeMap<Cid, ActorTips>;

/// Iterates all observations of `changes` in canonical order, paired with their actor code.
pub fn observations(changes: &ActorChanges) -> impl Iterator<Item = (&Cid, &ActorInfo)> {
    changes
        .iter()
        .flat_map(|(code, tips)| tips.values().flatten().map(move |info| (code, info)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressPair {
    pub id: Address,
    pub address: Address,
}

/// A binding that was valid under one chain history and is replaced under another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressChange {
    pub from: AddressPair,
    pub to: AddressPair,
}

/// Changes to the init actor's address map across one tipset transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressChangeSet {
    pub added: Vec<AddressPair>,
    pub modified: Vec<AddressChange>,
}

/// Supplies the address-map changes computed by the state-diff predicate evaluator.
pub trait AddressChangeSource: Send + Sync {
    /// Returns `None` when the address map did not change across `transition`.
    fn address_changes(&self, transition: &Transition)
    -> anyhow::Result<Option<AddressChangeSet>>;
}

impl AddressChangeSource for BTreeMap<Transition, AddressChangeSet> {
    fn address_changes(
        &self,
        transition: &Transition,
    ) -> anyhow::Result<Option<AddressChangeSet>> {
        Ok(self.get(transition).cloned())
    }
}

/// The most recent observation of an actor below a given epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorTip {
    pub id: Address,
    pub code: Cid,
    pub head: Cid,
    pub nonce: u64,
    pub balance: TokenAmount,
    pub state_root: Cid,
    pub height: ChainEpoch,
    pub parent_state_root: Cid,
}

pub fn is_id_address(addr: &Address) -> bool {
    addr.protocol() == Protocol::ID
}

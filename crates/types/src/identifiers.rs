//! Identifier newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ledger entities are numbered from one shared counter and displayed in
/// `shard.realm.num` form; this deployment has a single shard and realm.
macro_rules! entity_id {
    ($($(#[$doc:meta])* $name:ident;)+) => {$(
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0.0.{}", self.0)
            }
        }
    )+};
}

entity_id! {
    /// Ledger account.
    AccountId;
    /// Pending scheduled transaction.
    ScheduleId;
    FileId;
    TopicId;
    ContractId;
}

/// Consensus node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// Consensus round. Rounds are handled in strictly increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundNumber(pub u64);

impl RoundNumber {
    /// State before any round was handled.
    pub const GENESIS: Self = RoundNumber(0);

    pub fn next(self) -> Self {
        RoundNumber(self.0 + 1)
    }
}

impl fmt::Display for RoundNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {}", self.0)
    }
}

/// Stake weight a node carries when reporting round hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VotePower(pub u64);

impl VotePower {
    /// Zero weight is raised to one.
    pub fn new(power: u64) -> Self {
        VotePower(power.max(1))
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Strictly more than two thirds of `total`.
    pub fn has_quorum(voted: u64, total: u64) -> bool {
        u128::from(voted) * 3 > u128::from(total) * 2
    }
}

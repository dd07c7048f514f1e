//! Fee schedule.

use concord_types::{AccountId, Fees, NodeId, ResourceUsage, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prices for the resources a transaction declares.
///
/// All arithmetic is integer and saturating so fee computation is total and
/// identical on every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Flat node fee.
    pub node_base: u64,
    /// Node fee per serialized byte.
    pub node_per_byte: u64,
    /// Flat network fee.
    pub network_base: u64,
    /// Network fee per verified signature.
    pub network_per_signature: u64,
    /// Flat service fee.
    pub service_base: u64,
    /// Service fee per unit of gas.
    pub service_per_gas: u64,
    /// Service fee per byte of new state.
    pub service_per_storage_byte: u64,
    /// Fee charged to the payer for a duplicate submission.
    pub duplicate_fee: u64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            node_base: 1,
            node_per_byte: 0,
            network_base: 2,
            network_per_signature: 1,
            service_base: 5,
            service_per_gas: 0,
            service_per_storage_byte: 0,
            duplicate_fee: 0,
        }
    }
}

impl FeeSchedule {
    /// A schedule that charges nothing.
    pub fn free() -> Self {
        Self {
            node_base: 0,
            node_per_byte: 0,
            network_base: 0,
            network_per_signature: 0,
            service_base: 0,
            service_per_gas: 0,
            service_per_storage_byte: 0,
            duplicate_fee: 0,
        }
    }

    /// Fees for `usage`.
    pub fn compute(&self, usage: &ResourceUsage) -> Fees {
        Fees {
            node: self
                .node_base
                .saturating_add(self.node_per_byte.saturating_mul(usage.bytes)),
            network: self
                .network_base
                .saturating_add(self.network_per_signature.saturating_mul(usage.signatures)),
            service: self
                .service_base
                .saturating_add(self.service_per_gas.saturating_mul(usage.gas))
                .saturating_add(
                    self.service_per_storage_byte
                        .saturating_mul(usage.storage_bytes),
                ),
        }
    }

    /// Fee for handling a duplicate.
    pub fn duplicate(&self) -> Fees {
        Fees {
            network: self.duplicate_fee,
            ..Fees::ZERO
        }
    }
}

/// Usage of `tx`: what its handler declares plus the transaction's own
/// size and signature count.
pub fn transaction_usage(tx: &Transaction, declared: ResourceUsage) -> ResourceUsage {
    ResourceUsage {
        bytes: tx.encoded_len() as u64,
        signatures: tx.signatures().len() as u64,
        ..declared
    }
}

/// Accounts fees flow between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemAccounts {
    /// Account credited with every collected fee.
    pub funding: AccountId,
    /// Account of each consensus node, charged for due-diligence failures.
    pub node_accounts: BTreeMap<NodeId, AccountId>,
}

impl Default for SystemAccounts {
    fn default() -> Self {
        Self {
            funding: AccountId(98),
            node_accounts: BTreeMap::new(),
        }
    }
}

impl SystemAccounts {
    /// Lowest account number assigned to nodes without an explicit mapping.
    pub const FIRST_NODE_ACCOUNT: u64 = 3;

    /// Account of `node`. Unmapped nodes get `FIRST_NODE_ACCOUNT + node`.
    pub fn node_account(&self, node: NodeId) -> AccountId {
        self.node_accounts
            .get(&node)
            .copied()
            .unwrap_or(AccountId(Self::FIRST_NODE_ACCOUNT + node.0))
    }
}

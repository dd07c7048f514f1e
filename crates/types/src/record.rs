//! Transaction records and round summaries.

use crate::{
    AccountId, Hash, ResponseCode, RoundNumber, ScheduleId, StateChange, Timestamp, TransactionId,
};
use serde::{Deserialize, Serialize};

/// Resources a transaction consumed, as declared by its handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Serialized transaction size.
    pub bytes: u64,
    /// Signatures verified.
    pub signatures: u64,
    /// Execution gas.
    pub gas: u64,
    /// Bytes of state added.
    pub storage_bytes: u64,
}

/// Fee breakdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fees {
    /// Paid to the submitting node.
    pub node: u64,
    /// Paid to the network for consensus and storage of the record.
    pub network: u64,
    /// Paid for the service-specific work.
    pub service: u64,
}

impl Fees {
    /// No fee.
    pub const ZERO: Fees = Fees {
        node: 0,
        network: 0,
        service: 0,
    };

    /// Sum of all components.
    pub fn total(&self) -> u64 {
        self.node
            .saturating_add(self.network)
            .saturating_add(self.service)
    }

    /// Only the node and network components; what a rejected transaction pays.
    pub fn minimal(&self) -> Fees {
        Fees {
            service: 0,
            ..*self
        }
    }
}

/// Fees actually charged and the account they were charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCharge {
    /// Account debited.
    pub charged_to: AccountId,
    /// Amounts debited.
    pub fees: Fees,
}

impl FeeCharge {
    /// A charge of nothing.
    pub fn none(account: AccountId) -> Self {
        Self {
            charged_to: account,
            fees: Fees::ZERO,
        }
    }
}

/// Outcome of handling one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction identity.
    pub transaction_id: TransactionId,
    /// Consensus timestamp.
    pub consensus_time: Timestamp,
    /// Final status.
    pub status: ResponseCode,
    /// Declared resource usage.
    pub usage: ResourceUsage,
    /// Fees charged.
    pub fee: FeeCharge,
    /// Net state changes in key order.
    pub state_changes: Vec<StateChange>,
    /// Schedule the transaction created, signed or was triggered by.
    pub schedule: Option<ScheduleId>,
    /// Records of triggered child transactions, in execution order.
    pub children: Vec<TransactionRecord>,
}

impl TransactionRecord {
    /// A record with no usage, fee or state changes.
    pub fn new(
        transaction_id: TransactionId,
        consensus_time: Timestamp,
        status: ResponseCode,
        charged_to: AccountId,
    ) -> Self {
        Self {
            transaction_id,
            consensus_time,
            status,
            usage: ResourceUsage::default(),
            fee: FeeCharge::none(charged_to),
            state_changes: Vec::new(),
            schedule: None,
            children: Vec::new(),
        }
    }

    /// Canonical encoding used for hashing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("TransactionRecord serialization should never fail")
    }

    /// Leaf hash for Merkle inclusion.
    pub fn hash(&self) -> Hash {
        Hash::from_bytes(&self.canonical_bytes())
    }
}

/// Finalized summary of one round of the record stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Round number.
    pub round: RoundNumber,
    /// Hash of the previous round's summary.
    pub previous_hash: Hash,
    /// Merkle root over the round's record hashes.
    pub records_root: Hash,
    /// Running hash after the round's last record.
    pub running_hash: Hash,
    /// Number of top-level records.
    pub record_count: u64,
    /// Consensus time of the first record, if any.
    pub first_consensus_time: Option<Timestamp>,
    /// Consensus time of the last record, if any.
    pub last_consensus_time: Option<Timestamp>,
    /// Hash binding all of the above.
    pub hash: Hash,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: ResponseCode) -> TransactionRecord {
        TransactionRecord::new(
            TransactionId::new(AccountId(1001), Timestamp::from_secs(1)),
            Timestamp::from_secs(2),
            status,
            AccountId(1001),
        )
    }

    #[test]
    fn test_record_hash_binds_status() {
        assert_ne!(
            record(ResponseCode::Success).hash(),
            record(ResponseCode::InvalidSignature).hash()
        );
    }

    #[test]
    fn test_minimal_fee_drops_service_component() {
        let fees = Fees {
            node: 1,
            network: 2,
            service: 3,
        };
        assert_eq!(fees.total(), 6);
        assert_eq!(fees.minimal().total(), 3);
    }
}

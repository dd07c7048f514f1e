//! Output of the pre-handle stage.

use crate::{StateValue, Verifications};
use concord_types::{AccountId, Hash, Partition, PublicKey, ResponseCode, StateKey, Transaction};
use std::collections::{BTreeMap, BTreeSet};

/// Provisional verdict of pre-handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreHandleStatus {
    /// Nothing found wrong so far.
    SoFarSoGood,
    /// The submitting node should have caught this at ingest; the node pays.
    NodeDueDiligenceFailure(ResponseCode),
    /// The transaction is invalid; the payer pays where it can.
    PreHandleFailure(ResponseCode),
}

/// Speculative validation result for one transaction against one snapshot.
///
/// Pure data: it can be discarded and recomputed at any time.
#[derive(Debug, Clone)]
pub struct PreHandleResult {
    /// Hash of the full transaction.
    pub tx_hash: Hash,
    /// Snapshot version the result was computed against.
    pub snapshot_version: u64,
    /// Hash of the bytes the signatures cover.
    pub signed_bytes_hash: Hash,
    /// Provisional status.
    pub status: PreHandleStatus,
    /// Fee payer.
    pub payer: AccountId,
    /// Payer key, if the payer resolved.
    pub payer_key: Option<PublicKey>,
    /// Non-payer keys the body requires.
    pub required_keys: BTreeSet<PublicKey>,
    /// Cryptographic verification per attached key.
    pub verifications: Verifications,
    /// Every state read made while computing the result, with the value seen.
    pub reads: BTreeMap<StateKey, Option<StateValue>>,
    /// Partitions enumerated while computing the result.
    pub scanned_partitions: BTreeSet<Partition>,
}

impl PreHandleResult {
    /// Whether the payer's signature verified.
    pub fn payer_signature_valid(&self) -> bool {
        self.payer_key
            .is_some_and(|key| self.verifications.get(&key).copied().unwrap_or(false))
    }

    /// First required key (in key order) without a valid signature.
    pub fn first_unverified_key(&self) -> Option<PublicKey> {
        self.required_keys
            .iter()
            .find(|key| !self.verifications.get(*key).copied().unwrap_or(false))
            .copied()
    }

    /// Every key that verified, required or not.
    pub fn verified_keys(&self) -> BTreeSet<PublicKey> {
        crate::signatures::verified_keys(&self.verifications)
    }

    /// Keys read while computing the result.
    pub fn read_keys(&self) -> impl Iterator<Item = &StateKey> {
        self.reads.keys()
    }

    /// Whether the cryptographic verifications apply to `tx` unchanged.
    pub fn verifications_reusable_for(&self, tx: &Transaction) -> bool {
        self.tx_hash == tx.hash() && self.signed_bytes_hash == tx.signed_bytes_hash()
    }
}

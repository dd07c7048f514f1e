//! Independent verification of the record stream.
//!
//! An auditor holding the previous round's summary hash and running hash can
//! check a round's records against its summary without trusting the node
//! that produced them.

use crate::StreamError;
use concord_types::{
    build_merkle_tree_with_proofs, merkle_root, signing::record_running_hash,
    signing::round_summary_hash, Hash, MerkleProof, RoundSummary, TransactionRecord,
};

/// Recompute a round from its records and compare against `summary`.
pub fn verify_round(
    previous_round_hash: &Hash,
    previous_running_hash: &Hash,
    records: &[TransactionRecord],
    summary: &RoundSummary,
) -> Result<(), StreamError> {
    if summary.previous_hash != *previous_round_hash {
        return Err(StreamError::PreviousHashMismatch {
            expected: *previous_round_hash,
            actual: summary.previous_hash,
        });
    }
    if summary.record_count != records.len() as u64 {
        return Err(StreamError::RecordCountMismatch {
            actual: records.len() as u64,
            recorded: summary.record_count,
        });
    }

    let mut running_hash = *previous_running_hash;
    let mut leaves = Vec::with_capacity(records.len());
    for record in records {
        let bytes = record.canonical_bytes();
        running_hash = record_running_hash(&running_hash, &bytes);
        leaves.push(Hash::from_bytes(&bytes));
    }
    if running_hash != summary.running_hash {
        return Err(StreamError::RunningHashMismatch {
            recomputed: running_hash,
            recorded: summary.running_hash,
        });
    }

    let root = merkle_root(&leaves);
    if root != summary.records_root {
        return Err(StreamError::RecordsRootMismatch {
            recomputed: root,
            recorded: summary.records_root,
        });
    }

    let hash = round_summary_hash(
        summary.round,
        previous_round_hash,
        &running_hash,
        &root,
        summary.record_count,
        summary.first_consensus_time,
        summary.last_consensus_time,
    );
    if hash != summary.hash {
        return Err(StreamError::RoundHashMismatch {
            recomputed: hash,
            recorded: summary.hash,
        });
    }

    let actual = (
        records.first().map(|record| record.consensus_time),
        records.last().map(|record| record.consensus_time),
    );
    let recorded = (summary.first_consensus_time, summary.last_consensus_time);
    if actual != recorded {
        return Err(StreamError::ConsensusTimeMismatch { actual, recorded });
    }
    Ok(())
}

/// Merkle inclusion proofs for a round's records, in record order.
pub fn record_proofs(records: &[TransactionRecord]) -> Vec<MerkleProof> {
    if records.is_empty() {
        return Vec::new();
    }
    let leaves: Vec<Hash> = records.iter().map(TransactionRecord::hash).collect();
    build_merkle_tree_with_proofs(&leaves).1
}

/// Check that `record` is included in the round described by `summary`.
pub fn verify_record_inclusion(
    record: &TransactionRecord,
    proof: &MerkleProof,
    summary: &RoundSummary,
) -> bool {
    proof.verify(&record.hash(), &summary.records_root)
}

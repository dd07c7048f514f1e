//! Domain-separated hashing and signing messages.
//!
//! Every hash or signature that crosses node boundaries is computed over a
//! message that starts with a domain tag, so bytes from one context can never
//! be replayed in another.
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `CONCORD_TX` | Client transaction signatures |
//! | `CONCORD_RECORD` | Running hash over the record stream |
//! | `CONCORD_ROUND` | Round summary hash |
//! | `CONCORD_STATE` | Snapshot state hash |

use crate::{Hash, RoundNumber, Timestamp};

/// Domain tag for client transaction signatures.
///
/// Format: `CONCORD_TX` || canonical transaction data
pub const DOMAIN_TRANSACTION: &[u8] = b"CONCORD_TX";

/// Domain tag for the record running hash.
///
/// Format: `CONCORD_RECORD` || previous running hash || canonical record
pub const DOMAIN_RECORD: &[u8] = b"CONCORD_RECORD";

/// Domain tag for round summaries.
///
/// Format: `CONCORD_ROUND` || round || previous round hash || running hash || records root || count
/// || first consensus time || last consensus time
///
/// A time is a presence byte followed by its nanoseconds, little-endian.
pub const DOMAIN_ROUND_SUMMARY: &[u8] = b"CONCORD_ROUND";

/// Domain tag for snapshot state hashes.
pub const DOMAIN_STATE_HASH: &[u8] = b"CONCORD_STATE";

/// Build the signing message for a transaction from its canonical data bytes.
pub fn transaction_signing_message(data_bytes: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_TRANSACTION.len() + data_bytes.len());
    message.extend_from_slice(DOMAIN_TRANSACTION);
    message.extend_from_slice(data_bytes);
    message
}

/// Fold one record into the running hash.
pub fn record_running_hash(previous: &Hash, record_bytes: &[u8]) -> Hash {
    Hash::from_parts(&[DOMAIN_RECORD, previous.as_bytes(), record_bytes])
}

/// Compute the hash of a round summary.
pub fn round_summary_hash(
    round: RoundNumber,
    previous_round_hash: &Hash,
    running_hash: &Hash,
    records_root: &Hash,
    record_count: u64,
    first_consensus_time: Option<Timestamp>,
    last_consensus_time: Option<Timestamp>,
) -> Hash {
    Hash::from_parts(&[
        DOMAIN_ROUND_SUMMARY,
        &round.0.to_le_bytes(),
        previous_round_hash.as_bytes(),
        running_hash.as_bytes(),
        records_root.as_bytes(),
        &record_count.to_le_bytes(),
        &optional_time_bytes(first_consensus_time),
        &optional_time_bytes(last_consensus_time),
    ])
}

fn optional_time_bytes(time: Option<Timestamp>) -> [u8; 9] {
    let mut bytes = [0u8; 9];
    if let Some(time) = time {
        bytes[0] = 1;
        bytes[1..].copy_from_slice(&time.as_nanos().to_le_bytes());
    }
    bytes
}

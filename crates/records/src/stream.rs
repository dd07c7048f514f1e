//! Record stream builder.

use crate::StreamError;
use concord_types::{
    merkle_root, signing::record_running_hash, signing::round_summary_hash, Hash, RoundNumber,
    RoundSummary, SingletonRecord, Timestamp, TransactionRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Chain heads of the record stream, persisted in state at round end so a
/// node restarted from a snapshot continues the same chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningHashes {
    /// Running hash after the last appended record.
    pub running_hash: Hash,
    /// Hash of the last finalized round summary.
    pub last_round_hash: Hash,
    /// Last finalized round.
    pub last_round: RoundNumber,
}

impl Default for RunningHashes {
    fn default() -> Self {
        Self {
            running_hash: Hash::ZERO,
            last_round_hash: Hash::ZERO,
            last_round: RoundNumber::GENESIS,
        }
    }
}

impl SingletonRecord for RunningHashes {
    const NAME: &'static str = "running_hashes";
}

#[derive(Debug)]
struct OpenRound {
    round: RoundNumber,
    leaves: Vec<Hash>,
    first_consensus_time: Option<Timestamp>,
    last_consensus_time: Option<Timestamp>,
}

/// Append-only builder of the hash-linked record stream.
///
/// Each record folds into the running hash; each round closes with a
/// [`RoundSummary`] whose hash chains to the previous round's summary.
#[derive(Debug, Default)]
pub struct RecordStreamBuilder {
    hashes: RunningHashes,
    open: Option<OpenRound>,
}

impl RecordStreamBuilder {
    /// Builder at the start of the stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder continuing from persisted chain heads.
    pub fn from_hashes(hashes: RunningHashes) -> Self {
        Self { hashes, open: None }
    }

    /// Current chain heads.
    pub fn hashes(&self) -> RunningHashes {
        self.hashes
    }

    /// Running hash after the last appended record.
    pub fn running_hash(&self) -> Hash {
        self.hashes.running_hash
    }

    /// Hash of the last finalized round summary.
    pub fn last_round_hash(&self) -> Hash {
        self.hashes.last_round_hash
    }

    /// Open `round` for appending.
    pub fn begin_round(&mut self, round: RoundNumber) -> Result<(), StreamError> {
        if let Some(open) = &self.open {
            return Err(StreamError::RoundAlreadyOpen(open.round));
        }
        if round <= self.hashes.last_round && self.hashes.last_round != RoundNumber::GENESIS {
            return Err(StreamError::RoundOutOfOrder {
                round,
                last: self.hashes.last_round,
            });
        }
        self.open = Some(OpenRound {
            round,
            leaves: Vec::new(),
            first_consensus_time: None,
            last_consensus_time: None,
        });
        Ok(())
    }

    /// Append a top-level record and return the new running hash.
    pub fn append(&mut self, record: &TransactionRecord) -> Result<Hash, StreamError> {
        let open = self.open.as_mut().ok_or(StreamError::NoOpenRound)?;
        let bytes = record.canonical_bytes();

        self.hashes.running_hash = record_running_hash(&self.hashes.running_hash, &bytes);
        open.leaves.push(Hash::from_bytes(&bytes));
        open.first_consensus_time.get_or_insert(record.consensus_time);
        open.last_consensus_time = Some(record.consensus_time);

        debug!(
            round = open.round.0,
            tx_id = %record.transaction_id,
            status = %record.status,
            running_hash = %self.hashes.running_hash,
            "Appended record"
        );
        Ok(self.hashes.running_hash)
    }

    /// Close the open round and return its summary.
    pub fn finish_round(&mut self) -> Result<RoundSummary, StreamError> {
        let open = self.open.take().ok_or(StreamError::NoOpenRound)?;
        let records_root = merkle_root(&open.leaves);
        let record_count = open.leaves.len() as u64;
        let previous_hash = self.hashes.last_round_hash;
        let hash = round_summary_hash(
            open.round,
            &previous_hash,
            &self.hashes.running_hash,
            &records_root,
            record_count,
            open.first_consensus_time,
            open.last_consensus_time,
        );

        self.hashes.last_round_hash = hash;
        self.hashes.last_round = open.round;

        info!(
            round = open.round.0,
            records = record_count,
            hash = %hash,
            "Finalized round summary"
        );
        Ok(RoundSummary {
            round: open.round,
            previous_hash,
            records_root,
            running_hash: self.hashes.running_hash,
            record_count,
            first_consensus_time: open.first_consensus_time,
            last_consensus_time: open.last_consensus_time,
            hash,
        })
    }
}

//! Record stream errors.

use concord_types::{Hash, RoundNumber, Timestamp};
use thiserror::Error;

/// Errors from building or verifying the record stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// A record was appended or a round finished with no round open.
    #[error("No round is open")]
    NoOpenRound,

    /// A round was begun while another is open.
    #[error("{0} is still open")]
    RoundAlreadyOpen(RoundNumber),

    /// A round was begun that does not follow the last finalized round.
    #[error("{round} does not follow last finalized {last}")]
    RoundOutOfOrder {
        /// Round requested.
        round: RoundNumber,
        /// Last finalized round.
        last: RoundNumber,
    },

    /// Summary does not chain to the expected previous round hash.
    #[error("Summary previous hash {actual} does not match expected {expected}")]
    PreviousHashMismatch {
        /// Hash the auditor holds.
        expected: Hash,
        /// Hash in the summary.
        actual: Hash,
    },

    /// Recomputed running hash differs from the summary.
    #[error("Running hash mismatch: recomputed {recomputed}, summary has {recorded}")]
    RunningHashMismatch {
        /// Recomputed value.
        recomputed: Hash,
        /// Value in the summary.
        recorded: Hash,
    },

    /// Recomputed Merkle root differs from the summary.
    #[error("Records root mismatch: recomputed {recomputed}, summary has {recorded}")]
    RecordsRootMismatch {
        /// Recomputed value.
        recomputed: Hash,
        /// Value in the summary.
        recorded: Hash,
    },

    /// Number of records differs from the summary.
    #[error("Record count mismatch: got {actual}, summary has {recorded}")]
    RecordCountMismatch {
        /// Records supplied.
        actual: u64,
        /// Count in the summary.
        recorded: u64,
    },

    /// Recomputed summary hash differs from the summary.
    #[error("Round hash mismatch: recomputed {recomputed}, summary has {recorded}")]
    RoundHashMismatch {
        /// Recomputed value.
        recomputed: Hash,
        /// Value in the summary.
        recorded: Hash,
    },

    /// The summary's consensus time range does not span its records.
    #[error("Consensus times {recorded:?} do not match records {actual:?}")]
    ConsensusTimeMismatch {
        /// First and last record times.
        actual: (Option<Timestamp>, Option<Timestamp>),
        /// Times in the summary.
        recorded: (Option<Timestamp>, Option<Timestamp>),
    },
}

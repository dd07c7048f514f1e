//! Fatal handle faults.

use concord_core::StateError;
use concord_records::StreamError;
use concord_types::{RoundNumber, TransactionId};
use thiserror::Error;

/// A fault that stops round processing on this node.
///
/// Rejections and handler failures never surface here; they end up as status
/// codes on records. Anything that does surface here means continuing could
/// commit state other nodes will not, so the node must halt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("state fault: {0}")]
    State(#[from] StateError),

    #[error("record stream fault: {0}")]
    Stream(#[from] StreamError),

    #[error("handler for {tx_id} reported a fatal fault: {reason}")]
    Fatal { tx_id: TransactionId, reason: String },

    #[error("consensus time does not increase at transaction {index} of {round}")]
    NonIncreasingTimestamp { round: RoundNumber, index: usize },
}

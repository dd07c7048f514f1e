//! Error types shared by every stage of the pipeline.

use concord_types::{ResponseCode, StateKey};
use thiserror::Error;

/// Errors raised by state access.
///
/// Every variant is fatal for round processing: the node halts rather than
/// commit on top of state it can no longer trust.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// A stored value failed to decode.
    #[error("Corrupted state value at {key:?}: {reason}")]
    Corrupted {
        /// Key whose value failed to decode.
        key: StateKey,
        /// Decoder message.
        reason: String,
    },

    /// A second working view was requested while one is open.
    #[error("Working view already open on version {0}")]
    WorkingViewAlreadyOpen(u64),

    /// A working view was committed after its base stopped being current.
    #[error("Stale working view: based on version {base}, latest committed is {latest}")]
    StaleWorkingView {
        /// Version the view was opened on.
        base: u64,
        /// Latest committed version.
        latest: u64,
    },

    /// Rollback or release of a checkpoint that is not on the stack.
    #[error("Unknown checkpoint {0}")]
    UnknownCheckpoint(usize),

    /// Transaction-level operation without an open transaction.
    #[error("No transaction is open on the working view")]
    NoOpenTransaction,

    /// A transaction was begun while another is still open.
    #[error("A transaction is already open on the working view")]
    TransactionAlreadyOpen,

    /// A version that is neither retained nor committed was referenced.
    #[error("Unknown snapshot version {0}")]
    UnknownVersion(u64),
}

/// Errors returned by business handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// Expected business failure; state is rolled back and fees are kept.
    #[error("Handler failed with {0}")]
    Failure(ResponseCode),

    /// State access failed; fatal.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Unrecoverable fault inside the handler; fatal.
    #[error("Fatal handler fault: {0}")]
    Fatal(String),
}

impl HandlerError {
    /// Whether the error must halt the node.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, HandlerError::Failure(_))
    }
}

impl From<ResponseCode> for HandlerError {
    fn from(code: ResponseCode) -> Self {
        HandlerError::Failure(code)
    }
}

//! Transaction outcome status codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a transaction at precheck or after consensus handling.
///
/// Precheck answers use `Ok` for acceptance; records use `Success`. Every
/// other variant is a rejection or failure that is reported, never thrown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResponseCode {
    /// Precheck passed.
    Ok,
    /// Handled and committed.
    Success,

    // ═══════════════════════════════════════════════════════════════════════
    // Structural
    // ═══════════════════════════════════════════════════════════════════════
    /// Bytes could not be parsed into a transaction.
    InvalidTransactionBody,
    /// Serialized transaction exceeds the configured maximum size.
    TransactionOversize,
    /// Valid duration outside the allowed bounds.
    InvalidTransactionDuration,
    /// Memo exceeds the configured maximum length.
    MemoTooLong,
    /// Transaction was submitted to a different node.
    InvalidNodeAccount,
    /// Transaction type is not handled by this network.
    NotSupported,

    // ═══════════════════════════════════════════════════════════════════════
    // Time window and replay
    // ═══════════════════════════════════════════════════════════════════════
    /// Valid start is outside the accepted window around now.
    InvalidTransactionStart,
    /// Validity window has already passed.
    TransactionExpired,
    /// Transaction id has already been handled.
    DuplicateTransaction,

    // ═══════════════════════════════════════════════════════════════════════
    // Throttling
    // ═══════════════════════════════════════════════════════════════════════
    /// Frontend (ingest) throttle rejected the submission.
    Busy,
    /// Consensus throttle rejected the transaction.
    Throttled,

    // ═══════════════════════════════════════════════════════════════════════
    // Payer, signatures and fees
    // ═══════════════════════════════════════════════════════════════════════
    /// Payer account does not exist.
    PayerAccountNotFound,
    /// Payer account is deleted.
    PayerAccountDeleted,
    /// Payer signature missing or invalid.
    InvalidPayerSignature,
    /// A required non-payer signature is missing or invalid.
    InvalidSignature,
    /// Fee exceeds the transaction's max fee.
    InsufficientTxFee,
    /// Payer cannot cover the fee.
    InsufficientPayerBalance,

    // ═══════════════════════════════════════════════════════════════════════
    // Business handler outcomes
    // ═══════════════════════════════════════════════════════════════════════
    /// Account referenced by the body does not exist.
    InvalidAccountId,
    /// Account cannot cover a debit in the body.
    InsufficientAccountBalance,
    /// Transfer list amounts do not sum to zero.
    InvalidAccountAmounts,
    /// Schedule referenced by the body does not exist.
    InvalidScheduleId,
    /// Schedule expired before its signing requirement was met.
    ScheduleExpired,
    /// Expiration time of a new schedule is not in the future.
    ScheduleExpirationTimeMustBeHigherThanConsensusTime,
    /// File referenced by the body does not exist.
    InvalidFileId,
    /// Topic referenced by the body does not exist.
    InvalidTopicId,
    /// Handler tried to write outside its declared partitions.
    UnauthorizedStateAccess,
    /// Too many child transactions were triggered by one parent.
    MaxChildRecordsExceeded,

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════════════════
    /// The consensus layer refused the submission.
    PlatformTransactionNotCreated,
    /// Unexpected internal failure in a handler.
    FailInvalid,
}

impl ResponseCode {
    /// Whether this is a positive outcome (`Ok` or `Success`).
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseCode::Ok | ResponseCode::Success)
    }

    /// Stable upper-snake-case name for logs and records.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseCode::Ok => "OK",
            ResponseCode::Success => "SUCCESS",
            ResponseCode::InvalidTransactionBody => "INVALID_TRANSACTION_BODY",
            ResponseCode::TransactionOversize => "TRANSACTION_OVERSIZE",
            ResponseCode::InvalidTransactionDuration => "INVALID_TRANSACTION_DURATION",
            ResponseCode::MemoTooLong => "MEMO_TOO_LONG",
            ResponseCode::InvalidNodeAccount => "INVALID_NODE_ACCOUNT",
            ResponseCode::NotSupported => "NOT_SUPPORTED",
            ResponseCode::InvalidTransactionStart => "INVALID_TRANSACTION_START",
            ResponseCode::TransactionExpired => "TRANSACTION_EXPIRED",
            ResponseCode::DuplicateTransaction => "DUPLICATE_TRANSACTION",
            ResponseCode::Busy => "BUSY",
            ResponseCode::Throttled => "THROTTLED",
            ResponseCode::PayerAccountNotFound => "PAYER_ACCOUNT_NOT_FOUND",
            ResponseCode::PayerAccountDeleted => "PAYER_ACCOUNT_DELETED",
            ResponseCode::InvalidPayerSignature => "INVALID_PAYER_SIGNATURE",
            ResponseCode::InvalidSignature => "INVALID_SIGNATURE",
            ResponseCode::InsufficientTxFee => "INSUFFICIENT_TX_FEE",
            ResponseCode::InsufficientPayerBalance => "INSUFFICIENT_PAYER_BALANCE",
            ResponseCode::InvalidAccountId => "INVALID_ACCOUNT_ID",
            ResponseCode::InsufficientAccountBalance => "INSUFFICIENT_ACCOUNT_BALANCE",
            ResponseCode::InvalidAccountAmounts => "INVALID_ACCOUNT_AMOUNTS",
            ResponseCode::InvalidScheduleId => "INVALID_SCHEDULE_ID",
            ResponseCode::ScheduleExpired => "SCHEDULE_EXPIRED",
            ResponseCode::ScheduleExpirationTimeMustBeHigherThanConsensusTime => {
                "SCHEDULE_EXPIRATION_TIME_MUST_BE_HIGHER_THAN_CONSENSUS_TIME"
            }
            ResponseCode::InvalidFileId => "INVALID_FILE_ID",
            ResponseCode::InvalidTopicId => "INVALID_TOPIC_ID",
            ResponseCode::UnauthorizedStateAccess => "UNAUTHORIZED_STATE_ACCESS",
            ResponseCode::MaxChildRecordsExceeded => "MAX_CHILD_RECORDS_EXCEEDED",
            ResponseCode::PlatformTransactionNotCreated => "PLATFORM_TRANSACTION_NOT_CREATED",
            ResponseCode::FailInvalid => "FAIL_INVALID",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

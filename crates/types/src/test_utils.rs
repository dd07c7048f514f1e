//! Deterministic fixtures for tests in this and downstream crates.

use crate::{
    AccountId, KeyPair, NodeId, ResponseCode, Timestamp, Transaction, TransactionBody,
    TransactionData, TransactionId, TransactionRecord, UtilOperation,
};

/// Key pair derived from a one-byte seed.
pub fn test_keypair(seed: u8) -> KeyPair {
    KeyPair::from_seed(&[seed; 32])
}

/// Unsigned transaction data paid by `payer`, valid from `valid_start_secs`
/// for two minutes, submitted through node 0.
pub fn test_transaction_data(
    payer: AccountId,
    valid_start_secs: u64,
    body: TransactionBody,
) -> TransactionData {
    TransactionData {
        id: TransactionId::new(payer, Timestamp::from_secs(valid_start_secs)),
        fee_payer: payer,
        node: NodeId(0),
        max_fee: 1_000_000,
        valid_duration_secs: 120,
        memo: String::new(),
        body,
    }
}

/// A PRNG transaction signed by `signers`.
pub fn test_transaction(payer: AccountId, valid_start_secs: u64, signers: &[&KeyPair]) -> Transaction {
    Transaction::sign(
        test_transaction_data(
            payer,
            valid_start_secs,
            TransactionBody::Util(UtilOperation::Prng { range: 0 }),
        ),
        signers,
    )
}

/// A successful record for a fresh transaction id.
pub fn test_record(payer: u64, valid_start_secs: u64) -> TransactionRecord {
    TransactionRecord::new(
        TransactionId::new(AccountId(payer), Timestamp::from_secs(valid_start_secs)),
        Timestamp::from_secs(valid_start_secs + 1),
        ResponseCode::Success,
        AccountId(payer),
    )
}

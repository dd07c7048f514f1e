//! Signed transaction and round builders.

use crate::keys::account_key;
use concord_types::{
    test_utils::test_transaction_data, AccountAmount, AccountId, ConsensusRound,
    ConsensusTransaction, KeyPair, NodeId, RoundNumber, Timestamp, TokenOperation, Transaction,
    TransactionBody, TransactionData,
};
use std::sync::Arc;

/// Fluent builder for signed transactions.
#[derive(Debug, Clone)]
pub struct TxBuilder {
    data: TransactionData,
}

impl TxBuilder {
    /// Transaction paid by `payer`, valid from `valid_start` for two minutes,
    /// submitted through node 0.
    pub fn new(payer: AccountId, valid_start: Timestamp, body: TransactionBody) -> Self {
        let mut data = test_transaction_data(payer, 0, body);
        data.id.valid_start = valid_start;
        Self { data }
    }

    /// Transfer `amount` from `from` (who also pays) to `to`.
    pub fn transfer(from: AccountId, to: AccountId, amount: i64, valid_start: Timestamp) -> Self {
        Self::new(
            from,
            valid_start,
            TransactionBody::Token(TokenOperation::Transfer {
                transfers: vec![
                    AccountAmount {
                        account: from,
                        amount: -amount,
                    },
                    AccountAmount {
                        account: to,
                        amount,
                    },
                ],
            }),
        )
    }

    /// Submitting node.
    pub fn node(mut self, node: NodeId) -> Self {
        self.data.node = node;
        self
    }

    /// Account charged for fees, when different from the id's payer.
    pub fn fee_payer(mut self, payer: AccountId) -> Self {
        self.data.fee_payer = payer;
        self
    }

    /// Maximum fee.
    pub fn max_fee(mut self, max_fee: u64) -> Self {
        self.data.max_fee = max_fee;
        self
    }

    /// Validity window length.
    pub fn valid_duration_secs(mut self, secs: u64) -> Self {
        self.data.valid_duration_secs = secs;
        self
    }

    /// Memo.
    pub fn memo(mut self, memo: impl Into<String>) -> Self {
        self.data.memo = memo.into();
        self
    }

    /// Unsigned data.
    pub fn data(self) -> TransactionData {
        self.data
    }

    /// Sign with explicit keys.
    pub fn sign(self, signers: &[&KeyPair]) -> Transaction {
        Transaction::sign(self.data, signers)
    }

    /// Sign with the fee payer's key.
    pub fn signed_by_payer(self) -> Transaction {
        let key = account_key(self.data.fee_payer);
        Transaction::sign(self.data, &[&key])
    }

    /// Sign with the fee payer's key and the keys of `others`.
    pub fn signed_by_payer_and(self, others: &[AccountId]) -> Transaction {
        let mut keys = vec![account_key(self.data.fee_payer)];
        keys.extend(others.iter().map(|id| account_key(*id)));
        let refs: Vec<&KeyPair> = keys.iter().collect();
        Transaction::sign(self.data, &refs)
    }
}

/// A round whose transactions reach consensus one microsecond apart,
/// starting at `first_time`, each created by its submitting node.
pub fn consensus_round(
    number: RoundNumber,
    first_time: Timestamp,
    transactions: impl IntoIterator<Item = Transaction>,
) -> ConsensusRound {
    let transactions = transactions
        .into_iter()
        .enumerate()
        .map(|(index, tx)| ConsensusTransaction {
            consensus_time: first_time.plus_nanos(index as u64 * 1_000),
            creator: tx.data().node,
            transaction: Arc::new(tx),
        })
        .collect();
    ConsensusRound::new(number, transactions)
}

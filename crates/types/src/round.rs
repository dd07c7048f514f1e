//! Consensus rounds delivered by the ordering layer.

use crate::{NodeId, RoundNumber, Timestamp, Transaction};
use std::sync::Arc;

/// A transaction together with its consensus metadata.
#[derive(Debug, Clone)]
pub struct ConsensusTransaction {
    /// The transaction as gossiped.
    pub transaction: Arc<Transaction>,
    /// Consensus timestamp assigned by the ordering layer.
    pub consensus_time: Timestamp,
    /// Node whose event carried the transaction.
    pub creator: NodeId,
}

/// A finalized, totally ordered batch of transactions. Immutable once built.
#[derive(Debug, Clone)]
pub struct ConsensusRound {
    number: RoundNumber,
    transactions: Vec<ConsensusTransaction>,
}

impl ConsensusRound {
    /// Create a round.
    pub fn new(number: RoundNumber, transactions: Vec<ConsensusTransaction>) -> Self {
        Self {
            number,
            transactions,
        }
    }

    /// The round number.
    pub fn number(&self) -> RoundNumber {
        self.number
    }

    /// Transactions in consensus order.
    pub fn transactions(&self) -> &[ConsensusTransaction] {
        &self.transactions
    }

    /// Number of transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the round carries no transactions.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Consensus time of the first transaction.
    pub fn first_consensus_time(&self) -> Option<Timestamp> {
        self.transactions.first().map(|t| t.consensus_time)
    }

    /// Consensus time of the last transaction.
    pub fn last_consensus_time(&self) -> Option<Timestamp> {
        self.transactions.last().map(|t| t.consensus_time)
    }

    /// Check that timestamps strictly increase within the round and after
    /// `after` (the last consensus time of the previous round).
    ///
    /// Returns the index of the first offending transaction.
    pub fn check_ordering(&self, after: Option<Timestamp>) -> Result<(), usize> {
        let mut previous = after;
        for (index, tx) in self.transactions.iter().enumerate() {
            if previous.is_some_and(|p| tx.consensus_time <= p) {
                return Err(index);
            }
            previous = Some(tx.consensus_time);
        }
        Ok(())
    }
}

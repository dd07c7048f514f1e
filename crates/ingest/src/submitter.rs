//! Hand-off of admitted transactions to the consensus layer.

use concord_types::Transaction;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Errors forwarding a transaction to consensus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("consensus submission queue full ({capacity} transactions)")]
    QueueFull { capacity: usize },

    #[error("consensus layer unavailable: {0}")]
    Unavailable(String),
}

/// The consensus layer as seen from ingest.
pub trait ConsensusSubmitter: Send + Sync {
    /// Forward an admitted transaction for ordering.
    fn submit(&self, tx: Arc<Transaction>) -> Result<(), IngestError>;
}

/// Bounded in-memory queue of submitted transactions.
///
/// Stands in for the gossip layer in single-process deployments: whoever
/// builds consensus rounds drains it.
#[derive(Debug)]
pub struct BufferedSubmitter {
    capacity: usize,
    queue: Mutex<VecDeque<Arc<Transaction>>>,
}

impl BufferedSubmitter {
    /// Queue holding at most `capacity` transactions.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Take every queued transaction, oldest first.
    pub fn drain(&self) -> Vec<Arc<Transaction>> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of queued transactions.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl ConsensusSubmitter for BufferedSubmitter {
    fn submit(&self, tx: Arc<Transaction>) -> Result<(), IngestError> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            return Err(IngestError::QueueFull {
                capacity: self.capacity,
            });
        }
        queue.push_back(tx);
        Ok(())
    }
}

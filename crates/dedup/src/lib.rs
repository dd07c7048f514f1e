//! Bounded-window deduplication cache.
//!
//! Remembers every transaction id handled within the validity window together
//! with its outcome. A transaction whose validity window has passed can never
//! be handled again (handle rejects it as expired), so its entry is purged.
//!
//! The cache is built from persistent maps: cloning it is O(1), which lets
//! the node publish an immutable copy after every round for ingest and
//! status queries while handle keeps mutating its own.
//!
//! Entries are also kept in state as [`CachedReceipt`]s, so the cache is part
//! of the state hash and a node started from a saved snapshot rebuilds
//! exactly what its peers remember.

use concord_types::{
    Partition, ResponseCode, StateRecord, Timestamp, TransactionId, TransactionRecord,
};
use im::{OrdMap, OrdSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Configuration of the deduplication window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How long after its valid start a transaction id is remembered.
    ///
    /// Must be at least the maximum valid duration accepted at ingest.
    pub window_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { window_secs: 180 }
    }
}

impl DedupConfig {
    /// The window as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Outcome of a previously handled transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupEntry {
    /// Transaction identity.
    pub transaction_id: TransactionId,
    /// Final status.
    pub status: ResponseCode,
    /// Consensus time at which it was handled.
    pub consensus_time: Timestamp,
    /// The record emitted when it was handled.
    pub record: Arc<TransactionRecord>,
}

impl DedupEntry {
    /// Entry for a handled record.
    pub fn from_record(record: Arc<TransactionRecord>) -> Self {
        Self {
            transaction_id: record.transaction_id,
            status: record.status,
            consensus_time: record.consensus_time,
            record,
        }
    }
}

/// Persisted form of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CachedReceipt(pub TransactionRecord);

impl StateRecord for CachedReceipt {
    const PARTITION: Partition = Partition::RECORD_CACHE;
    type Key = TransactionId;
}

/// Cache of handled transaction ids.
#[derive(Debug, Clone)]
pub struct DeduplicationCache {
    entries: OrdMap<TransactionId, DedupEntry>,
    expiries: OrdSet<(Timestamp, TransactionId)>,
    window: Duration,
}

impl DeduplicationCache {
    /// Empty cache.
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            entries: OrdMap::new(),
            expiries: OrdSet::new(),
            window: config.window(),
        }
    }

    /// Cache holding `records`, as restored from state.
    pub fn from_records(
        config: &DedupConfig,
        records: impl IntoIterator<Item = Arc<TransactionRecord>>,
    ) -> Self {
        let mut cache = Self::new(config);
        for record in records {
            cache.insert(DedupEntry::from_record(record));
        }
        cache
    }

    /// The same entries under a different window.
    pub fn with_window(&self, config: &DedupConfig) -> Self {
        Self::from_records(config, self.records().cloned())
    }

    /// Remembered records, in transaction id order.
    pub fn records(&self) -> impl Iterator<Item = &Arc<TransactionRecord>> + '_ {
        self.entries.values().map(|entry| &entry.record)
    }

    /// Whether `id` has been handled within the window.
    pub fn contains(&self, id: &TransactionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Cached outcome of `id`.
    pub fn get(&self, id: &TransactionId) -> Option<&DedupEntry> {
        self.entries.get(id)
    }

    /// Number of remembered ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is remembered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remember a handled transaction. The first outcome for an id wins.
    pub fn insert(&mut self, entry: DedupEntry) -> bool {
        let id = entry.transaction_id;
        if self.entries.contains_key(&id) {
            return false;
        }
        let expiry = id.valid_start.saturating_add(self.window);
        self.expiries.insert((expiry, id));
        self.entries.insert(id, entry);
        true
    }

    /// Forget every id whose window ended before `now`, returning them in
    /// expiry order.
    pub fn purge_expired(&mut self, now: Timestamp) -> Vec<TransactionId> {
        let mut purged = Vec::new();
        while let Some((expiry, id)) = self.expiries.get_min().copied() {
            if expiry >= now {
                break;
            }
            self.expiries.remove(&(expiry, id));
            self.entries.remove(&id);
            purged.push(id);
        }
        if !purged.is_empty() {
            debug!(
                purged = purged.len(),
                remaining = self.entries.len(),
                "Purged expired dedup entries"
            );
        }
        purged
    }
}

//! Pre-handle workflow.

use crate::reader::RecordingReader;
use crate::{PreHandleConfig, PreHandleError};
use concord_core::{
    verify_signatures, PreHandleResult, PreHandleStatus, ReadableState, ReadableStateExt,
    ServiceHandlers,
};
use concord_state::Snapshot;
use concord_types::{Account, Hash, ResponseCode, Transaction};
use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, trace};

/// Speculative, parallel validation of transactions ahead of handle.
///
/// Every result is pure data computed against one snapshot. Results are
/// cached by transaction hash; when the same transaction is pre-handled
/// against several snapshots the result from the newest one wins.
pub struct PreHandleWorkflow {
    handlers: ServiceHandlers,
    pool: rayon::ThreadPool,
    cache: DashMap<Hash, Arc<PreHandleResult>>,
}

impl std::fmt::Debug for PreHandleWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreHandleWorkflow")
            .field("threads", &self.pool.current_num_threads())
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl PreHandleWorkflow {
    /// Create the workflow and its worker pool.
    pub fn new(config: &PreHandleConfig, handlers: ServiceHandlers) -> Result<Self, PreHandleError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|index| format!("prehandle-{index}"))
            .build()?;
        Ok(Self {
            handlers,
            pool,
            cache: DashMap::new(),
        })
    }

    /// Pre-handle one transaction against `snapshot` and cache the result.
    pub fn pre_handle(&self, tx: &Transaction, snapshot: &Snapshot) -> Arc<PreHandleResult> {
        let result = Arc::new(self.compute(tx, snapshot, snapshot.version(), None));
        self.store(result.clone());
        result
    }

    /// Pre-handle a batch in parallel on the worker pool.
    ///
    /// Results come back in input order.
    pub fn pre_handle_batch(
        &self,
        txs: &[Arc<Transaction>],
        snapshot: &Snapshot,
    ) -> Vec<Arc<PreHandleResult>> {
        let results: Vec<Arc<PreHandleResult>> = self.pool.install(|| {
            txs.par_iter()
                .map(|tx| self.pre_handle(tx, snapshot))
                .collect()
        });
        debug!(
            count = results.len(),
            snapshot_version = snapshot.version(),
            "Pre-handled batch"
        );
        results
    }

    /// Recompute a result against `state`, reusing the signature checks of
    /// `previous` when they cover the same signed bytes.
    ///
    /// The result is not cached: `state` is typically the working view, which
    /// no other transaction will see in the same shape.
    pub fn refresh(
        &self,
        tx: &Transaction,
        state: &dyn ReadableState,
        snapshot_version: u64,
        previous: Option<&PreHandleResult>,
    ) -> PreHandleResult {
        self.compute(tx, state, snapshot_version, previous)
    }

    /// Cached result for a transaction hash.
    pub fn cached(&self, tx_hash: &Hash) -> Option<Arc<PreHandleResult>> {
        self.cache.get(tx_hash).map(|entry| entry.value().clone())
    }

    /// Drop results computed against snapshots older than `version`.
    pub fn evict_older_than(&self, version: u64) -> usize {
        let before = self.cache.len();
        self.cache
            .retain(|_, result| result.snapshot_version >= version);
        let evicted = before.saturating_sub(self.cache.len());
        if evicted > 0 {
            debug!(evicted, version, "Evicted stale pre-handle results");
        }
        evicted
    }

    /// Drop the result for one transaction.
    pub fn forget(&self, tx_hash: &Hash) {
        self.cache.remove(tx_hash);
    }

    /// Number of cached results.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// The dispatch table results are computed with.
    pub fn handlers(&self) -> &ServiceHandlers {
        &self.handlers
    }

    fn store(&self, result: Arc<PreHandleResult>) {
        self.cache
            .entry(result.tx_hash)
            .and_modify(|existing| {
                if result.snapshot_version >= existing.snapshot_version {
                    *existing = result.clone();
                }
            })
            .or_insert_with(|| result.clone());
    }

    fn compute(
        &self,
        tx: &Transaction,
        state: &dyn ReadableState,
        snapshot_version: u64,
        previous: Option<&PreHandleResult>,
    ) -> PreHandleResult {
        let verifications = match previous {
            Some(previous) if previous.verifications_reusable_for(tx) => {
                previous.verifications.clone()
            }
            _ => verify_signatures(tx),
        };

        let reader = RecordingReader::new(state);
        let mut result = PreHandleResult {
            tx_hash: tx.hash(),
            snapshot_version,
            signed_bytes_hash: tx.signed_bytes_hash(),
            status: PreHandleStatus::SoFarSoGood,
            payer: tx.fee_payer(),
            payer_key: None,
            required_keys: Default::default(),
            verifications,
            reads: Default::default(),
            scanned_partitions: Default::default(),
        };
        result.status = self.evaluate(tx, &reader, &mut result);
        (result.reads, result.scanned_partitions) = reader.into_parts();

        trace!(
            tx_id = %tx.id(),
            status = ?result.status,
            reads = result.reads.len(),
            scans = result.scanned_partitions.len(),
            "Pre-handled transaction"
        );
        result
    }

    fn evaluate(
        &self,
        tx: &Transaction,
        reader: &RecordingReader<'_>,
        result: &mut PreHandleResult,
    ) -> PreHandleStatus {
        let handler = self.handlers.handler_for(tx.body());
        if let Err(code) = handler.pure_checks(tx.body()) {
            return PreHandleStatus::NodeDueDiligenceFailure(code);
        }

        let payer = match reader.get::<Account>(&tx.fee_payer()) {
            Ok(Some(payer)) => payer,
            Ok(None) => {
                return PreHandleStatus::NodeDueDiligenceFailure(
                    ResponseCode::PayerAccountNotFound,
                )
            }
            Err(_) => return PreHandleStatus::PreHandleFailure(ResponseCode::FailInvalid),
        };
        if payer.deleted {
            return PreHandleStatus::NodeDueDiligenceFailure(ResponseCode::PayerAccountDeleted);
        }
        result.payer_key = Some(payer.key);
        if !result.payer_signature_valid() {
            return PreHandleStatus::NodeDueDiligenceFailure(ResponseCode::InvalidPayerSignature);
        }

        match handler.required_keys(tx.body(), tx.fee_payer(), reader) {
            Ok(keys) => result.required_keys = keys,
            Err(code) => return PreHandleStatus::PreHandleFailure(code),
        }
        if result.first_unverified_key().is_some() {
            return PreHandleStatus::PreHandleFailure(ResponseCode::InvalidSignature);
        }
        PreHandleStatus::SoFarSoGood
    }
}

//! The node facade.

use crate::iss::{IssDetector, IssStatus};
use crate::{NodeConfig, NodeError};
use concord_core::{PreHandleResult, ReadableStateExt, ServiceHandlers};
use concord_handle::{HandleWorkflow, RoundOutput};
use concord_ingest::{ConsensusSubmitter, IngestWorkflow};
use concord_prehandle::PreHandleWorkflow;
use concord_records::RunningHashes;
use concord_state::{Snapshot, StateStore};
use concord_types::{
    Account, AccountId, ConsensusRound, Hash, NodeId, ResponseCode, RoundNumber, RoundSummary,
    StateRecord, Timestamp, Transaction, TransactionId, TransactionRecord, VotePower,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// What one handled round produced.
#[derive(Debug, Clone)]
pub struct RoundResult {
    /// Summary closing the round in the record stream.
    pub summary: RoundSummary,
    /// Records in consensus order.
    pub records: Vec<Arc<TransactionRecord>>,
    /// Cached records of redelivered transactions.
    pub duplicates: Vec<Arc<TransactionRecord>>,
    /// The committed snapshot.
    pub snapshot: Arc<Snapshot>,
    /// ISS verdict so far. Usually pending until peers report.
    pub iss: IssStatus,
}

/// A consensus node: ingest, pre-handle and handle around one state store.
pub struct ConsensusNode {
    config: NodeConfig,
    store: StateStore,
    ingest: IngestWorkflow,
    prehandle: Arc<PreHandleWorkflow>,
    handle: Mutex<HandleWorkflow>,
    iss: Mutex<IssDetector>,
    halted: AtomicBool,
}

impl std::fmt::Debug for ConsensusNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusNode")
            .field("id", &self.config.id)
            .field("latest_version", &self.store.latest().version())
            .field("halted", &self.is_halted())
            .finish()
    }
}

impl ConsensusNode {
    /// Start a node on `genesis` (or on a snapshot saved by a previous run).
    pub fn new(
        config: NodeConfig,
        handlers: ServiceHandlers,
        genesis: Snapshot,
        submitter: Arc<dyn ConsensusSubmitter>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let store =
            StateStore::new(genesis).with_max_unsigned(config.state.max_unsigned_snapshots);
        let latest = store.latest();

        let prehandle = Arc::new(PreHandleWorkflow::new(&config.prehandle, handlers.clone())?);
        let handle = HandleWorkflow::new(handlers.clone(), prehandle.clone(), &latest)?
            .with_config(config.handle_config())
            .with_fees(config.fees.clone(), config.accounts.clone())
            .with_throttle(config.throttle.clone())
            .with_dedup(&config.dedup);
        let ingest = IngestWorkflow::new(config.ingest_config(), handlers, submitter)
            .with_fees(config.fees.clone())
            .with_throttle(config.throttle.clone());
        ingest.reconcile_throttles(&latest);
        ingest.publish_dedup(handle.dedup().clone());

        info!(
            node = config.id.0,
            version = latest.version(),
            round = latest.round().0,
            "Node started"
        );
        Ok(Self {
            iss: Mutex::new(IssDetector::new(config.id, config.iss.clone())),
            config,
            store,
            ingest,
            prehandle,
            handle: Mutex::new(handle),
            halted: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Whether a fatal fault stopped the node.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Latest committed snapshot.
    pub fn latest_snapshot(&self) -> Arc<Snapshot> {
        self.store.latest()
    }

    /// Latest signed snapshot.
    pub fn latest_signed_snapshot(&self) -> Arc<Snapshot> {
        self.store.latest_signed()
    }

    /// Record stream chain heads. `None` while a round is being handled.
    pub fn running_hashes(&self) -> Option<RunningHashes> {
        self.handle.try_lock().map(|handle| handle.running_hashes())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Client and consensus inputs
    // ═══════════════════════════════════════════════════════════════════════

    /// Admit a client transaction, stamped with this node's wall clock.
    pub fn submit_transaction(&self, bytes: &[u8]) -> Result<TransactionId, ResponseCode> {
        self.submit_transaction_at(bytes, Timestamp::now())
    }

    /// Admit a client transaction as of `now`.
    pub fn submit_transaction_at(
        &self,
        bytes: &[u8],
        now: Timestamp,
    ) -> Result<TransactionId, ResponseCode> {
        if self.is_halted() {
            return Err(ResponseCode::PlatformTransactionNotCreated);
        }
        self.ingest.submit(bytes, &self.store.latest_signed(), now)
    }

    /// Pre-handle transactions the consensus layer has seen, ahead of their
    /// round.
    pub fn pre_handle(&self, txs: &[Arc<Transaction>]) -> Vec<Arc<PreHandleResult>> {
        self.prehandle
            .pre_handle_batch(txs, &self.store.latest())
    }

    /// Handle and commit one consensus round.
    ///
    /// Rounds must arrive exactly once, in increasing order. Any error halts
    /// the node.
    pub fn on_round_received(&self, round: &ConsensusRound) -> Result<RoundResult, NodeError> {
        if self.is_halted() {
            return Err(NodeError::Halted);
        }
        let Some(mut handle) = self.handle.try_lock() else {
            return Err(self.halt(NodeError::Reentrant));
        };

        let last = handle.last_round();
        if round.number() <= last {
            return Err(self.halt(NodeError::RoundOutOfOrder {
                round: round.number(),
                last,
            }));
        }

        let (output, snapshot) = match self.apply(&mut handle, round) {
            Ok(applied) => applied,
            Err(err) => return Err(self.halt(err)),
        };
        drop(handle);

        self.ingest.publish_dedup(output.dedup.clone());
        self.ingest.reconcile_throttles(&snapshot);
        self.prehandle.evict_older_than(snapshot.version());

        let iss = self
            .iss
            .lock()
            .record_own(round.number(), output.summary.hash);
        if let IssStatus::SelfIss { ours, network } = iss {
            return Err(self.halt(NodeError::SelfIss {
                round: round.number(),
                ours,
                network,
            }));
        }

        info!(
            round = round.number().0,
            version = snapshot.version(),
            records = output.records.len(),
            state_hash = %snapshot.state_hash(),
            "Committed round"
        );
        Ok(RoundResult {
            summary: output.summary,
            records: output.records,
            duplicates: output.duplicates,
            snapshot,
            iss,
        })
    }

    /// The platform finished signing snapshot `version`; queries move to it.
    pub fn on_state_signed(&self, version: u64) -> Result<(), NodeError> {
        self.store.mark_signed(version)?;
        debug!(version, "State signed");
        Ok(())
    }

    /// A peer's hash for `round`.
    ///
    /// Fails, and halts the node, if a supermajority agrees on a hash other
    /// than ours.
    pub fn report_peer_round_hash(
        &self,
        node: NodeId,
        round: RoundNumber,
        hash: Hash,
        weight: VotePower,
    ) -> Result<IssStatus, NodeError> {
        let status = self.iss.lock().report(node, round, hash, weight);
        match status {
            IssStatus::SelfIss { ours, network } => Err(self.halt(NodeError::SelfIss {
                round,
                ours,
                network,
            })),
            status => Ok(status),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    /// Read a record from the latest signed snapshot.
    pub fn query<T: StateRecord>(&self, key: &T::Key) -> Result<Option<T>, NodeError> {
        Ok(self.store.latest_signed().get::<T>(key)?)
    }

    /// Account as of the latest signed snapshot.
    pub fn account(&self, id: AccountId) -> Result<Option<Account>, NodeError> {
        self.query::<Account>(&id)
    }

    /// Record of a transaction handled within the dedup window.
    pub fn transaction_record(&self, id: &TransactionId) -> Option<Arc<TransactionRecord>> {
        self.ingest
            .dedup_view()
            .get(id)
            .map(|entry| entry.record.clone())
    }

    fn apply(
        &self,
        handle: &mut HandleWorkflow,
        round: &ConsensusRound,
    ) -> Result<(RoundOutput, Arc<Snapshot>), NodeError> {
        let mut view = self.store.begin_working_view()?;
        let output = handle.handle_round(round, &mut view)?;
        let consensus_time = handle
            .last_consensus_time()
            .unwrap_or_else(|| self.store.latest().consensus_time());
        let snapshot = self.store.commit(view, round.number(), consensus_time)?;
        Ok((output, snapshot))
    }

    fn halt(&self, err: NodeError) -> NodeError {
        self.halted.store(true, Ordering::Release);
        error!(node = self.config.id.0, error = %err, "Node halted");
        err
    }
}

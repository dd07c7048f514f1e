//! Ingest workflow.

use crate::{ConsensusSubmitter, IngestConfig};
use arc_swap::ArcSwap;
use concord_core::{
    transaction_usage, verify_signatures, FeeSchedule, ReadableStateExt, ServiceHandlers,
};
use concord_dedup::{DedupConfig, DeduplicationCache};
use concord_state::Snapshot;
use concord_throttle::{ThrottleAccumulator, ThrottleConfig, ThrottleUsage};
use concord_types::{Account, ResponseCode, Timestamp, Transaction, TransactionId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Front door of the node.
///
/// Safe to call concurrently from any number of client connections. The
/// only shared mutable pieces are the frontend throttle, behind a mutex, and
/// the published dedup view, swapped atomically after each round.
pub struct IngestWorkflow {
    config: IngestConfig,
    fees: FeeSchedule,
    handlers: ServiceHandlers,
    throttle_config: ThrottleConfig,
    throttle: Mutex<ThrottleAccumulator>,
    dedup: ArcSwap<DeduplicationCache>,
    submitter: Arc<dyn ConsensusSubmitter>,
}

impl std::fmt::Debug for IngestWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestWorkflow")
            .field("config", &self.config)
            .field("dedup_entries", &self.dedup.load().len())
            .finish()
    }
}

impl IngestWorkflow {
    pub fn new(
        config: IngestConfig,
        handlers: ServiceHandlers,
        submitter: Arc<dyn ConsensusSubmitter>,
    ) -> Self {
        let throttle_config = ThrottleConfig::default();
        Self {
            config,
            fees: FeeSchedule::default(),
            handlers,
            throttle: Mutex::new(ThrottleAccumulator::new(&throttle_config)),
            throttle_config,
            dedup: ArcSwap::from_pointee(DeduplicationCache::new(&DedupConfig::default())),
            submitter,
        }
    }

    /// Set the fee schedule used for solvency estimates.
    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    /// Set frontend throttle limits. Resets bucket levels.
    pub fn with_throttle(mut self, config: ThrottleConfig) -> Self {
        self.throttle = Mutex::new(ThrottleAccumulator::new(&config));
        self.throttle_config = config;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Validate `bytes` against `snapshot` and forward them to consensus.
    ///
    /// `now` is this node's wall clock. Nothing here is part of consensus:
    /// a transaction admitted here is still fully re-checked by handle.
    pub fn submit(
        &self,
        bytes: &[u8],
        snapshot: &Snapshot,
        now: Timestamp,
    ) -> Result<TransactionId, ResponseCode> {
        let tx = match self.admit(bytes, snapshot, now) {
            Ok(tx) => tx,
            Err(code) => {
                debug!(status = %code, bytes = bytes.len(), "Rejected submission");
                return Err(code);
            }
        };
        let id = *tx.id();
        if let Err(err) = self.submitter.submit(tx) {
            warn!(tx_id = %id, error = %err, "Failed to forward transaction to consensus");
            return Err(ResponseCode::PlatformTransactionNotCreated);
        }
        debug!(tx_id = %id, "Accepted submission");
        Ok(id)
    }

    /// Adopt the throttle levels handle persisted in `snapshot`.
    ///
    /// Frontend consumption is speculative; after every round the consensus
    /// view of each bucket is authoritative.
    pub fn reconcile_throttles(&self, snapshot: &Snapshot) {
        let usage = match snapshot.get_singleton::<ThrottleUsage>() {
            Ok(usage) => usage.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Unreadable throttle usage, keeping frontend levels");
                return;
            }
        };
        self.throttle.lock().restore(&usage);
        debug!(
            snapshot_version = snapshot.version(),
            categories = usage.buckets.len(),
            "Reconciled frontend throttle"
        );
    }

    /// Publish the dedup cache as of the last handled round.
    pub fn publish_dedup(&self, cache: DeduplicationCache) {
        self.dedup.store(Arc::new(cache));
    }

    /// The last published dedup view.
    pub fn dedup_view(&self) -> Arc<DeduplicationCache> {
        self.dedup.load_full()
    }

    pub fn throttle_config(&self) -> &ThrottleConfig {
        &self.throttle_config
    }

    fn admit(
        &self,
        bytes: &[u8],
        snapshot: &Snapshot,
        now: Timestamp,
    ) -> Result<Arc<Transaction>, ResponseCode> {
        if bytes.len() > self.config.max_transaction_bytes {
            return Err(ResponseCode::TransactionOversize);
        }
        let tx = Transaction::from_bytes(bytes).map_err(|_| ResponseCode::InvalidTransactionBody)?;

        self.check_structure(&tx)?;
        self.check_time_box(&tx, now)?;

        if self.dedup.load().contains(tx.id()) {
            return Err(ResponseCode::DuplicateTransaction);
        }
        if !self.throttle.lock().try_admit(tx.body().kind(), now) {
            return Err(ResponseCode::Busy);
        }

        self.check_payer(&tx, snapshot)?;
        Ok(Arc::new(tx))
    }

    fn check_structure(&self, tx: &Transaction) -> Result<(), ResponseCode> {
        let data = tx.data();
        if tx.signatures().is_empty() {
            return Err(ResponseCode::InvalidSignature);
        }
        if !self.config.accepts_duration(data.valid_duration_secs) {
            return Err(ResponseCode::InvalidTransactionDuration);
        }
        if data.memo.len() > self.config.max_memo_bytes {
            return Err(ResponseCode::MemoTooLong);
        }
        self.handlers.handler_for(tx.body()).pure_checks(tx.body())?;
        if data.node != self.config.node {
            return Err(ResponseCode::InvalidNodeAccount);
        }
        Ok(())
    }

    fn check_time_box(&self, tx: &Transaction, now: Timestamp) -> Result<(), ResponseCode> {
        if tx.id().valid_start > now.saturating_add(self.config.max_clock_skew()) {
            return Err(ResponseCode::InvalidTransactionStart);
        }
        if tx.valid_until() < now {
            return Err(ResponseCode::TransactionExpired);
        }
        Ok(())
    }

    fn check_payer(&self, tx: &Transaction, snapshot: &Snapshot) -> Result<(), ResponseCode> {
        let payer = match snapshot.get::<Account>(&tx.fee_payer()) {
            Ok(Some(payer)) if !payer.deleted => payer,
            Ok(Some(_)) => return Err(ResponseCode::PayerAccountDeleted),
            Ok(None) => return Err(ResponseCode::PayerAccountNotFound),
            Err(err) => {
                warn!(error = %err, "Unreadable payer account");
                return Err(ResponseCode::FailInvalid);
            }
        };
        if verify_signatures(tx).get(&payer.key) != Some(&true) {
            return Err(ResponseCode::InvalidPayerSignature);
        }

        let handler = self.handlers.handler_for(tx.body());
        let usage = transaction_usage(tx, handler.resource_usage(tx.body()));
        let fee = self.fees.compute(&usage).total();
        if fee > tx.data().max_fee {
            return Err(ResponseCode::InsufficientTxFee);
        }
        if fee > payer.balance {
            return Err(ResponseCode::InsufficientPayerBalance);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BufferedSubmitter, IngestError};
    use concord_dedup::DedupEntry;
    use concord_test_helpers::{standard_genesis, TxBuilder, ALICE, BOB, CAROL};
    use concord_types::{AccountId, KeyPair, NodeId, TransactionRecord};
    use tracing_test::traced_test;

    const NOW: Timestamp = Timestamp::from_secs(1_000);

    struct Fixture {
        snapshot: Snapshot,
        submitter: Arc<BufferedSubmitter>,
        ingest: IngestWorkflow,
    }

    fn fixture_with(config: IngestConfig, throttle: ThrottleConfig) -> Fixture {
        let submitter = Arc::new(BufferedSubmitter::new(16));
        let ingest = IngestWorkflow::new(
            config,
            concord_test_helpers::reference_handlers(),
            submitter.clone(),
        )
        .with_throttle(throttle);
        Fixture {
            snapshot: standard_genesis().build(),
            submitter,
            ingest,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(IngestConfig::default(), ThrottleConfig::default())
    }

    fn transfer(payer: AccountId) -> TxBuilder {
        TxBuilder::transfer(payer, CAROL, 1, NOW)
    }

    impl Fixture {
        fn submit(&self, tx: &Transaction) -> Result<TransactionId, ResponseCode> {
            self.ingest.submit(&tx.to_bytes(), &self.snapshot, NOW)
        }
    }

    #[traced_test]
    #[test]
    fn test_valid_transaction_is_forwarded() {
        let fixture = fixture();
        let tx = transfer(ALICE).signed_by_payer();

        assert_eq!(fixture.submit(&tx), Ok(*tx.id()));
        let forwarded = fixture.submitter.drain();
        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded[0].hash(), tx.hash());
        assert!(logs_contain("Accepted submission"));
    }

    #[test]
    fn test_malformed_bytes_are_rejected() {
        let fixture = fixture();
        assert_eq!(
            fixture.ingest.submit(&[0xff; 3], &fixture.snapshot, NOW),
            Err(ResponseCode::InvalidTransactionBody)
        );

        let small = fixture_with(
            IngestConfig::default().with_max_transaction_bytes(16),
            ThrottleConfig::default(),
        );
        assert_eq!(
            small.submit(&transfer(ALICE).signed_by_payer()),
            Err(ResponseCode::TransactionOversize)
        );
        assert!(small.submitter.is_empty());
    }

    #[test]
    fn test_structural_checks() {
        let fixture = fixture();

        let unsigned = Transaction::new(transfer(ALICE).data(), Vec::new());
        assert_eq!(fixture.submit(&unsigned), Err(ResponseCode::InvalidSignature));

        let short = transfer(ALICE).valid_duration_secs(5).signed_by_payer();
        assert_eq!(
            fixture.submit(&short),
            Err(ResponseCode::InvalidTransactionDuration)
        );

        let chatty = transfer(ALICE).memo("x".repeat(101)).signed_by_payer();
        assert_eq!(fixture.submit(&chatty), Err(ResponseCode::MemoTooLong));

        let elsewhere = transfer(ALICE).node(NodeId(1)).signed_by_payer();
        assert_eq!(fixture.submit(&elsewhere), Err(ResponseCode::InvalidNodeAccount));

        let unbalanced = TxBuilder::transfer(ALICE, BOB, 0, NOW);
        let mut data = unbalanced.data();
        data.body = concord_types::TransactionBody::Token(
            concord_types::TokenOperation::Transfer { transfers: vec![] },
        );
        let empty = Transaction::sign(data, &[&concord_test_helpers::account_key(ALICE)]);
        assert_eq!(fixture.submit(&empty), Err(ResponseCode::InvalidAccountAmounts));
    }

    #[test]
    fn test_time_box() {
        let fixture = fixture();

        let future = TxBuilder::transfer(ALICE, CAROL, 1, Timestamp::from_secs(1_011))
            .signed_by_payer();
        assert_eq!(
            fixture.submit(&future),
            Err(ResponseCode::InvalidTransactionStart)
        );

        let skewed = TxBuilder::transfer(ALICE, CAROL, 1, Timestamp::from_secs(1_010))
            .signed_by_payer();
        assert!(fixture.submit(&skewed).is_ok());

        let stale = TxBuilder::transfer(ALICE, CAROL, 1, Timestamp::from_secs(500))
            .signed_by_payer();
        assert_eq!(fixture.submit(&stale), Err(ResponseCode::TransactionExpired));
    }

    #[test]
    fn test_published_dedup_view_rejects_replays() {
        let fixture = fixture();
        let tx = transfer(ALICE).signed_by_payer();

        let mut cache = DeduplicationCache::new(&DedupConfig::default());
        cache.insert(DedupEntry::from_record(Arc::new(TransactionRecord::new(
            *tx.id(),
            NOW,
            ResponseCode::Success,
            ALICE,
        ))));
        fixture.ingest.publish_dedup(cache);

        assert_eq!(fixture.submit(&tx), Err(ResponseCode::DuplicateTransaction));
        assert_eq!(fixture.ingest.dedup_view().len(), 1);
    }

    #[test]
    fn test_frontend_throttle_and_reconcile() {
        let throttle = ThrottleConfig::uniform(1, 1);
        let fixture = fixture_with(IngestConfig::default(), throttle.clone());

        assert!(fixture.submit(&transfer(ALICE).signed_by_payer()).is_ok());
        let second = TxBuilder::transfer(ALICE, CAROL, 1, Timestamp::from_secs(999))
            .signed_by_payer();
        assert_eq!(fixture.submit(&second), Err(ResponseCode::Busy));

        // Consensus saw none of that traffic: its empty buckets win.
        let consensus = standard_genesis()
            .singleton(&ThrottleAccumulator::new(&throttle).usage())
            .build();
        fixture.ingest.reconcile_throttles(&consensus);
        assert!(fixture.submit(&second).is_ok());
    }

    #[test]
    fn test_payer_checks() {
        let fixture = fixture();

        let unknown = transfer(AccountId(4242)).signed_by_payer();
        assert_eq!(fixture.submit(&unknown), Err(ResponseCode::PayerAccountNotFound));

        let forged = transfer(ALICE).sign(&[&KeyPair::from_seed(&[7; 32])]);
        assert_eq!(fixture.submit(&forged), Err(ResponseCode::InvalidPayerSignature));

        let stingy = transfer(ALICE).max_fee(1).signed_by_payer();
        assert_eq!(fixture.submit(&stingy), Err(ResponseCode::InsufficientTxFee));

        let broke = transfer(BOB).signed_by_payer();
        assert_eq!(
            fixture.submit(&broke),
            Err(ResponseCode::InsufficientPayerBalance)
        );
        assert!(fixture.submitter.is_empty());
    }

    struct Unavailable;

    impl ConsensusSubmitter for Unavailable {
        fn submit(&self, _tx: Arc<Transaction>) -> Result<(), IngestError> {
            Err(IngestError::Unavailable("no peers".into()))
        }
    }

    #[traced_test]
    #[test]
    fn test_forwarding_failure() {
        let ingest = IngestWorkflow::new(
            IngestConfig::default(),
            concord_test_helpers::reference_handlers(),
            Arc::new(Unavailable),
        );
        let tx = transfer(ALICE).signed_by_payer();
        assert_eq!(
            ingest.submit(&tx.to_bytes(), &standard_genesis().build(), NOW),
            Err(ResponseCode::PlatformTransactionNotCreated)
        );
        assert!(logs_contain("Failed to forward transaction to consensus"));
    }
}

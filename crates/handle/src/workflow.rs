//! Handle workflow.

use crate::fees::FeeCharger;
use crate::phase::TransactionPhase;
use crate::schedule::{ScheduleAction, ScheduleExecutor};
use crate::{HandleConfig, HandleError};
use concord_core::{
    transaction_usage, FeeSchedule, HandleContext, HandlerError, PreHandleResult,
    PreHandleStatus, ReadableState, ReadableStateExt, ServiceHandlers, SystemAccounts,
    WritableStateExt,
};
use concord_dedup::{CachedReceipt, DedupConfig, DedupEntry, DeduplicationCache};
use concord_prehandle::PreHandleWorkflow;
use concord_records::{RecordStreamBuilder, RunningHashes};
use concord_state::{Snapshot, WorkingView};
use concord_throttle::{ThrottleAccumulator, ThrottleConfig, ThrottleUsage};
use concord_types::{
    Account, ConsensusRound, ConsensusTransaction, FeeCharge, Partition, ResourceUsage,
    ResponseCode, RoundNumber, RoundSummary, Timestamp, Transaction, TransactionRecord,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything handle produced for one round.
#[derive(Debug, Clone)]
pub struct RoundOutput {
    /// The finalized round summary.
    pub summary: RoundSummary,
    /// Records appended to the stream, in consensus order.
    pub records: Vec<Arc<TransactionRecord>>,
    /// Cached records of transactions that were delivered again.
    pub duplicates: Vec<Arc<TransactionRecord>>,
    /// Dedup cache as of the end of the round.
    pub dedup: DeduplicationCache,
    /// Throttle levels persisted at the end of the round.
    pub throttle_usage: ThrottleUsage,
}

/// A terminal outcome for one top-level transaction.
struct Handled {
    record: TransactionRecord,
    phase: TransactionPhase,
    /// Whether the id is entered into the dedup cache. Transactions the
    /// node answered for never are: their payer did not authorize them.
    remember: bool,
    duplicate_of: Option<Arc<TransactionRecord>>,
}

/// Sequential, deterministic application of consensus rounds.
///
/// The only writer of state. Every input it consults (the working view,
/// persisted throttle levels, the dedup cache, consensus timestamps) is
/// identical on every honest node, so every node produces the same records
/// and the same next snapshot. Wall-clock time is never read.
pub struct HandleWorkflow {
    config: HandleConfig,
    charger: FeeCharger,
    throttle_config: ThrottleConfig,
    handlers: ServiceHandlers,
    prehandle: Arc<PreHandleWorkflow>,
    dedup: DeduplicationCache,
    stream: RecordStreamBuilder,
    last_round: RoundNumber,
    last_consensus_time: Option<Timestamp>,
}

impl std::fmt::Debug for HandleWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleWorkflow")
            .field("last_round", &self.last_round)
            .field("last_consensus_time", &self.last_consensus_time)
            .field("dedup_entries", &self.dedup.len())
            .finish()
    }
}

impl HandleWorkflow {
    /// Create a workflow that continues from `snapshot`.
    ///
    /// Record stream chain heads and the dedup cache are read from the
    /// snapshot, so a node restarted from a saved snapshot keeps extending
    /// the same stream and still recognizes transactions its peers handled.
    pub fn new(
        handlers: ServiceHandlers,
        prehandle: Arc<PreHandleWorkflow>,
        snapshot: &Snapshot,
    ) -> Result<Self, HandleError> {
        let hashes = snapshot
            .get_singleton::<RunningHashes>()?
            .unwrap_or_default();
        let last_consensus_time = (snapshot.version() > 0).then(|| snapshot.consensus_time());
        let dedup = restore_dedup(snapshot, &DedupConfig::default())?;
        Ok(Self {
            config: HandleConfig::default(),
            charger: FeeCharger::new(FeeSchedule::default(), SystemAccounts::default()),
            throttle_config: ThrottleConfig::default(),
            handlers,
            prehandle,
            dedup,
            stream: RecordStreamBuilder::from_hashes(hashes),
            last_round: snapshot.round(),
            last_consensus_time,
        })
    }

    /// Set handle limits.
    pub fn with_config(mut self, config: HandleConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the fee schedule and the accounts fees flow between.
    pub fn with_fees(mut self, schedule: FeeSchedule, accounts: SystemAccounts) -> Self {
        self.charger = FeeCharger::new(schedule, accounts);
        self
    }

    /// Set consensus throttle limits.
    pub fn with_throttle(mut self, config: ThrottleConfig) -> Self {
        self.throttle_config = config;
        self
    }

    /// Set the dedup window. Remembered ids are kept under the new window.
    pub fn with_dedup(mut self, config: &DedupConfig) -> Self {
        self.dedup = self.dedup.with_window(config);
        self
    }

    /// Last handled round.
    pub fn last_round(&self) -> RoundNumber {
        self.last_round
    }

    /// Consensus time of the last handled transaction.
    pub fn last_consensus_time(&self) -> Option<Timestamp> {
        self.last_consensus_time
    }

    /// The live dedup cache.
    pub fn dedup(&self) -> &DeduplicationCache {
        &self.dedup
    }

    /// Record stream chain heads.
    pub fn running_hashes(&self) -> RunningHashes {
        self.stream.hashes()
    }

    /// Apply `round` to `view`.
    ///
    /// On success the view holds the round's effects, including persisted
    /// throttle levels and stream chain heads, ready to be committed. On
    /// error the node must halt: the view is in an unspecified state.
    pub fn handle_round(
        &mut self,
        round: &ConsensusRound,
        view: &mut WorkingView,
    ) -> Result<RoundOutput, HandleError> {
        round
            .check_ordering(self.last_consensus_time)
            .map_err(|index| HandleError::NonIncreasingTimestamp {
                round: round.number(),
                index,
            })?;
        self.stream.begin_round(round.number())?;

        let usage = view.get_singleton::<ThrottleUsage>()?.unwrap_or_default();
        let mut throttle = ThrottleAccumulator::from_usage(&self.throttle_config, &usage);
        if let Some(first) = round.first_consensus_time() {
            for id in self.dedup.purge_expired(first) {
                view.remove::<CachedReceipt>(&id);
            }
        }

        let mut records = Vec::with_capacity(round.len());
        let mut duplicates = Vec::new();
        for entry in round.transactions() {
            let handled = self.handle_transaction(entry, view, &mut throttle)?;
            debug_assert!(handled.phase.is_terminal());
            self.stream.append(&handled.record)?;

            let record = Arc::new(handled.record);
            if handled.remember && self.dedup.insert(DedupEntry::from_record(record.clone())) {
                view.put(&record.transaction_id, &CachedReceipt((*record).clone()));
            }
            if let Some(original) = handled.duplicate_of {
                duplicates.push(original);
            }
            debug!(
                round = round.number().0,
                tx_id = %record.transaction_id,
                phase = %handled.phase,
                status = %record.status,
                charged_to = %record.fee.charged_to,
                fee = record.fee.fees.total(),
                "Handled transaction"
            );
            records.push(record);
        }

        let throttle_usage = throttle.usage();
        view.put_singleton(&throttle_usage);
        let summary = self.stream.finish_round()?;
        view.put_singleton(&self.stream.hashes());

        self.last_round = round.number();
        if let Some(last) = round.last_consensus_time() {
            self.last_consensus_time = Some(last);
        }

        info!(
            round = round.number().0,
            transactions = round.len(),
            duplicates = duplicates.len(),
            hash = %summary.hash,
            "Handled round"
        );
        Ok(RoundOutput {
            summary,
            records,
            duplicates,
            dedup: self.dedup.clone(),
            throttle_usage,
        })
    }

    /// Run one transaction inside its own view transaction.
    fn handle_transaction(
        &self,
        entry: &ConsensusTransaction,
        view: &mut WorkingView,
        throttle: &mut ThrottleAccumulator,
    ) -> Result<Handled, HandleError> {
        view.begin_transaction()?;
        match self.process(entry, view, throttle) {
            Ok(mut handled) => {
                handled.record.state_changes = view.commit_transaction()?;
                Ok(handled)
            }
            Err(err) => {
                view.rollback_transaction()?;
                Err(err)
            }
        }
    }

    fn process(
        &self,
        entry: &ConsensusTransaction,
        view: &mut WorkingView,
        throttle: &mut ThrottleAccumulator,
    ) -> Result<Handled, HandleError> {
        let tx = entry.transaction.as_ref();
        let now = entry.consensus_time;
        let id = *tx.id();
        let payer = tx.fee_payer();
        let body = tx.body();
        let handler = self.handlers.handler_for(body);
        let usage = transaction_usage(tx, handler.resource_usage(body));
        let fees = self.charger.schedule().compute(&usage);
        let mut phase = TransactionPhase::Received;

        let record = |status: ResponseCode, fee: FeeCharge, usage: ResourceUsage| {
            let mut record = TransactionRecord::new(id, now, status, fee.charged_to);
            record.fee = fee;
            record.usage = usage;
            record
        };

        // Node due diligence: the submitting node pays for what it should
        // have caught at ingest.
        if let Some(code) = self.due_diligence(entry, view)? {
            phase.advance(TransactionPhase::Rejected);
            warn!(tx_id = %id, node = %entry.creator, status = %code, "Node due-diligence failure");
            let fee = self.charger.charge_node(view, entry.creator, fees.minimal())?;
            return Ok(Handled {
                record: record(code, fee, usage),
                phase,
                remember: false,
                duplicate_of: None,
            });
        }

        if let Some(original) = self.dedup.get(&id) {
            phase.advance(TransactionPhase::Deduped);
            let fee = self
                .charger
                .charge(view, payer, self.charger.schedule().duplicate())?
                .unwrap_or(FeeCharge::none(payer));
            return Ok(Handled {
                record: record(ResponseCode::DuplicateTransaction, fee, ResourceUsage::default()),
                phase,
                remember: false,
                duplicate_of: Some(original.record.clone()),
            });
        }

        phase.advance(TransactionPhase::Authorizing);
        let authorization = self.authorize(tx, view);
        match authorization.status {
            PreHandleStatus::SoFarSoGood => {}
            PreHandleStatus::NodeDueDiligenceFailure(code) => {
                phase.advance(TransactionPhase::Rejected);
                warn!(tx_id = %id, node = %entry.creator, status = %code, "Node due-diligence failure");
                let fee = self.charger.charge_node(view, entry.creator, fees.minimal())?;
                return Ok(Handled {
                    record: record(code, fee, usage),
                    phase,
                    remember: false,
                    duplicate_of: None,
                });
            }
            PreHandleStatus::PreHandleFailure(code) => {
                phase.advance(TransactionPhase::Rejected);
                let fee =
                    self.charger
                        .charge_payer_or_node(view, payer, entry.creator, fees.minimal())?;
                return Ok(Handled {
                    record: record(code, fee, usage),
                    phase,
                    remember: true,
                    duplicate_of: None,
                });
            }
        }

        // Throttle before solvency: a throttled transaction is never told it
        // could not afford a full fee.
        if !throttle.try_admit(body.kind(), now) {
            phase.advance(TransactionPhase::Throttled);
            let fee =
                self.charger
                    .charge_payer_or_node(view, payer, entry.creator, fees.minimal())?;
            return Ok(Handled {
                record: record(ResponseCode::Throttled, fee, usage),
                phase,
                remember: true,
                duplicate_of: None,
            });
        }

        phase.advance(TransactionPhase::Charging);
        let insolvency = if fees.total() > tx.data().max_fee {
            Some(ResponseCode::InsufficientTxFee)
        } else if !self.charger.can_cover(view, payer, &fees)? {
            Some(ResponseCode::InsufficientPayerBalance)
        } else {
            None
        };
        let fee = match insolvency {
            Some(code) => {
                phase.advance(TransactionPhase::Rejected);
                let fee =
                    self.charger
                        .charge_payer_or_node(view, payer, entry.creator, fees.minimal())?;
                return Ok(Handled {
                    record: record(code, fee, usage),
                    phase,
                    remember: true,
                    duplicate_of: None,
                });
            }
            None => self
                .charger
                .charge(view, payer, fees)?
                .unwrap_or(FeeCharge::none(payer)),
        };

        phase.advance(TransactionPhase::Executing);
        let verified_keys = authorization.verified_keys();
        let checkpoint = view.checkpoint();
        let mut executed_usage = usage;
        let status = match handler.validate(body, &*view) {
            ResponseCode::Ok => {
                let mut ctx = HandleContext::new(
                    view,
                    handler.scope(),
                    &self.handlers,
                    id,
                    payer,
                    now,
                    &verified_keys,
                );
                match handler.execute(body, &mut ctx) {
                    Ok(outcome) => {
                        executed_usage = transaction_usage(tx, outcome.usage);
                        if outcome.status.is_success() {
                            ResponseCode::Success
                        } else {
                            outcome.status
                        }
                    }
                    Err(HandlerError::Failure(code)) => code,
                    Err(HandlerError::State(err)) => return Err(err.into()),
                    Err(HandlerError::Fatal(reason)) => {
                        return Err(HandleError::Fatal { tx_id: id, reason })
                    }
                }
            }
            code => code,
        };

        if status.is_success() {
            view.release(checkpoint)?;
            phase.advance(TransactionPhase::Committed);
        } else {
            view.rollback(checkpoint)?;
            phase.advance(TransactionPhase::RolledBack);
        }

        let mut record = record(status, fee, executed_usage);
        record.children = ScheduleExecutor::new(
            &self.handlers,
            &self.charger,
            self.config.max_child_transactions,
        )
        .process(view, now)?
        .into_iter()
        .map(ScheduleAction::into_record)
        .collect();

        Ok(Handled {
            record,
            phase,
            remember: true,
            duplicate_of: None,
        })
    }

    /// Checks the submitting node is accountable for.
    fn due_diligence(
        &self,
        entry: &ConsensusTransaction,
        view: &WorkingView,
    ) -> Result<Option<ResponseCode>, HandleError> {
        let tx = entry.transaction.as_ref();
        let now = entry.consensus_time;
        if tx.data().node != entry.creator {
            return Ok(Some(ResponseCode::InvalidNodeAccount));
        }
        if !self.config.accepts_duration(tx.data().valid_duration_secs) {
            return Ok(Some(ResponseCode::InvalidTransactionDuration));
        }
        if now < tx.id().valid_start {
            return Ok(Some(ResponseCode::InvalidTransactionStart));
        }
        if now > tx.valid_until() {
            return Ok(Some(ResponseCode::TransactionExpired));
        }
        match view.get::<Account>(&tx.fee_payer())? {
            None => Ok(Some(ResponseCode::PayerAccountNotFound)),
            Some(account) if account.deleted => Ok(Some(ResponseCode::PayerAccountDeleted)),
            Some(_) => Ok(None),
        }
    }

    /// The pre-handle result to act on.
    ///
    /// A cached result is reused only if it was computed against this view's
    /// base snapshot and nothing it read or scanned has been written earlier
    /// in the round. Otherwise it is recomputed against the view, reusing whatever
    /// signature checks still apply.
    fn authorize(&self, tx: &Transaction, view: &WorkingView) -> Arc<PreHandleResult> {
        let cached = self.prehandle.cached(&tx.hash());
        if let Some(result) = &cached {
            let fresh = result.snapshot_version == view.base_version()
                && result.verifications_reusable_for(tx)
                && !result.read_keys().any(|key| view.written_in_round(key))
                && !result
                    .scanned_partitions
                    .iter()
                    .any(|partition| view.partition_written_in_round(partition));
            if fresh {
                return result.clone();
            }
        }
        debug!(tx_id = %tx.id(), cached = cached.is_some(), "Refreshing pre-handle result");
        Arc::new(
            self.prehandle
                .refresh(tx, view, view.base_version(), cached.as_deref()),
        )
    }
}

/// The dedup cache as persisted in `snapshot`.
fn restore_dedup(
    snapshot: &Snapshot,
    config: &DedupConfig,
) -> Result<DeduplicationCache, HandleError> {
    let mut records = Vec::new();
    for key in snapshot.keys_in(&Partition::RECORD_CACHE) {
        if let Some(CachedReceipt(record)) = snapshot.get_at::<CachedReceipt>(&key)? {
            records.push(Arc::new(record));
        }
    }
    let cache = DeduplicationCache::from_records(config, records);
    if !cache.is_empty() {
        info!(entries = cache.len(), "Restored dedup cache from snapshot");
    }
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_prehandle::PreHandleConfig;
    use concord_state::StateStore;
    use concord_test_helpers::{
        consensus_round, reference_handlers, standard_genesis, FailingHandler,
        FailureMode, TxBuilder, ALICE, BOB, CAROL, FUNDING, NODE_0_ACCOUNT,
    };
    use concord_core::{ExecutionOutcome, TransactionHandler};
    use concord_types::{
        AccountAmount, AccountId, FileOperation, KeyPair, PublicKey, ScheduleOperation,
        TokenOperation, TransactionBody, TransactionKind, UtilOperation,
    };
    use std::collections::BTreeSet;
    use tracing_test::traced_test;

    struct Fixture {
        store: StateStore,
        prehandle: Arc<PreHandleWorkflow>,
        workflow: HandleWorkflow,
    }

    impl Fixture {
        fn new(handlers: ServiceHandlers, throttle: ThrottleConfig) -> Self {
            let store = standard_genesis().into_store();
            let prehandle = Arc::new(
                PreHandleWorkflow::new(&PreHandleConfig { threads: 2 }, handlers.clone()).unwrap(),
            );
            let workflow = HandleWorkflow::new(handlers, prehandle.clone(), &store.latest())
                .unwrap()
                .with_throttle(throttle);
            Self {
                store,
                prehandle,
                workflow,
            }
        }

        fn standard() -> Self {
            Self::new(reference_handlers(), ThrottleConfig::default())
        }

        fn run(&mut self, round: ConsensusRound) -> Result<RoundOutput, HandleError> {
            let mut view = self.store.begin_working_view()?;
            let output = self.workflow.handle_round(&round, &mut view)?;
            let time = round.last_consensus_time().unwrap_or_default();
            self.store.commit(view, round.number(), time)?;
            Ok(output)
        }

        fn balance(&self, id: AccountId) -> u64 {
            self.store
                .latest()
                .get::<Account>(&id)
                .unwrap()
                .unwrap()
                .balance
        }
    }

    fn secs(s: u64) -> Timestamp {
        Timestamp::from_secs(s)
    }

    /// Fee of a one-signature transaction under the default schedule.
    const FEE: u64 = 9;
    /// Node plus network part of the same fee.
    const MINIMAL_FEE: u64 = 4;

    #[traced_test]
    #[test]
    fn test_transfer_commits_and_charges_fee() {
        let mut fixture = Fixture::standard();
        let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [t1]))
            .unwrap();

        assert_eq!(output.records.len(), 1);
        let record = &output.records[0];
        assert_eq!(record.status, ResponseCode::Success);
        assert_eq!(record.fee.charged_to, ALICE);
        assert_eq!(record.fee.fees.total(), FEE);
        assert!(!record.state_changes.is_empty());
        assert_eq!(fixture.balance(ALICE), 90 - FEE);
        assert_eq!(fixture.balance(BOB), 10);
        assert_eq!(fixture.balance(FUNDING), FEE);
        assert_eq!(output.summary.record_count, 1);
        assert!(logs_contain("Handled round"));
    }

    #[test]
    fn test_redelivery_returns_cached_record() {
        let mut fixture = Fixture::standard();
        let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();

        let first = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [t1.clone()]))
            .unwrap();
        let second = fixture
            .run(consensus_round(RoundNumber(2), secs(102), [t1]))
            .unwrap();

        assert_eq!(second.records[0].status, ResponseCode::DuplicateTransaction);
        assert_eq!(second.duplicates, vec![first.records[0].clone()]);
        assert_eq!(fixture.balance(ALICE), 90 - FEE);
        assert_eq!(fixture.balance(BOB), 10);
    }

    #[test]
    fn test_missing_required_signature_charges_payer_minimal_fee() {
        let mut fixture = Fixture::standard();
        // Carol pays for moving Bob's funds without Bob's signature.
        let t2 = TxBuilder::transfer(BOB, ALICE, 1, secs(100))
            .fee_payer(CAROL)
            .signed_by_payer();

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [t2]))
            .unwrap();

        let record = &output.records[0];
        assert_eq!(record.status, ResponseCode::InvalidSignature);
        assert_eq!(record.fee.charged_to, CAROL);
        assert_eq!(record.fee.fees.total(), MINIMAL_FEE);
        assert_eq!(fixture.balance(ALICE), 100);
        assert_eq!(fixture.balance(BOB), 0);
    }

    #[test]
    fn test_forged_payer_signature_charges_node() {
        let mut fixture = Fixture::standard();
        let forged = TxBuilder::transfer(ALICE, BOB, 10, secs(100))
            .sign(&[&KeyPair::from_seed(&[99; 32])]);

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [forged]))
            .unwrap();

        let record = &output.records[0];
        assert_eq!(record.status, ResponseCode::InvalidPayerSignature);
        assert_eq!(record.fee.charged_to, NODE_0_ACCOUNT);
        assert_eq!(fixture.balance(ALICE), 100);
        assert_eq!(fixture.balance(NODE_0_ACCOUNT), 1_000 - MINIMAL_FEE);
        assert!(output.dedup.is_empty());
    }

    #[test]
    fn test_expired_transaction_charges_node() {
        let mut fixture = Fixture::standard();
        let late = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(500), [late]))
            .unwrap();

        assert_eq!(output.records[0].status, ResponseCode::TransactionExpired);
        assert_eq!(output.records[0].fee.charged_to, NODE_0_ACCOUNT);
        assert_eq!(fixture.balance(ALICE), 100);
    }

    #[test]
    fn test_insolvent_payer_falls_back_to_node() {
        let mut fixture = Fixture::standard();
        let broke = TxBuilder::transfer(BOB, ALICE, 0, secs(100)).signed_by_payer();

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [broke]))
            .unwrap();

        assert_eq!(output.records[0].status, ResponseCode::InsufficientPayerBalance);
        assert_eq!(output.records[0].fee.charged_to, NODE_0_ACCOUNT);
    }

    #[test]
    fn test_max_fee_is_respected() {
        let mut fixture = Fixture::standard();
        let cheap = TxBuilder::transfer(ALICE, BOB, 10, secs(100))
            .max_fee(FEE - 1)
            .signed_by_payer();

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [cheap]))
            .unwrap();

        assert_eq!(output.records[0].status, ResponseCode::InsufficientTxFee);
        assert_eq!(fixture.balance(ALICE), 100 - MINIMAL_FEE);
        assert_eq!(fixture.balance(BOB), 0);
    }

    #[test]
    fn test_throttle_rejects_burst() {
        let mut fixture = Fixture::new(reference_handlers(), ThrottleConfig::uniform(1, 1));
        let a = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();
        let b = TxBuilder::transfer(ALICE, BOB, 10, secs(99)).signed_by_payer();

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [a, b]))
            .unwrap();

        assert_eq!(output.records[0].status, ResponseCode::Success);
        assert_eq!(output.records[1].status, ResponseCode::Throttled);
        assert_eq!(fixture.balance(ALICE), 90 - FEE - MINIMAL_FEE);
        assert_eq!(fixture.balance(BOB), 10);
    }

    fn file_create(payer: AccountId, valid_start: Timestamp) -> Transaction {
        TxBuilder::new(
            payer,
            valid_start,
            TransactionBody::File(FileOperation::Create { contents: vec![] }),
        )
        .signed_by_payer()
    }

    #[test]
    fn test_handler_failure_keeps_only_the_fee() {
        let handlers = reference_handlers().with(
            TransactionKind::File,
            FailingHandler::new(FailureMode::AfterWrite(ResponseCode::InvalidFileId)),
        );
        let mut fixture = Fixture::new(handlers, ThrottleConfig::default());

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [file_create(ALICE, secs(100))]))
            .unwrap();

        assert_eq!(output.records[0].status, ResponseCode::InvalidFileId);
        assert_eq!(fixture.balance(ALICE), 100 - FEE);
    }

    #[test]
    fn test_out_of_scope_write_is_rolled_back() {
        let handlers = reference_handlers().with(
            TransactionKind::File,
            FailingHandler::new(FailureMode::OutOfScope),
        );
        let mut fixture = Fixture::new(handlers, ThrottleConfig::default());

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [file_create(ALICE, secs(100))]))
            .unwrap();

        assert_eq!(
            output.records[0].status,
            ResponseCode::UnauthorizedStateAccess
        );
        assert_eq!(fixture.balance(ALICE), 100 - FEE);
    }

    #[test]
    fn test_fatal_handler_fault_stops_the_round() {
        let handlers = reference_handlers()
            .with(TransactionKind::File, FailingHandler::new(FailureMode::Fatal));
        let mut fixture = Fixture::new(handlers, ThrottleConfig::default());

        let result =
            fixture.run(consensus_round(RoundNumber(1), secs(101), [file_create(ALICE, secs(100))]));
        assert!(matches!(result, Err(HandleError::Fatal { .. })));
        assert_eq!(fixture.store.latest().version(), 0);
    }

    #[test]
    fn test_timestamps_must_increase_across_rounds() {
        let mut fixture = Fixture::standard();
        fixture
            .run(consensus_round(
                RoundNumber(1),
                secs(101),
                [TxBuilder::transfer(ALICE, BOB, 1, secs(100)).signed_by_payer()],
            ))
            .unwrap();

        let result = fixture.run(consensus_round(
            RoundNumber(2),
            secs(101),
            [TxBuilder::transfer(ALICE, BOB, 1, secs(99)).signed_by_payer()],
        ));
        assert_eq!(
            result.unwrap_err(),
            HandleError::NonIncreasingTimestamp {
                round: RoundNumber(2),
                index: 0
            }
        );
    }

    #[test]
    fn test_fully_signed_schedule_runs_as_child() {
        let mut fixture = Fixture::standard();
        let create = TxBuilder::new(
            ALICE,
            secs(100),
            TransactionBody::Schedule(ScheduleOperation::Create {
                body: Box::new(TransactionBody::Token(TokenOperation::Transfer {
                    transfers: vec![
                        AccountAmount {
                            account: CAROL,
                            amount: -25,
                        },
                        AccountAmount {
                            account: BOB,
                            amount: 25,
                        },
                    ],
                })),
                payer: None,
                expiration_time: secs(1_000),
            }),
        )
        .signed_by_payer_and(&[CAROL]);

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [create]))
            .unwrap();

        let record = &output.records[0];
        assert_eq!(record.status, ResponseCode::Success);
        assert_eq!(record.children.len(), 1);
        assert_eq!(record.children[0].status, ResponseCode::Success);
        assert!(record.children[0].transaction_id.scheduled);
        assert_eq!(fixture.balance(BOB), 25);
    }

    #[traced_test]
    #[test]
    fn test_stale_prehandle_result_is_refreshed() {
        let mut fixture = Fixture::standard();
        let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();
        // Reads Bob's account, which t1 writes.
        let t2 = TxBuilder::transfer(BOB, ALICE, 1, secs(100))
            .fee_payer(CAROL)
            .signed_by_payer_and(&[BOB]);

        let snapshot = fixture.store.latest();
        fixture.prehandle.pre_handle(&t1, &snapshot);
        fixture.prehandle.pre_handle(&t2, &snapshot);

        let output = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [t1, t2]))
            .unwrap();

        assert_eq!(output.records[1].status, ResponseCode::Success);
        assert_eq!(fixture.balance(BOB), 9);
        assert!(logs_contain("Refreshing pre-handle result"));
    }

    #[test]
    fn test_round_persists_stream_heads_and_throttle() {
        let mut fixture = Fixture::standard();
        let output = fixture
            .run(consensus_round(
                RoundNumber(1),
                secs(101),
                [TxBuilder::transfer(ALICE, BOB, 1, secs(100)).signed_by_payer()],
            ))
            .unwrap();

        let snapshot = fixture.store.latest();
        let hashes = snapshot.get_singleton::<RunningHashes>().unwrap().unwrap();
        assert_eq!(hashes.last_round_hash, output.summary.hash);
        assert_eq!(hashes.running_hash, output.summary.running_hash);
        let usage = snapshot.get_singleton::<ThrottleUsage>().unwrap().unwrap();
        assert_eq!(usage, output.throttle_usage);

        // A workflow restarted from the snapshot continues the same chain.
        let restarted =
            HandleWorkflow::new(reference_handlers(), fixture.prehandle.clone(), &snapshot).unwrap();
        assert_eq!(restarted.running_hashes(), hashes);
        assert_eq!(restarted.last_round(), RoundNumber(1));
    }

    #[test]
    fn test_validity_longer_than_dedup_window_is_refused() {
        let mut fixture = Fixture::standard();
        let long = TxBuilder::transfer(ALICE, BOB, 10, secs(100))
            .valid_duration_secs(10_000)
            .signed_by_payer();

        let first = fixture
            .run(consensus_round(RoundNumber(1), secs(101), [long.clone()]))
            .unwrap();
        // Long after the dedup window, but still inside the declared validity.
        let second = fixture
            .run(consensus_round(RoundNumber(2), secs(400), [long]))
            .unwrap();

        for output in [&first, &second] {
            let record = &output.records[0];
            assert_eq!(record.status, ResponseCode::InvalidTransactionDuration);
            assert_eq!(record.fee.charged_to, NODE_0_ACCOUNT);
            assert!(output.dedup.is_empty());
        }
        assert_eq!(fixture.balance(ALICE), 100);
        assert_eq!(fixture.balance(BOB), 0);
    }

    #[test]
    fn test_redelivery_at_end_of_validity_is_still_a_duplicate() {
        let mut fixture = Fixture::standard();
        let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100))
            .valid_duration_secs(180)
            .signed_by_payer();

        fixture
            .run(consensus_round(RoundNumber(1), secs(101), [t1.clone()]))
            .unwrap();
        let last_valid = fixture
            .run(consensus_round(RoundNumber(2), secs(280), [t1.clone()]))
            .unwrap();
        let expired = fixture
            .run(consensus_round(RoundNumber(3), secs(281), [t1.clone()]))
            .unwrap();

        assert_eq!(last_valid.records[0].status, ResponseCode::DuplicateTransaction);
        assert_eq!(expired.records[0].status, ResponseCode::TransactionExpired);
        assert!(!expired.dedup.contains(t1.id()));
        assert_eq!(fixture.balance(BOB), 10);
        assert!(fixture
            .store
            .latest()
            .get::<CachedReceipt>(t1.id())
            .unwrap()
            .is_none());
    }

    #[traced_test]
    #[test]
    fn test_restarted_workflow_still_rejects_duplicates() {
        let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();
        let round_one = consensus_round(RoundNumber(1), secs(101), [t1.clone()]);
        let round_two = consensus_round(RoundNumber(2), secs(102), [t1.clone()]);

        let mut continuous = Fixture::standard();
        continuous.run(round_one.clone()).unwrap();
        continuous.run(round_two.clone()).unwrap();

        let mut restarted = Fixture::standard();
        let first = restarted.run(round_one).unwrap();
        let snapshot = restarted.store.latest();
        assert_eq!(
            snapshot.get::<CachedReceipt>(t1.id()).unwrap(),
            Some(CachedReceipt((*first.records[0]).clone()))
        );
        restarted.workflow =
            HandleWorkflow::new(reference_handlers(), restarted.prehandle.clone(), &snapshot)
                .unwrap();
        assert!(restarted.workflow.dedup().contains(t1.id()));
        assert!(logs_contain("Restored dedup cache from snapshot"));

        let second = restarted.run(round_two).unwrap();
        assert_eq!(second.records[0].status, ResponseCode::DuplicateTransaction);
        assert_eq!(second.duplicates, vec![first.records[0].clone()]);
        assert_eq!(restarted.balance(BOB), 10);
        assert_eq!(
            restarted.store.latest().state_hash(),
            continuous.store.latest().state_hash()
        );
    }

    /// Requires the signature of whichever account has the highest id.
    struct NewestAccountHandler;

    impl TransactionHandler for NewestAccountHandler {
        fn required_keys(
            &self,
            _body: &TransactionBody,
            _payer: AccountId,
            state: &dyn ReadableState,
        ) -> Result<BTreeSet<PublicKey>, ResponseCode> {
            let Some(newest) = state.keys_in(&Partition::ACCOUNTS).pop() else {
                return Ok(BTreeSet::new());
            };
            let account = state
                .get_at::<Account>(&newest)
                .map_err(|_| ResponseCode::InvalidAccountId)?
                .ok_or(ResponseCode::InvalidAccountId)?;
            Ok([account.key].into_iter().collect())
        }

        fn scope(&self) -> &[Partition] {
            &[]
        }

        fn execute(
            &self,
            _body: &TransactionBody,
            _ctx: &mut HandleContext<'_>,
        ) -> Result<ExecutionOutcome, HandlerError> {
            Ok(ExecutionOutcome::success(ResourceUsage::default()))
        }
    }

    #[traced_test]
    #[test]
    fn test_result_that_scanned_a_written_partition_is_refreshed() {
        let handlers = || reference_handlers().with(TransactionKind::Util, NewestAccountHandler);
        let create = TxBuilder::new(
            NODE_0_ACCOUNT,
            secs(100),
            TransactionBody::Token(TokenOperation::CreateAccount {
                key: KeyPair::from_seed(&[77; 32]).public_key(),
                initial_balance: 0,
            }),
        )
        .signed_by_payer();
        // Carol is the newest account until `create` runs.
        let prng = TxBuilder::new(
            ALICE,
            secs(100),
            TransactionBody::Util(UtilOperation::Prng { range: 0 }),
        )
        .signed_by_payer_and(&[CAROL]);
        let round = consensus_round(RoundNumber(1), secs(101), [create.clone(), prng.clone()]);

        let mut cold = Fixture::new(handlers(), ThrottleConfig::default());
        cold.run(round.clone()).unwrap();

        let mut warm = Fixture::new(handlers(), ThrottleConfig::default());
        let snapshot = warm.store.latest();
        warm.prehandle.pre_handle(&create, &snapshot);
        let speculative = warm.prehandle.pre_handle(&prng, &snapshot);
        assert_eq!(speculative.status, PreHandleStatus::SoFarSoGood);
        assert!(speculative.scanned_partitions.contains(&Partition::ACCOUNTS));

        let output = warm.run(round).unwrap();

        assert_eq!(output.records[0].status, ResponseCode::Success);
        assert_eq!(output.records[1].status, ResponseCode::InvalidSignature);
        assert!(logs_contain("Refreshing pre-handle result"));
        assert_eq!(
            warm.store.latest().state_hash(),
            cold.store.latest().state_hash()
        );
    }
}

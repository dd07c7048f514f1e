//! Whole-pipeline properties: determinism, idempotence under redelivery
//! (including across a restart), atomicity, throttle conservation and record
//! stream integrity.

use concord_core::{ReadableStateExt, ServiceHandlers};
use concord_ingest::BufferedSubmitter;
use concord_node::{ConsensusNode, NodeConfig, RoundResult};
use concord_records::{record_proofs, verify_record_inclusion, verify_round};
use concord_state::Snapshot;
use concord_test_helpers::{
    consensus_round, reference_handlers, standard_genesis, FailingHandler, FailureMode,
    TxBuilder, ALICE, BOB, CAROL, FUNDING, NODE_0_ACCOUNT,
};
use concord_throttle::{ThrottleConfig, ThrottleUsage};
use concord_types::{
    Account, AccountAmount, AccountId, FileOperation, Hash, KeyPair, ResponseCode, RoundNumber,
    ScheduleOperation, Timestamp, TokenOperation, Transaction, TransactionBody, TransactionKind,
    TransactionRecord,
};
use std::sync::Arc;

const ACCOUNTS: [AccountId; 5] = [NODE_0_ACCOUNT, FUNDING, ALICE, BOB, CAROL];

fn secs(s: u64) -> Timestamp {
    Timestamp::from_secs(s)
}

fn node_with(config: NodeConfig, handlers: ServiceHandlers) -> ConsensusNode {
    ConsensusNode::new(
        config,
        handlers,
        standard_genesis().build(),
        Arc::new(BufferedSubmitter::new(1_024)),
    )
    .unwrap()
}

fn node() -> ConsensusNode {
    node_with(NodeConfig::default(), reference_handlers())
}

fn scheduled_transfer(from: AccountId, to: AccountId, amount: i64) -> TransactionBody {
    TransactionBody::Schedule(ScheduleOperation::Create {
        body: Box::new(TransactionBody::Token(TokenOperation::Transfer {
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
        })),
        payer: None,
        expiration_time: secs(10_000),
    })
}

/// Three rounds mixing successes, rejections, a triggered schedule, a
/// failed execution and a redelivery.
fn workload() -> Vec<(Timestamp, Vec<Transaction>)> {
    let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();
    vec![
        (
            secs(101),
            vec![
                t1.clone(),
                TxBuilder::transfer(CAROL, BOB, 20, secs(100)).signed_by_payer(),
                TxBuilder::transfer(ALICE, BOB, 10, secs(99)).sign(&[&KeyPair::from_seed(&[3; 32])]),
            ],
        ),
        (
            secs(102),
            vec![
                TxBuilder::transfer(BOB, ALICE, 1, secs(101)).signed_by_payer(),
                TxBuilder::new(CAROL, secs(101), scheduled_transfer(CAROL, ALICE, 5))
                    .signed_by_payer(),
            ],
        ),
        (
            secs(103),
            vec![
                t1,
                TxBuilder::transfer(ALICE, CAROL, 1_000, secs(102)).signed_by_payer(),
            ],
        ),
    ]
}

fn run(node: &ConsensusNode, rounds: &[(Timestamp, Vec<Transaction>)]) -> Vec<RoundResult> {
    rounds
        .iter()
        .enumerate()
        .map(|(index, (at, txs))| {
            node.on_round_received(&consensus_round(
                RoundNumber(index as u64 + 1),
                *at,
                txs.clone(),
            ))
            .unwrap()
        })
        .collect()
}

fn balances(node: &ConsensusNode) -> Vec<u64> {
    let snapshot = node.latest_snapshot();
    ACCOUNTS
        .iter()
        .map(|id| snapshot.get::<Account>(id).unwrap().unwrap().balance)
        .collect()
}

#[test]
fn test_same_rounds_same_state_and_records() {
    // One node pre-handles everything on a wide pool ahead of time, the
    // other computes every authorization inside handle.
    let eager = node_with(
        NodeConfig {
            prehandle: concord_prehandle::PreHandleConfig { threads: 4 },
            ..NodeConfig::default()
        },
        reference_handlers(),
    );
    let lazy = node_with(
        NodeConfig {
            prehandle: concord_prehandle::PreHandleConfig { threads: 1 },
            ..NodeConfig::default()
        },
        reference_handlers(),
    );

    let rounds = workload();
    let all: Vec<Arc<Transaction>> = rounds
        .iter()
        .flat_map(|(_, txs)| txs.iter().cloned().map(Arc::new))
        .collect();
    eager.pre_handle(&all);

    let a = run(&eager, &rounds);
    let b = run(&lazy, &rounds);
    for (a, b) in a.iter().zip(&b) {
        assert_eq!(a.summary, b.summary);
        assert_eq!(a.records, b.records);
        assert_eq!(a.snapshot.state_hash(), b.snapshot.state_hash());
    }

    // The workload exercised what it meant to.
    let statuses: Vec<ResponseCode> = a
        .iter()
        .flat_map(|round| round.records.iter().map(|record| record.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ResponseCode::Success,
            ResponseCode::Success,
            ResponseCode::InvalidPayerSignature,
            ResponseCode::Success,
            ResponseCode::Success,
            ResponseCode::DuplicateTransaction,
            ResponseCode::InsufficientAccountBalance,
        ]
    );
    assert_eq!(a[1].records[1].children.len(), 1);
    assert_eq!(a[1].records[1].children[0].status, ResponseCode::Success);
}

#[test]
fn test_redelivered_rounds_change_nothing() {
    let rounds = workload();
    let once = node();
    run(&once, &rounds[..2]);

    // Everything the payers authorized is delivered a second time. The
    // forged transfer is left out: the submitting node pays for it on every
    // delivery.
    let twice = node();
    let mut doubled = rounds[..2].to_vec();
    doubled.push((secs(110), rounds[0].1[..2].to_vec()));
    doubled.push((secs(111), rounds[1].1.clone()));
    let results = run(&twice, &doubled);

    assert_eq!(balances(&once), balances(&twice));
    for (round, original) in results[2..].iter().zip(&results[..2]) {
        assert_eq!(round.duplicates.len(), round.records.len());
        for (record, cached) in round.records.iter().zip(&round.duplicates) {
            assert_eq!(record.status, ResponseCode::DuplicateTransaction);
            assert!(original.records.contains(cached));
        }
    }
}

#[test]
fn test_failed_execution_keeps_only_the_fee() {
    let handlers = reference_handlers().with(
        TransactionKind::File,
        FailingHandler::new(FailureMode::AfterWrite(ResponseCode::InvalidFileId)),
    );
    let node = node_with(NodeConfig::default(), handlers);
    let failing = TxBuilder::new(
        ALICE,
        secs(100),
        TransactionBody::File(FileOperation::Create { contents: vec![1] }),
    )
    .signed_by_payer();
    let after = TxBuilder::transfer(ALICE, BOB, 50, secs(99)).signed_by_payer();

    let result = &run(&node, &[(secs(101), vec![failing, after])])[0];

    assert_eq!(result.records[0].status, ResponseCode::InvalidFileId);
    assert_eq!(result.records[1].status, ResponseCode::Success);
    // Fee debit and fee credit are the only changes of the failed one.
    assert_eq!(result.records[0].state_changes.len(), 2);
    assert_eq!(balances(&node)[2], 100 - 9 - 9 - 50);
}

#[test]
fn test_throttle_state_ignores_local_traffic() {
    let config = NodeConfig {
        throttle: ThrottleConfig::uniform(2, 2),
        ..NodeConfig::default()
    };
    let busy = node_with(config.clone(), reference_handlers());
    let quiet = node_with(config, reference_handlers());

    // Local client traffic fills the busy node's frontend buckets.
    for start in 0..5 {
        let tx = TxBuilder::transfer(CAROL, BOB, 1, secs(200 + start)).signed_by_payer();
        let _ = busy.submit_transaction_at(&tx.to_bytes(), secs(200));
    }

    let burst: Vec<Transaction> = (0..4)
        .map(|i| TxBuilder::transfer(CAROL, BOB, 1, secs(90 + i)).signed_by_payer())
        .collect();
    let rounds = vec![(secs(100), burst.clone()), (secs(101), burst[..1].to_vec())];

    let a = run(&busy, &rounds);
    let b = run(&quiet, &rounds);

    let usage = |node: &ConsensusNode| {
        node.latest_snapshot()
            .get_singleton::<ThrottleUsage>()
            .unwrap()
            .unwrap()
    };
    assert_eq!(usage(&busy), usage(&quiet));
    let statuses: Vec<ResponseCode> = a[0].records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            ResponseCode::Success,
            ResponseCode::Success,
            ResponseCode::Throttled,
            ResponseCode::Throttled,
        ]
    );
    assert_eq!(a[0].records, b[0].records);
}

#[test]
fn test_stream_verifies_round_by_round() {
    let node = node();
    let results = run(&node, &workload());

    let mut previous_round_hash = Hash::ZERO;
    let mut previous_running_hash = Hash::ZERO;
    for result in &results {
        let records: Vec<TransactionRecord> =
            result.records.iter().map(|record| (**record).clone()).collect();
        verify_round(
            &previous_round_hash,
            &previous_running_hash,
            &records,
            &result.summary,
        )
        .unwrap();

        for (record, proof) in records.iter().zip(record_proofs(&records)) {
            assert!(verify_record_inclusion(record, &proof, &result.summary));
        }
        previous_round_hash = result.summary.hash;
        previous_running_hash = result.summary.running_hash;
    }

    let heads = node.running_hashes().unwrap();
    assert_eq!(heads.last_round_hash, previous_round_hash);
    assert_eq!(heads.running_hash, previous_running_hash);

    // Dropping a record from a round breaks verification.
    let mut tampered: Vec<TransactionRecord> =
        results[0].records.iter().map(|record| (**record).clone()).collect();
    tampered.remove(1);
    assert!(verify_round(&Hash::ZERO, &Hash::ZERO, &tampered, &results[0].summary).is_err());
}

/// What a node restarted from the last committed snapshot would load.
fn saved(node: &ConsensusNode) -> Snapshot {
    let latest = node.latest_snapshot();
    Snapshot::restore(
        latest.version(),
        latest.round(),
        latest.consensus_time(),
        latest.iter().map(|(key, value)| (key.clone(), value.clone())),
    )
}

#[test]
fn test_restart_keeps_rejecting_duplicates() {
    let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();
    let first = consensus_round(RoundNumber(1), secs(101), vec![t1.clone()]);
    let again = consensus_round(RoundNumber(2), secs(102), vec![t1.clone()]);

    let continuous = node();
    continuous.on_round_received(&first).unwrap();
    let expected = continuous.on_round_received(&again).unwrap();

    let before = node();
    let original = before.on_round_received(&first).unwrap();
    let restarted = ConsensusNode::new(
        NodeConfig::default(),
        reference_handlers(),
        saved(&before),
        Arc::new(BufferedSubmitter::new(1_024)),
    )
    .unwrap();

    assert_eq!(
        restarted.transaction_record(t1.id()),
        Some(original.records[0].clone())
    );
    assert_eq!(
        restarted.submit_transaction_at(&t1.to_bytes(), secs(102)),
        Err(ResponseCode::DuplicateTransaction)
    );

    let result = restarted.on_round_received(&again).unwrap();
    assert_eq!(result.records[0].status, ResponseCode::DuplicateTransaction);
    assert_eq!(result.duplicates, original.records);
    assert_eq!(balances(&restarted), balances(&continuous));
    assert_eq!(result.snapshot.state_hash(), expected.snapshot.state_hash());
    assert_eq!(result.summary, expected.summary);
}

#[test]
fn test_redelivery_until_validity_ends_is_idempotent() {
    let node = node();
    // Valid for 120s from its start; the dedup window is 180s.
    let t1 = TxBuilder::transfer(ALICE, BOB, 10, secs(100)).signed_by_payer();
    let rounds = vec![
        (secs(101), vec![t1.clone()]),
        (secs(220), vec![t1.clone()]),
        (secs(221), vec![t1.clone()]),
        (secs(281), vec![t1.clone()]),
    ];

    let results = run(&node, &rounds);
    let statuses: Vec<ResponseCode> = results
        .iter()
        .map(|round| round.records[0].status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            ResponseCode::Success,
            ResponseCode::DuplicateTransaction,
            ResponseCode::TransactionExpired,
            ResponseCode::TransactionExpired,
        ]
    );
    assert_eq!(node.latest_snapshot().get::<Account>(&BOB).unwrap().unwrap().balance, 10);
    // Purged once the window closed; expired deliveries are never remembered.
    assert!(node.transaction_record(t1.id()).is_none());
}

#[test]
fn test_overlong_validity_never_executes() {
    let node = node();
    let long = TxBuilder::transfer(ALICE, BOB, 10, secs(100))
        .valid_duration_secs(10_000)
        .signed_by_payer();
    assert_eq!(
        node.submit_transaction_at(&long.to_bytes(), secs(100)),
        Err(ResponseCode::InvalidTransactionDuration)
    );

    // A faulty node may still put it into consensus, before and after the
    // dedup window would have passed.
    let results = run(&node, &[(secs(101), vec![long.clone()]), (secs(500), vec![long])]);
    for result in &results {
        assert_eq!(result.records[0].status, ResponseCode::InvalidTransactionDuration);
        assert_eq!(result.records[0].fee.charged_to, NODE_0_ACCOUNT);
    }
    assert_eq!(node.latest_snapshot().get::<Account>(&BOB).unwrap().unwrap().balance, 0);
}

//! Scheduled (deferred) transactions.

use crate::{
    AccountId, Partition, PublicKey, ScheduleId, StateRecord, Timestamp, TransactionBody,
    TransactionId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A transaction body waiting for its signing requirement to be met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTransaction {
    /// Schedule id.
    pub id: ScheduleId,
    /// Account that created the schedule.
    pub creator: AccountId,
    /// Account charged when the schedule triggers.
    pub payer: AccountId,
    /// Id of the creating transaction; the triggered child derives its id from it.
    pub creating_transaction: TransactionId,
    /// Body executed on trigger.
    pub body: TransactionBody,
    /// Keys that must sign before the body executes.
    pub required_keys: BTreeSet<PublicKey>,
    /// Keys that have signed so far.
    pub signatories: BTreeSet<PublicKey>,
    /// Consensus time after which the schedule is discarded.
    pub expiration_time: Timestamp,
}

impl ScheduledTransaction {
    /// Whether every required key has signed.
    pub fn is_ready(&self) -> bool {
        self.required_keys.is_subset(&self.signatories)
    }

    /// Whether the schedule has expired at consensus time `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expiration_time
    }

    /// Required keys that have not signed yet.
    pub fn missing_keys(&self) -> impl Iterator<Item = &PublicKey> {
        self.required_keys.difference(&self.signatories)
    }

    /// Id of the child transaction produced when the schedule triggers.
    pub fn scheduled_transaction_id(&self) -> TransactionId {
        self.creating_transaction.as_scheduled()
    }
}

impl StateRecord for ScheduledTransaction {
    const PARTITION: Partition = Partition::SCHEDULES;
    type Key = ScheduleId;
}

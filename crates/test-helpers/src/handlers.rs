//! Reference business handlers.
//!
//! Small but real implementations of the handler contract, enough to drive
//! the workflows end to end: balance transfers and account management,
//! scheduled transactions, and a handler that fails on purpose.

use concord_core::{
    ExecutionOutcome, HandleContext, HandlerError, ReadableState, ReadableStateExt,
    ServiceHandlers, TransactionHandler,
};
use concord_types::{
    Account, AccountAmount, AccountId, Partition, PublicKey, ResourceUsage, ResponseCode, ScheduleId,
    ScheduleOperation, ScheduledTransaction, TokenOperation, TransactionBody, TransactionKind,
};
use std::collections::{BTreeMap, BTreeSet};

fn account(state: &dyn ReadableState, id: AccountId) -> Result<Account, ResponseCode> {
    match state.get::<Account>(&id) {
        Ok(Some(account)) if !account.deleted => Ok(account),
        Ok(_) => Err(ResponseCode::InvalidAccountId),
        Err(_) => Err(ResponseCode::FailInvalid),
    }
}

const ACCOUNTS_SCOPE: &[Partition] = &[Partition::ACCOUNTS];
const SCHEDULES_SCOPE: &[Partition] = &[Partition::SCHEDULES];
const FILES_SCOPE: &[Partition] = &[Partition::FILES];

fn schedule(state: &dyn ReadableState, id: ScheduleId) -> Result<ScheduledTransaction, ResponseCode> {
    match state.get::<ScheduledTransaction>(&id) {
        Ok(Some(schedule)) => Ok(schedule),
        Ok(None) => Err(ResponseCode::InvalidScheduleId),
        Err(_) => Err(ResponseCode::FailInvalid),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Token
// ═══════════════════════════════════════════════════════════════════════════

/// Transfers, account creation and key rotation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CryptoHandler;

impl CryptoHandler {
    /// Balances after applying `transfers`, or the failure code.
    fn apply_transfers(
        state: &dyn ReadableState,
        transfers: &[AccountAmount],
    ) -> Result<BTreeMap<AccountId, Account>, ResponseCode> {
        let mut touched: BTreeMap<AccountId, Account> = BTreeMap::new();
        for transfer in transfers {
            let mut entry = match touched.remove(&transfer.account) {
                Some(entry) => entry,
                None => account(state, transfer.account)?,
            };
            entry.balance = if transfer.amount < 0 {
                entry
                    .balance
                    .checked_sub(transfer.amount.unsigned_abs())
                    .ok_or(ResponseCode::InsufficientAccountBalance)?
            } else {
                entry
                    .balance
                    .checked_add(transfer.amount as u64)
                    .ok_or(ResponseCode::InvalidAccountAmounts)?
            };
            touched.insert(transfer.account, entry);
        }
        Ok(touched)
    }
}

impl TransactionHandler for CryptoHandler {
    fn pure_checks(&self, body: &TransactionBody) -> Result<(), ResponseCode> {
        match body {
            TransactionBody::Token(TokenOperation::Transfer { transfers }) => {
                let sum: i128 = transfers.iter().map(|t| t.amount as i128).sum();
                if transfers.is_empty() || sum != 0 {
                    return Err(ResponseCode::InvalidAccountAmounts);
                }
                Ok(())
            }
            TransactionBody::Token(_) => Ok(()),
            _ => Err(ResponseCode::NotSupported),
        }
    }

    fn required_keys(
        &self,
        body: &TransactionBody,
        _payer: AccountId,
        state: &dyn ReadableState,
    ) -> Result<BTreeSet<PublicKey>, ResponseCode> {
        match body {
            TransactionBody::Token(TokenOperation::Transfer { transfers }) => transfers
                .iter()
                .filter(|t| t.amount < 0)
                .map(|t| account(state, t.account).map(|a| a.key))
                .collect(),
            TransactionBody::Token(TokenOperation::CreateAccount { .. }) => Ok(BTreeSet::new()),
            TransactionBody::Token(TokenOperation::UpdateKey { account: id, key }) => {
                let current = account(state, *id)?;
                Ok([current.key, *key].into_iter().collect())
            }
            _ => Err(ResponseCode::NotSupported),
        }
    }

    fn validate(&self, body: &TransactionBody, state: &dyn ReadableState) -> ResponseCode {
        match body {
            TransactionBody::Token(TokenOperation::Transfer { transfers }) => {
                match Self::apply_transfers(state, transfers) {
                    Ok(_) => ResponseCode::Ok,
                    Err(code) => code,
                }
            }
            TransactionBody::Token(TokenOperation::UpdateKey { account: id, .. }) => {
                match account(state, *id) {
                    Ok(_) => ResponseCode::Ok,
                    Err(code) => code,
                }
            }
            TransactionBody::Token(TokenOperation::CreateAccount { .. }) => ResponseCode::Ok,
            _ => ResponseCode::NotSupported,
        }
    }

    fn resource_usage(&self, body: &TransactionBody) -> ResourceUsage {
        match body {
            TransactionBody::Token(TokenOperation::CreateAccount { .. }) => ResourceUsage {
                storage_bytes: 64,
                ..Default::default()
            },
            _ => ResourceUsage::default(),
        }
    }

    fn scope(&self) -> &[Partition] {
        ACCOUNTS_SCOPE
    }

    fn execute(
        &self,
        body: &TransactionBody,
        ctx: &mut HandleContext<'_>,
    ) -> Result<ExecutionOutcome, HandlerError> {
        match body {
            TransactionBody::Token(TokenOperation::Transfer { transfers }) => {
                let touched = Self::apply_transfers(&*ctx, transfers)?;
                for (id, account) in &touched {
                    ctx.put(id, account)?;
                }
            }
            TransactionBody::Token(TokenOperation::CreateAccount {
                key,
                initial_balance,
            }) => {
                let mut payer = account(&*ctx, ctx.payer())?;
                payer.balance = payer
                    .balance
                    .checked_sub(*initial_balance)
                    .ok_or(ResponseCode::InsufficientAccountBalance)?;
                let id = AccountId(ctx.next_entity_id()?);
                ctx.put(&payer.id, &payer)?;
                ctx.put(&id, &Account::new(id, *key, *initial_balance))?;
            }
            TransactionBody::Token(TokenOperation::UpdateKey { account: id, key }) => {
                let mut updated = account(&*ctx, *id)?;
                updated.key = *key;
                ctx.put(id, &updated)?;
            }
            _ => return Err(ResponseCode::NotSupported.into()),
        }
        Ok(ExecutionOutcome::success(self.resource_usage(body)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Schedule
// ═══════════════════════════════════════════════════════════════════════════

/// Schedule create, sign and delete.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduleHandler;

impl TransactionHandler for ScheduleHandler {
    fn pure_checks(&self, body: &TransactionBody) -> Result<(), ResponseCode> {
        match body {
            TransactionBody::Schedule(ScheduleOperation::Create { body: inner, .. })
                if matches!(**inner, TransactionBody::Schedule(_)) =>
            {
                Err(ResponseCode::NotSupported)
            }
            TransactionBody::Schedule(_) => Ok(()),
            _ => Err(ResponseCode::NotSupported),
        }
    }

    fn required_keys(
        &self,
        body: &TransactionBody,
        _payer: AccountId,
        state: &dyn ReadableState,
    ) -> Result<BTreeSet<PublicKey>, ResponseCode> {
        match body {
            TransactionBody::Schedule(ScheduleOperation::Create { .. })
            | TransactionBody::Schedule(ScheduleOperation::Sign { .. }) => Ok(BTreeSet::new()),
            TransactionBody::Schedule(ScheduleOperation::Delete { schedule: id }) => {
                let schedule = schedule(state, *id)?;
                let creator = account(state, schedule.creator)?;
                Ok([creator.key].into_iter().collect())
            }
            _ => Err(ResponseCode::NotSupported),
        }
    }

    fn validate(&self, body: &TransactionBody, state: &dyn ReadableState) -> ResponseCode {
        match body {
            TransactionBody::Schedule(ScheduleOperation::Sign { schedule: id })
            | TransactionBody::Schedule(ScheduleOperation::Delete { schedule: id }) => {
                match schedule(state, *id) {
                    Ok(_) => ResponseCode::Ok,
                    Err(code) => code,
                }
            }
            TransactionBody::Schedule(ScheduleOperation::Create { .. }) => ResponseCode::Ok,
            _ => ResponseCode::NotSupported,
        }
    }

    fn scope(&self) -> &[Partition] {
        SCHEDULES_SCOPE
    }

    fn execute(
        &self,
        body: &TransactionBody,
        ctx: &mut HandleContext<'_>,
    ) -> Result<ExecutionOutcome, HandlerError> {
        match body {
            TransactionBody::Schedule(ScheduleOperation::Create {
                body: inner,
                payer,
                expiration_time,
            }) => {
                if *expiration_time <= ctx.consensus_time() {
                    return Err(
                        ResponseCode::ScheduleExpirationTimeMustBeHigherThanConsensusTime.into(),
                    );
                }
                let payer = payer.unwrap_or(ctx.payer());
                let payer_key = account(&*ctx, payer)?.key;
                let mut required_keys = ctx.required_keys_of(inner, payer)?;
                required_keys.insert(payer_key);
                let signatories = required_keys
                    .intersection(ctx.verified_keys())
                    .copied()
                    .collect();

                let id = ScheduleId(ctx.next_entity_id()?);
                let schedule = ScheduledTransaction {
                    id,
                    creator: ctx.payer(),
                    payer,
                    creating_transaction: ctx.transaction_id(),
                    body: (**inner).clone(),
                    required_keys,
                    signatories,
                    expiration_time: *expiration_time,
                };
                ctx.put(&id, &schedule)?;
            }
            TransactionBody::Schedule(ScheduleOperation::Sign { schedule: id }) => {
                let mut schedule = schedule(&*ctx, *id)?;
                let new: Vec<PublicKey> = schedule
                    .required_keys
                    .intersection(ctx.verified_keys())
                    .copied()
                    .collect();
                schedule.signatories.extend(new);
                ctx.put(id, &schedule)?;
            }
            TransactionBody::Schedule(ScheduleOperation::Delete { schedule: id }) => {
                schedule(&*ctx, *id)?;
                ctx.remove::<ScheduledTransaction>(id)?;
            }
            _ => return Err(ResponseCode::NotSupported.into()),
        }
        Ok(ExecutionOutcome::success(ResourceUsage::default()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Util and failure injection
// ═══════════════════════════════════════════════════════════════════════════

/// Accepts any body and changes nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl TransactionHandler for NoopHandler {
    fn required_keys(
        &self,
        _body: &TransactionBody,
        _payer: AccountId,
        _state: &dyn ReadableState,
    ) -> Result<BTreeSet<PublicKey>, ResponseCode> {
        Ok(BTreeSet::new())
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

/// How a [`FailingHandler`] fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Credit the payer, then fail with the code.
    AfterWrite(ResponseCode),
    /// Write to a partition outside the declared scope.
    OutOfScope,
    /// Report an unrecoverable fault.
    Fatal,
}

/// Handler that mutates state and then fails, for atomicity tests.
#[derive(Debug, Clone, Copy)]
pub struct FailingHandler {
    mode: FailureMode,
}

impl FailingHandler {
    /// Fail in `mode`.
    pub fn new(mode: FailureMode) -> Self {
        Self { mode }
    }
}

impl TransactionHandler for FailingHandler {
    fn required_keys(
        &self,
        _body: &TransactionBody,
        _payer: AccountId,
        _state: &dyn ReadableState,
    ) -> Result<BTreeSet<PublicKey>, ResponseCode> {
        Ok(BTreeSet::new())
    }

    fn scope(&self) -> &[Partition] {
        match self.mode {
            FailureMode::OutOfScope => FILES_SCOPE,
            _ => ACCOUNTS_SCOPE,
        }
    }

    fn execute(
        &self,
        _body: &TransactionBody,
        ctx: &mut HandleContext<'_>,
    ) -> Result<ExecutionOutcome, HandlerError> {
        let mut payer = account(&*ctx, ctx.payer())?;
        payer.balance = payer.balance.saturating_add(1_000_000);
        ctx.put(&payer.id, &payer)?;
        match self.mode {
            FailureMode::AfterWrite(code) => Err(code.into()),
            FailureMode::OutOfScope => Ok(ExecutionOutcome::success(ResourceUsage::default())),
            FailureMode::Fatal => Err(HandlerError::Fatal("injected fault".into())),
        }
    }
}

/// Token and schedule handlers plus a no-op util handler; every other
/// category is unsupported.
pub fn reference_handlers() -> ServiceHandlers {
    ServiceHandlers::new()
        .with(TransactionKind::Token, CryptoHandler)
        .with(TransactionKind::Schedule, ScheduleHandler)
        .with(TransactionKind::Util, NoopHandler)
}

//! Scheduled-transaction executor.

use crate::fees::FeeCharger;
use crate::HandleError;
use concord_core::{
    HandleContext, HandlerError, ReadableState, ReadableStateExt, ServiceHandlers,
    WritableStateExt,
};
use concord_state::WorkingView;
use concord_types::{
    Partition, ResponseCode, ScheduleId, ScheduledTransaction, Timestamp, TransactionRecord,
};
use tracing::debug;

/// What happened to one schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleAction {
    /// The signing requirement was met and the body ran as a child.
    Executed {
        schedule: ScheduleId,
        record: TransactionRecord,
    },
    /// The schedule expired and was removed.
    Expired {
        schedule: ScheduleId,
        record: TransactionRecord,
    },
}

impl ScheduleAction {
    /// The child record.
    pub fn record(&self) -> &TransactionRecord {
        match self {
            ScheduleAction::Executed { record, .. } | ScheduleAction::Expired { record, .. } => {
                record
            }
        }
    }

    /// Consume into the child record.
    pub fn into_record(self) -> TransactionRecord {
        match self {
            ScheduleAction::Executed { record, .. } | ScheduleAction::Expired { record, .. } => {
                record
            }
        }
    }
}

/// Runs ready schedules and discards expired ones.
///
/// Scans `SCHEDULES` in key order, so the result depends only on state and
/// consensus time. Each triggered schedule runs inside its own checkpoint
/// with the schedule payer charged, and is removed whatever its outcome.
pub struct ScheduleExecutor<'a> {
    handlers: &'a ServiceHandlers,
    charger: &'a FeeCharger,
    max_children: usize,
}

impl<'a> ScheduleExecutor<'a> {
    /// Create an executor that produces at most `max_children` actions per call.
    pub fn new(handlers: &'a ServiceHandlers, charger: &'a FeeCharger, max_children: usize) -> Self {
        Self {
            handlers,
            charger,
            max_children,
        }
    }

    /// Process every schedule that is expired or ready at `now`.
    pub fn process(
        &self,
        view: &mut WorkingView,
        now: Timestamp,
    ) -> Result<Vec<ScheduleAction>, HandleError> {
        let mut actions = Vec::new();
        for key in view.keys_in(&Partition::SCHEDULES) {
            let Some(schedule) = view.get_at::<ScheduledTransaction>(&key)? else {
                continue;
            };
            let due = schedule.is_expired(now) || schedule.is_ready();
            if !due {
                continue;
            }
            if actions.len() >= self.max_children {
                debug!(
                    limit = self.max_children,
                    status = %ResponseCode::MaxChildRecordsExceeded,
                    "Deferring remaining schedules"
                );
                break;
            }

            view.remove::<ScheduledTransaction>(&schedule.id);
            let action = if schedule.is_expired(now) {
                let mut record = TransactionRecord::new(
                    schedule.scheduled_transaction_id(),
                    now,
                    ResponseCode::ScheduleExpired,
                    schedule.payer,
                );
                record.schedule = Some(schedule.id);
                ScheduleAction::Expired {
                    schedule: schedule.id,
                    record,
                }
            } else {
                ScheduleAction::Executed {
                    schedule: schedule.id,
                    record: self.execute(view, &schedule, now)?,
                }
            };
            debug!(
                schedule = %schedule.id,
                status = %action.record().status,
                "Processed schedule"
            );
            actions.push(action);
        }
        Ok(actions)
    }

    fn execute(
        &self,
        view: &mut WorkingView,
        schedule: &ScheduledTransaction,
        now: Timestamp,
    ) -> Result<TransactionRecord, HandleError> {
        let id = schedule.scheduled_transaction_id();
        let handler = self.handlers.handler_for(&schedule.body);
        let usage = handler.resource_usage(&schedule.body);
        let fees = self.charger.schedule().compute(&usage);

        let mut record = TransactionRecord::new(id, now, ResponseCode::Success, schedule.payer);
        record.schedule = Some(schedule.id);
        record.usage = usage;

        let Some(charge) = self.charger.charge(view, schedule.payer, fees)? else {
            record.status = ResponseCode::InsufficientPayerBalance;
            return Ok(record);
        };
        record.fee = charge;

        let checkpoint = view.checkpoint();
        let status = match handler.validate(&schedule.body, &*view) {
            ResponseCode::Ok => {
                let mut ctx = HandleContext::new(
                    view,
                    handler.scope(),
                    self.handlers,
                    id,
                    schedule.payer,
                    now,
                    &schedule.signatories,
                );
                match handler.execute(&schedule.body, &mut ctx) {
                    Ok(outcome) if outcome.status.is_success() => {
                        record.usage = outcome.usage;
                        ResponseCode::Success
                    }
                    Ok(outcome) => outcome.status,
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
        } else {
            view.rollback(checkpoint)?;
        }
        record.status = status;
        Ok(record)
    }
}

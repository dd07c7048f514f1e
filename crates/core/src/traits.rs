//! The contract every business handler honours.

use crate::{HandleContext, HandlerError, ReadableState};
use concord_types::{
    AccountId, Partition, PublicKey, ResourceUsage, ResponseCode, TransactionBody,
};
use std::collections::BTreeSet;

/// Result of a successful `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Status to record; normally `SUCCESS`.
    pub status: ResponseCode,
    /// Resources actually consumed.
    pub usage: ResourceUsage,
}

impl ExecutionOutcome {
    /// Successful execution with the given usage.
    pub fn success(usage: ResourceUsage) -> Self {
        Self {
            status: ResponseCode::Success,
            usage,
        }
    }
}

/// Business logic for one transaction category.
///
/// Handlers are plain values wired into a [`crate::ServiceHandlers`] table
/// at construction time. Every method except `execute` must be pure: it may
/// be called speculatively, more than once, on any snapshot.
///
/// # Guarantees expected from implementors
///
/// - **Deterministic**: outputs depend only on the arguments and state
/// - **No I/O, no clocks**: consensus time comes from the context
/// - **Scoped**: `execute` only writes partitions listed in `scope()`
pub trait TransactionHandler: Send + Sync {
    /// Stateless checks on the body. Run at ingest and pre-handle.
    fn pure_checks(&self, _body: &TransactionBody) -> Result<(), ResponseCode> {
        Ok(())
    }

    /// Keys (besides the payer's) that must have signed the transaction.
    fn required_keys(
        &self,
        body: &TransactionBody,
        payer: AccountId,
        state: &dyn ReadableState,
    ) -> Result<BTreeSet<PublicKey>, ResponseCode>;

    /// State-dependent validation before any fee is charged for execution.
    fn validate(&self, _body: &TransactionBody, _state: &dyn ReadableState) -> ResponseCode {
        ResponseCode::Ok
    }

    /// Resources the body will consume. Fees are computed from this.
    fn resource_usage(&self, _body: &TransactionBody) -> ResourceUsage {
        ResourceUsage::default()
    }

    /// Partitions `execute` is allowed to write.
    fn scope(&self) -> &[Partition];

    /// Apply the body to the scoped working state.
    fn execute(
        &self,
        body: &TransactionBody,
        ctx: &mut HandleContext<'_>,
    ) -> Result<ExecutionOutcome, HandlerError>;
}

/// Handler for categories this network does not support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedHandler;

impl TransactionHandler for UnsupportedHandler {
    fn pure_checks(&self, _body: &TransactionBody) -> Result<(), ResponseCode> {
        Err(ResponseCode::NotSupported)
    }

    fn required_keys(
        &self,
        _body: &TransactionBody,
        _payer: AccountId,
        _state: &dyn ReadableState,
    ) -> Result<BTreeSet<PublicKey>, ResponseCode> {
        Err(ResponseCode::NotSupported)
    }

    fn validate(&self, _body: &TransactionBody, _state: &dyn ReadableState) -> ResponseCode {
        ResponseCode::NotSupported
    }

    fn scope(&self) -> &[Partition] {
        &[]
    }

    fn execute(
        &self,
        _body: &TransactionBody,
        _ctx: &mut HandleContext<'_>,
    ) -> Result<ExecutionOutcome, HandlerError> {
        Err(HandlerError::Failure(ResponseCode::NotSupported))
    }
}

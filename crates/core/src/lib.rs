//! Dispatch contract for the Concord pipeline.
//!
//! This crate defines the seams between the workflows and everything they
//! call into:
//!
//! - State access traits implemented by snapshots and the working view
//! - The [`TransactionHandler`] trait and the [`ServiceHandlers`] dispatch table
//! - The scoped [`HandleContext`] handlers execute in
//! - Signature verification and [`PreHandleResult`]
//! - The [`FeeSchedule`] and the [`SystemAccounts`] fees flow between

mod context;
mod dispatch;
mod error;
mod fees;
mod result;
mod signatures;
mod state;
mod traits;

pub use context::HandleContext;
pub use dispatch::ServiceHandlers;
pub use error::{HandlerError, StateError};
pub use fees::{transaction_usage, FeeSchedule, SystemAccounts};
pub use result::{PreHandleResult, PreHandleStatus};
pub use signatures::{verified_keys, verify_signatures, Verifications};
pub use state::{ReadableState, ReadableStateExt, StateValue, WritableState, WritableStateExt};
pub use traits::{ExecutionOutcome, TransactionHandler, UnsupportedHandler};

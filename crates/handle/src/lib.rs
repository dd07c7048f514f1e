//! Handle workflow.
//!
//! Applies consensus rounds to the working view one transaction at a time:
//!
//! 0. Node due diligence (validity window, submitting node, payer)
//! 1. Deduplication
//! 2. Authorization, reusing pre-handle results where still valid
//! 3. Consensus throttle
//! 4. Fee charging
//! 5. Validation and execution in a scoped, checkpointed view
//! 6. Rollback to the post-fee checkpoint on handler failure
//! 7. Commit, dedup entry and record
//! 8. Scheduled transactions triggered or expired, as child records
//!
//! Nothing here runs concurrently and nothing reads the wall clock.

mod config;
mod error;
mod fees;
mod phase;
mod schedule;
mod workflow;

pub use config::HandleConfig;
pub use error::HandleError;
pub use fees::FeeCharger;
pub use phase::TransactionPhase;
pub use schedule::{ScheduleAction, ScheduleExecutor};
pub use workflow::{HandleWorkflow, RoundOutput};

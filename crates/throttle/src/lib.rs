//! Deterministic admission control.
//!
//! Buckets leak as a function of the timestamps passed in, never of the
//! wall clock, so the same throttle code serves two purposes:
//!
//! - Handle drives it with consensus time and persists the levels in state,
//!   which makes throttle decisions identical on every node
//! - Ingest drives a separate instance with local time as a best-effort
//!   frontend filter, periodically adopting the consensus levels

mod accumulator;
mod bucket;

pub use accumulator::{ThrottleAccumulator, ThrottleConfig, ThrottleUsage};
pub use bucket::{BucketConfig, BucketUsage, LeakyBucket, UNITS_PER_OP};

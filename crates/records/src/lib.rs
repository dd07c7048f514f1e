//! Hash-linked record stream.
//!
//! Handle appends one record per top-level transaction in commit order. At
//! each round boundary the builder emits a [`concord_types::RoundSummary`]
//! binding the round's records (running hash and Merkle root) to the
//! previous round's summary. [`verify_round`] lets anyone replay that chain.

mod error;
mod stream;
mod verify;

pub use error::StreamError;
pub use stream::{RecordStreamBuilder, RunningHashes};
pub use verify::{record_proofs, verify_record_inclusion, verify_round};

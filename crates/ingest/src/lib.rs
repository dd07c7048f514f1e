//! Ingest: admission of client transactions into consensus.
//!
//! Ingest only ever reads immutable snapshots. It rejects early whatever
//! handle would reject anyway, so the network does not spend consensus
//! bandwidth on it, and forwards the rest to the consensus layer through a
//! [`ConsensusSubmitter`].

mod config;
mod submitter;
mod workflow;

pub use config::IngestConfig;
pub use submitter::{BufferedSubmitter, ConsensusSubmitter, IngestError};
pub use workflow::IngestWorkflow;

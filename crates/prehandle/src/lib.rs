//! Pre-handle workflow.
//!
//! Runs ahead of handle, as soon as the consensus layer learns of a
//! transaction, and does the expensive stateless work in parallel:
//! signature verification, payer resolution and required-key computation.
//! Handle reuses a result when it still applies and recomputes it against the
//! working view when it does not, so nothing computed here is trusted
//! blindly.

mod reader;
mod workflow;

pub use reader::RecordingReader;
pub use workflow::PreHandleWorkflow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pre-handle configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreHandleConfig {
    /// Worker threads; 0 uses one per core.
    pub threads: usize,
}

/// Errors constructing the pre-handle workflow.
#[derive(Debug, Error)]
pub enum PreHandleError {
    #[error("failed to build pre-handle thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

//! Ingest limits.

use concord_types::NodeId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied to client submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// This node. Submissions naming another node are rejected.
    pub node: NodeId,
    /// Largest accepted wire encoding.
    pub max_transaction_bytes: usize,
    /// How far in the future a valid start may lie.
    pub max_clock_skew_secs: u64,
    /// Shortest accepted validity window.
    pub min_valid_duration_secs: u64,
    /// Longest accepted validity window. Must not exceed the dedup window.
    pub max_valid_duration_secs: u64,
    /// Longest accepted memo, in bytes.
    pub max_memo_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            node: NodeId(0),
            max_transaction_bytes: 6_144,
            max_clock_skew_secs: 10,
            min_valid_duration_secs: 15,
            max_valid_duration_secs: 180,
            max_memo_bytes: 100,
        }
    }
}

impl IngestConfig {
    /// Config for `node` with default limits.
    pub fn for_node(node: NodeId) -> Self {
        Self {
            node,
            ..Self::default()
        }
    }

    /// Set the maximum wire size.
    pub fn with_max_transaction_bytes(mut self, bytes: usize) -> Self {
        self.max_transaction_bytes = bytes;
        self
    }

    /// Set the tolerated clock skew.
    pub fn with_max_clock_skew_secs(mut self, secs: u64) -> Self {
        self.max_clock_skew_secs = secs;
        self
    }

    pub(crate) fn max_clock_skew(&self) -> Duration {
        Duration::from_secs(self.max_clock_skew_secs)
    }

    pub(crate) fn accepts_duration(&self, secs: u64) -> bool {
        (self.min_valid_duration_secs..=self.max_valid_duration_secs).contains(&secs)
    }
}

//! Handle configuration.

use serde::{Deserialize, Serialize};

/// Limits applied while handling a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandleConfig {
    /// Maximum child transactions (triggered or expired schedules) attached
    /// to one top-level transaction. The rest wait for the next transaction.
    pub max_child_transactions: usize,
    /// Shortest validity window a transaction may declare.
    pub min_valid_duration_secs: u64,
    /// Longest validity window a transaction may declare. Must not exceed
    /// the dedup window, or an id could be forgotten while still valid.
    pub max_valid_duration_secs: u64,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            max_child_transactions: 10,
            min_valid_duration_secs: 15,
            max_valid_duration_secs: 180,
        }
    }
}

impl HandleConfig {
    /// Set the child transaction limit.
    pub fn with_max_child_transactions(mut self, max: usize) -> Self {
        self.max_child_transactions = max;
        self
    }

    /// Set the accepted validity window bounds, inclusive.
    pub fn with_valid_duration(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.min_valid_duration_secs = min_secs;
        self.max_valid_duration_secs = max_secs;
        self
    }

    pub(crate) fn accepts_duration(&self, secs: u64) -> bool {
        (self.min_valid_duration_secs..=self.max_valid_duration_secs).contains(&secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_bounds_are_inclusive() {
        let config = HandleConfig::default().with_valid_duration(15, 180);
        assert!(config.accepts_duration(15));
        assert!(config.accepts_duration(180));
        assert!(!config.accepts_duration(14));
        assert!(!config.accepts_duration(181));
    }
}

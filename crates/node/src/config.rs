//! Node configuration.
//!
//! One TOML document, every section optional:
//!
//! ```toml
//! id = 0
//!
//! [ingest]
//! max_clock_skew_secs = 10
//!
//! [throttle.default]
//! ops_per_sec = 500
//! burst = 1000
//!
//! [dedup]
//! window_secs = 180
//! ```

use crate::iss::IssConfig;
use concord_core::{FeeSchedule, SystemAccounts};
use concord_dedup::DedupConfig;
use concord_handle::HandleConfig;
use concord_ingest::IngestConfig;
use concord_prehandle::PreHandleConfig;
use concord_state::DEFAULT_MAX_UNSIGNED_SNAPSHOTS;
use concord_throttle::ThrottleConfig;
use concord_types::NodeId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Retention of committed snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Committed snapshots kept while waiting for a signature.
    pub max_unsigned_snapshots: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_unsigned_snapshots: DEFAULT_MAX_UNSIGNED_SNAPSHOTS,
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's id. Overrides `ingest.node`.
    pub id: NodeId,
    /// Funding and node accounts.
    pub accounts: SystemAccounts,
    pub ingest: IngestConfig,
    pub throttle: ThrottleConfig,
    pub fees: FeeSchedule,
    pub dedup: DedupConfig,
    pub prehandle: PreHandleConfig,
    pub handle: HandleConfig,
    pub state: StateConfig,
    pub iss: IssConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: NodeId(0),
            accounts: SystemAccounts::default(),
            ingest: IngestConfig::default(),
            throttle: ThrottleConfig::default(),
            fees: FeeSchedule::default(),
            dedup: DedupConfig::default(),
            prehandle: PreHandleConfig::default(),
            handle: HandleConfig::default(),
            state: StateConfig::default(),
            iss: IssConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check cross-section constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingest.min_valid_duration_secs > self.ingest.max_valid_duration_secs {
            return Err(ConfigError::Invalid(format!(
                "ingest.min_valid_duration_secs ({}) exceeds ingest.max_valid_duration_secs ({})",
                self.ingest.min_valid_duration_secs, self.ingest.max_valid_duration_secs
            )));
        }
        // A transaction must stay in the dedup cache for as long as it can
        // still reach consensus.
        if self.ingest.max_valid_duration_secs > self.dedup.window_secs {
            return Err(ConfigError::Invalid(format!(
                "dedup.window_secs ({}) is shorter than ingest.max_valid_duration_secs ({})",
                self.dedup.window_secs, self.ingest.max_valid_duration_secs
            )));
        }
        if self.iss.own_weight > self.iss.total_weight {
            return Err(ConfigError::Invalid(format!(
                "iss.own_weight ({}) exceeds iss.total_weight ({})",
                self.iss.own_weight, self.iss.total_weight
            )));
        }
        Ok(())
    }

    /// Ingest limits bound to this node's id.
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            node: self.id,
            ..self.ingest.clone()
        }
    }

    /// Handle limits, with the validity window bounds ingest enforces.
    pub fn handle_config(&self) -> HandleConfig {
        self.handle.clone().with_valid_duration(
            self.ingest.min_valid_duration_secs,
            self.ingest.max_valid_duration_secs,
        )
    }
}

//! Per-category throttle accumulator.

use crate::bucket::{BucketConfig, BucketUsage, LeakyBucket};
use concord_types::{SingletonRecord, Timestamp, TransactionKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Throttle limits per transaction category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Limits for categories without an override.
    pub default: BucketConfig,
    /// Per-category limits.
    pub overrides: BTreeMap<TransactionKind, BucketConfig>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            default: BucketConfig::default(),
            overrides: BTreeMap::new(),
        }
    }
}

impl ThrottleConfig {
    /// Same limits for every category.
    pub fn uniform(ops_per_sec: u64, burst: u64) -> Self {
        Self {
            default: BucketConfig { ops_per_sec, burst },
            overrides: BTreeMap::new(),
        }
    }

    /// Override the limits of one category.
    pub fn with_override(mut self, kind: TransactionKind, ops_per_sec: u64, burst: u64) -> Self {
        self.overrides
            .insert(kind, BucketConfig { ops_per_sec, burst });
        self
    }

    /// Limits that apply to `kind`.
    pub fn for_kind(&self, kind: TransactionKind) -> BucketConfig {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }
}

/// Bucket levels of every category, persisted in state at round end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleUsage {
    /// Usage per category.
    pub buckets: BTreeMap<TransactionKind, BucketUsage>,
}

impl SingletonRecord for ThrottleUsage {
    const NAME: &'static str = "throttle_usage";
}

/// One leaky bucket per transaction category.
#[derive(Debug, Clone)]
pub struct ThrottleAccumulator {
    buckets: BTreeMap<TransactionKind, LeakyBucket>,
}

impl ThrottleAccumulator {
    /// Empty buckets with the configured limits.
    pub fn new(config: &ThrottleConfig) -> Self {
        let buckets = TransactionKind::ALL
            .iter()
            .map(|&kind| (kind, LeakyBucket::new(config.for_kind(kind))))
            .collect();
        Self { buckets }
    }

    /// Buckets with the configured limits and previously persisted levels.
    pub fn from_usage(config: &ThrottleConfig, usage: &ThrottleUsage) -> Self {
        let mut accumulator = Self::new(config);
        accumulator.restore(usage);
        accumulator
    }

    /// Admit one operation of `kind` at `now`.
    ///
    /// Returns `false` if the category's bucket is full; nothing is consumed
    /// in that case.
    pub fn try_admit(&mut self, kind: TransactionKind, now: Timestamp) -> bool {
        let Some(bucket) = self.buckets.get_mut(&kind) else {
            return true;
        };
        let admitted = bucket.try_consume(now, 1);
        trace!(kind = %kind, admitted, level = bucket.level(), "Throttle check");
        admitted
    }

    /// Current level of `kind`'s bucket in units.
    pub fn level(&self, kind: TransactionKind) -> u64 {
        self.buckets.get(&kind).map_or(0, LeakyBucket::level)
    }

    /// Snapshot of every bucket's usage.
    pub fn usage(&self) -> ThrottleUsage {
        ThrottleUsage {
            buckets: self
                .buckets
                .iter()
                .map(|(kind, bucket)| (*kind, bucket.usage()))
                .collect(),
        }
    }

    /// Adopt persisted usage. Categories missing from `usage` keep theirs.
    pub fn restore(&mut self, usage: &ThrottleUsage) {
        for (kind, bucket_usage) in &usage.buckets {
            if let Some(bucket) = self.buckets.get_mut(kind) {
                bucket.restore(*bucket_usage);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_are_independent() {
        let mut throttle = ThrottleAccumulator::new(&ThrottleConfig::uniform(1, 1));
        let now = Timestamp::from_secs(1);

        assert!(throttle.try_admit(TransactionKind::Token, now));
        assert!(!throttle.try_admit(TransactionKind::Token, now));
        assert!(throttle.try_admit(TransactionKind::File, now));
    }

    #[test]
    fn test_override_applies_to_one_category() {
        let config = ThrottleConfig::uniform(1, 1).with_override(TransactionKind::Util, 1, 3);
        let mut throttle = ThrottleAccumulator::new(&config);
        let now = Timestamp::from_secs(1);

        for _ in 0..3 {
            assert!(throttle.try_admit(TransactionKind::Util, now));
        }
        assert!(!throttle.try_admit(TransactionKind::Util, now));
    }

    #[test]
    fn test_usage_roundtrip_reproduces_decisions() {
        let config = ThrottleConfig::uniform(2, 2);
        let mut a = ThrottleAccumulator::new(&config);
        a.try_admit(TransactionKind::Token, Timestamp::from_secs(1));
        a.try_admit(TransactionKind::Token, Timestamp::from_secs(1));

        let mut b = ThrottleAccumulator::from_usage(&config, &a.usage());
        let later = Timestamp::from_secs(1).plus_nanos(500_000_000);
        assert_eq!(
            a.try_admit(TransactionKind::Token, later),
            b.try_admit(TransactionKind::Token, later)
        );
        assert_eq!(a.usage(), b.usage());
    }

    #[test]
    fn test_config_from_toml() {
        let config: ThrottleConfig = toml::from_str(
            r#"
            default = { ops_per_sec = 10, burst = 20 }

            [overrides]
            token = { ops_per_sec = 1, burst = 2 }
            "#,
        )
        .unwrap();
        assert_eq!(config.for_kind(TransactionKind::Token).burst, 2);
        assert_eq!(config.for_kind(TransactionKind::File).ops_per_sec, 10);
    }
}

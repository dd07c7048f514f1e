//! Integer leaky bucket driven by an external clock.

use concord_types::Timestamp;
use serde::{Deserialize, Serialize};

/// Units one operation occupies in a bucket.
///
/// A bucket leaking `ops_per_sec` operations per second leaks `ops_per_sec`
/// units per nanosecond, so levels stay exact integers.
pub const UNITS_PER_OP: u64 = 1_000_000_000;

/// Configuration of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Sustained operations per second.
    pub ops_per_sec: u64,
    /// Operations admitted back-to-back from an empty bucket.
    pub burst: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            ops_per_sec: 500,
            burst: 1_000,
        }
    }
}

/// Persistable level of one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketUsage {
    /// Units currently in the bucket.
    pub level: u64,
    /// Time up to which leakage has been applied.
    pub last_leak: Timestamp,
}

/// A leaky bucket.
///
/// Unlike a wall-clock token bucket, time only moves when the caller says so:
/// the level is a pure function of previous usage, the timestamps passed in
/// and the operations admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakyBucket {
    capacity: u64,
    leak_per_nano: u64,
    usage: BucketUsage,
}

impl LeakyBucket {
    /// Create an empty bucket.
    pub fn new(config: BucketConfig) -> Self {
        Self {
            capacity: config.burst.saturating_mul(UNITS_PER_OP),
            leak_per_nano: config.ops_per_sec,
            usage: BucketUsage::default(),
        }
    }

    /// Capacity in units.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Current level in units.
    pub fn level(&self) -> u64 {
        self.usage.level
    }

    /// Current usage, for persistence.
    pub fn usage(&self) -> BucketUsage {
        self.usage
    }

    /// Replace the usage, clamping the level to this bucket's capacity.
    pub fn restore(&mut self, usage: BucketUsage) {
        self.usage = BucketUsage {
            level: usage.level.min(self.capacity),
            last_leak: usage.last_leak,
        };
    }

    /// Apply leakage up to `now`. Times before the last leak are ignored.
    pub fn leak_until(&mut self, now: Timestamp) {
        if now <= self.usage.last_leak {
            return;
        }
        let elapsed = now.as_nanos() - self.usage.last_leak.as_nanos();
        let leaked = elapsed.saturating_mul(self.leak_per_nano);
        self.usage.level = self.usage.level.saturating_sub(leaked);
        self.usage.last_leak = now;
    }

    /// Leak up to `now`, then admit `ops` operations if they fit.
    pub fn try_consume(&mut self, now: Timestamp, ops: u64) -> bool {
        self.leak_until(now);
        let cost = ops.saturating_mul(UNITS_PER_OP);
        match self.usage.level.checked_add(cost) {
            Some(level) if level <= self.capacity => {
                self.usage.level = level;
                true
            }
            _ => false,
        }
    }
}

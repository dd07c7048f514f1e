//! Typed view over the partitioned key-value state.
//!
//! State is an ordered map from [`StateKey`] to canonical value bytes. Each
//! key lives in a named [`Partition`]. Domain types opt in by implementing
//! [`StateRecord`] (keyed records) or [`SingletonRecord`] (one value per
//! partition entry in `SYSTEM`), which fixes both the partition and the key
//! encoding at compile time.

use crate::{AccountId, ContractId, FileId, Hash, NodeId, ScheduleId, TopicId, TransactionId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Name of a state partition.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Partition(Cow<'static, str>);

impl Partition {
    /// Account balances and keys.
    pub const ACCOUNTS: Partition = Partition::new("ACCOUNTS");
    /// Pending scheduled transactions.
    pub const SCHEDULES: Partition = Partition::new("SCHEDULES");
    /// Files.
    pub const FILES: Partition = Partition::new("FILES");
    /// Consensus topics.
    pub const TOPICS: Partition = Partition::new("TOPICS");
    /// Node-level singletons (throttle usage, running hashes, entity counter).
    pub const SYSTEM: Partition = Partition::new("SYSTEM");
    /// Outcomes of transactions still inside the deduplication window.
    pub const RECORD_CACHE: Partition = Partition::new("RECORD_CACHE");

    /// Create a partition name.
    pub const fn new(name: &'static str) -> Self {
        Partition(Cow::Borrowed(name))
    }

    /// The partition name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Partition({})", self.0)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully qualified state key.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    /// Owning partition.
    pub partition: Partition,
    /// Encoded key within the partition.
    pub key: Vec<u8>,
}

impl StateKey {
    /// Create a state key.
    pub fn new(partition: Partition, key: Vec<u8>) -> Self {
        Self { partition, key }
    }

    /// Smallest key of a partition, for range scans.
    pub fn partition_start(partition: &Partition) -> Self {
        Self {
            partition: partition.clone(),
            key: Vec::new(),
        }
    }
}

impl fmt::Debug for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, hex::encode(&self.key))
    }
}

/// Encoding of a record key into key bytes.
///
/// Numeric ids are big-endian so that byte order equals numeric order, which
/// keeps partition scans (e.g. schedules) in ascending id order.
pub trait KeyEncoding {
    /// Encode the key.
    fn encode_key(&self) -> Vec<u8>;
}

macro_rules! impl_u64_key {
    ($($ty:ty),*) => {
        $(
            impl KeyEncoding for $ty {
                fn encode_key(&self) -> Vec<u8> {
                    self.0.to_be_bytes().to_vec()
                }
            }
        )*
    };
}

impl_u64_key!(AccountId, ScheduleId, FileId, TopicId, ContractId, NodeId);

impl KeyEncoding for TransactionId {
    fn encode_key(&self) -> Vec<u8> {
        let mut key = Vec::with_capacity(21);
        key.extend_from_slice(&self.payer.0.to_be_bytes());
        key.extend_from_slice(&self.valid_start.as_nanos().to_be_bytes());
        key.extend_from_slice(&self.nonce.to_be_bytes());
        key.push(u8::from(self.scheduled));
        key
    }
}

/// A keyed value stored in a fixed partition.
pub trait StateRecord: Serialize + DeserializeOwned {
    /// Partition holding records of this type.
    const PARTITION: Partition;

    /// Key type.
    type Key: KeyEncoding;

    /// Fully qualified key for `key`.
    fn state_key(key: &Self::Key) -> StateKey {
        StateKey::new(Self::PARTITION, key.encode_key())
    }
}

/// A single value stored under a fixed name in the `SYSTEM` partition.
pub trait SingletonRecord: Serialize + DeserializeOwned {
    /// Name of the singleton.
    const NAME: &'static str;

    /// Fully qualified key.
    fn state_key() -> StateKey {
        StateKey::new(Partition::SYSTEM, Self::NAME.as_bytes().to_vec())
    }
}

/// Canonical encoding of a state value.
pub fn encode_value<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("state value serialization should never fail")
}

/// Decode a state value.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode::deserialize(bytes)
}

/// A single key's net change within a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    /// Changed key.
    pub key: StateKey,
    /// Hash of the new value, or `None` if the key was removed.
    pub value_hash: Option<Hash>,
}

/// Monotonic counter for newly created entities (accounts, schedules, files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCounter {
    /// Next number to hand out.
    pub next: u64,
}

impl Default for EntityCounter {
    fn default() -> Self {
        // Numbers below 1000 are reserved for system accounts.
        Self { next: 1001 }
    }
}

impl SingletonRecord for EntityCounter {
    const NAME: &'static str = "entity_counter";
}

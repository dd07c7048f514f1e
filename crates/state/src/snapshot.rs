//! Immutable state snapshots.

use concord_core::{ReadableState, StateValue};
use concord_types::{signing::DOMAIN_STATE_HASH, Hash, Partition, RoundNumber, StateKey, Timestamp};
use im::OrdMap;
use std::sync::OnceLock;

/// Immutable view of state as of a committed version.
///
/// Backed by a persistent ordered map, so creating a snapshot from a working
/// view shares structure with the previous version instead of copying it.
#[derive(Debug)]
pub struct Snapshot {
    version: u64,
    round: RoundNumber,
    consensus_time: Timestamp,
    entries: OrdMap<StateKey, StateValue>,
    state_hash: OnceLock<Hash>,
}

impl Snapshot {
    /// Version 0 with the given entries.
    pub fn genesis(entries: impl IntoIterator<Item = (StateKey, StateValue)>) -> Self {
        Self::new(
            0,
            RoundNumber::GENESIS,
            Timestamp::EPOCH,
            entries.into_iter().collect(),
        )
    }

    /// A snapshot saved by an earlier run, resumed at the same version.
    pub fn restore(
        version: u64,
        round: RoundNumber,
        consensus_time: Timestamp,
        entries: impl IntoIterator<Item = (StateKey, StateValue)>,
    ) -> Self {
        Self::new(version, round, consensus_time, entries.into_iter().collect())
    }

    pub(crate) fn new(
        version: u64,
        round: RoundNumber,
        consensus_time: Timestamp,
        entries: OrdMap<StateKey, StateValue>,
    ) -> Self {
        Self {
            version,
            round,
            consensus_time,
            entries,
            state_hash: OnceLock::new(),
        }
    }

    /// Commit version. Increases by one per committed working view.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Round whose handling produced this snapshot.
    pub fn round(&self) -> RoundNumber {
        self.round
    }

    /// Last consensus time applied to this snapshot.
    pub fn consensus_time(&self) -> Timestamp {
        self.consensus_time
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &StateValue)> {
        self.entries.iter()
    }

    pub(crate) fn entries(&self) -> &OrdMap<StateKey, StateValue> {
        &self.entries
    }

    /// Deterministic hash over every entry in key order.
    ///
    /// Two nodes that handled the same rounds from the same genesis report the
    /// same hash; anything else is an ISS.
    pub fn state_hash(&self) -> Hash {
        *self.state_hash.get_or_init(|| hash_entries(&self.entries))
    }
}

impl ReadableState for Snapshot {
    fn get_raw(&self, key: &StateKey) -> Option<StateValue> {
        self.entries.get(key).cloned()
    }

    fn keys_in(&self, partition: &Partition) -> Vec<StateKey> {
        keys_in(&self.entries, partition)
    }
}

pub(crate) fn keys_in(entries: &OrdMap<StateKey, StateValue>, partition: &Partition) -> Vec<StateKey> {
    entries
        .range(StateKey::partition_start(partition)..)
        .take_while(|(key, _)| &key.partition == partition)
        .map(|(key, _)| key.clone())
        .collect()
}

fn hash_entries(entries: &OrdMap<StateKey, StateValue>) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_STATE_HASH);
    hasher.update(&(entries.len() as u64).to_le_bytes());
    for (key, value) in entries.iter() {
        // Length prefixes keep (partition, key, value) boundaries unambiguous.
        let partition = key.partition.name().as_bytes();
        hasher.update(&(partition.len() as u64).to_le_bytes());
        hasher.update(partition);
        hasher.update(&(key.key.len() as u64).to_le_bytes());
        hasher.update(&key.key);
        hasher.update(&(value.len() as u64).to_le_bytes());
        hasher.update(value);
    }
    Hash::from_raw(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_types::{AccountId, KeyEncoding, ScheduleId};
    use std::sync::Arc;

    fn entry(partition: Partition, key: Vec<u8>, value: &[u8]) -> (StateKey, StateValue) {
        (StateKey::new(partition, key), Arc::from(value))
    }

    #[test]
    fn test_state_hash_is_order_independent_of_insertion() {
        let a = entry(Partition::ACCOUNTS, AccountId(1).encode_key(), b"a");
        let b = entry(Partition::ACCOUNTS, AccountId(2).encode_key(), b"b");

        let one = Snapshot::genesis(vec![a.clone(), b.clone()]);
        let two = Snapshot::genesis(vec![b, a]);
        assert_eq!(one.state_hash(), two.state_hash());
    }

    #[test]
    fn test_state_hash_binds_values_and_boundaries() {
        let base = Snapshot::genesis(vec![entry(Partition::ACCOUNTS, vec![1], b"xy")]);
        let value = Snapshot::genesis(vec![entry(Partition::ACCOUNTS, vec![1], b"xz")]);
        let shifted = Snapshot::genesis(vec![entry(Partition::ACCOUNTS, vec![1, b'x'], b"y")]);

        assert_ne!(base.state_hash(), value.state_hash());
        assert_ne!(base.state_hash(), shifted.state_hash());
    }

    #[test]
    fn test_keys_in_stays_within_partition() {
        let snapshot = Snapshot::genesis(vec![
            entry(Partition::ACCOUNTS, AccountId(9).encode_key(), b"a"),
            entry(Partition::SCHEDULES, ScheduleId(2).encode_key(), b"s2"),
            entry(Partition::SCHEDULES, ScheduleId(1).encode_key(), b"s1"),
            entry(Partition::SYSTEM, b"x".to_vec(), b"x"),
        ]);

        let keys = snapshot.keys_in(&Partition::SCHEDULES);
        assert_eq!(
            keys,
            vec![
                StateKey::new(Partition::SCHEDULES, ScheduleId(1).encode_key()),
                StateKey::new(Partition::SCHEDULES, ScheduleId(2).encode_key()),
            ]
        );
        assert!(snapshot.keys_in(&Partition::FILES).is_empty());
    }

    #[test]
    fn test_restored_snapshot_keeps_position_and_hash() {
        let saved = Snapshot::new(
            7,
            RoundNumber(5),
            Timestamp::from_secs(42),
            [entry(Partition::ACCOUNTS, AccountId(1).encode_key(), b"a")]
                .into_iter()
                .collect(),
        );

        let restored = Snapshot::restore(
            saved.version(),
            saved.round(),
            saved.consensus_time(),
            saved.iter().map(|(key, value)| (key.clone(), value.clone())),
        );
        assert_eq!(restored.version(), 7);
        assert_eq!(restored.round(), RoundNumber(5));
        assert_eq!(restored.consensus_time(), Timestamp::from_secs(42));
        assert_eq!(restored.state_hash(), saved.state_hash());
    }
}

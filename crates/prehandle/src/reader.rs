//! Read recording over an immutable state view.

use concord_core::{ReadableState, StateValue};
use concord_types::{Partition, StateKey};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// Wraps a state view and remembers every point read with the value seen,
/// and every partition scanned.
///
/// Handle uses both to decide whether a pre-handle result is still valid
/// after earlier transactions in the round wrote to state. A scan depends on
/// keys that did not exist yet, so any write to a scanned partition counts.
/// Interior mutability keeps the wrapper usable through `&dyn ReadableState`.
pub struct RecordingReader<'a> {
    inner: &'a dyn ReadableState,
    reads: RefCell<BTreeMap<StateKey, Option<StateValue>>>,
    scans: RefCell<BTreeSet<Partition>>,
}

impl<'a> RecordingReader<'a> {
    /// Start recording reads against `inner`.
    pub fn new(inner: &'a dyn ReadableState) -> Self {
        Self {
            inner,
            reads: RefCell::new(BTreeMap::new()),
            scans: RefCell::new(BTreeSet::new()),
        }
    }

    /// Stop recording and return the point reads and scanned partitions.
    pub fn into_parts(self) -> (BTreeMap<StateKey, Option<StateValue>>, BTreeSet<Partition>) {
        (self.reads.into_inner(), self.scans.into_inner())
    }
}

impl ReadableState for RecordingReader<'_> {
    fn get_raw(&self, key: &StateKey) -> Option<StateValue> {
        let value = self.inner.get_raw(key);
        self.reads
            .borrow_mut()
            .entry(key.clone())
            .or_insert_with(|| value.clone());
        value
    }

    fn keys_in(&self, partition: &Partition) -> Vec<StateKey> {
        self.scans.borrow_mut().insert(partition.clone());
        self.inner.keys_in(partition)
    }
}

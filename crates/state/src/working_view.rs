//! The mutable working view owned by handle for one round.

use crate::snapshot::{keys_in, Snapshot};
use concord_core::{ReadableState, StateError, StateValue, WritableState};
use concord_types::{Hash, Partition, StateChange, StateKey};
use im::{OrdMap, OrdSet};
use indexmap::IndexSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Position on the savepoint stack.
///
/// Rolling back or releasing a checkpoint also discards every checkpoint
/// taken after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint(usize);

impl Checkpoint {
    /// Stack depth at which the checkpoint sits.
    pub fn depth(&self) -> usize {
        self.0
    }
}

/// The transaction currently open on the view.
struct OpenTransaction {
    entries_at_start: OrdMap<StateKey, StateValue>,
    savepoint_base: usize,
    touched: IndexSet<StateKey>,
}

/// Clears the store's open-view flag when the view goes away.
pub(crate) struct ViewGuard(pub(crate) Arc<AtomicBool>);

impl Drop for ViewGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Mutable view over the latest committed snapshot.
///
/// Writes are applied to a persistent map, so savepoints are O(1) clones and
/// rollback is a pointer swap. The view is never visible to readers other
/// than handle; it becomes a [`Snapshot`] only through
/// [`crate::StateStore::commit`].
pub struct WorkingView {
    base: Arc<Snapshot>,
    entries: OrdMap<StateKey, StateValue>,
    savepoints: Vec<OrdMap<StateKey, StateValue>>,
    transaction: Option<OpenTransaction>,
    round_writes: OrdSet<StateKey>,
    _guard: ViewGuard,
}

impl WorkingView {
    pub(crate) fn new(base: Arc<Snapshot>, guard: ViewGuard) -> Self {
        Self {
            entries: base.entries().clone(),
            base,
            savepoints: Vec::new(),
            transaction: None,
            round_writes: OrdSet::new(),
            _guard: guard,
        }
    }

    /// Snapshot the view was opened on.
    pub fn base(&self) -> &Arc<Snapshot> {
        &self.base
    }

    /// Version of the base snapshot.
    pub fn base_version(&self) -> u64 {
        self.base.version()
    }

    pub(crate) fn into_parts(self) -> (OrdMap<StateKey, StateValue>, ViewGuard) {
        (self.entries, self._guard)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Savepoint stack
    // ═══════════════════════════════════════════════════════════════════════

    /// Push a savepoint capturing the current contents.
    pub fn checkpoint(&mut self) -> Checkpoint {
        self.savepoints.push(self.entries.clone());
        Checkpoint(self.savepoints.len() - 1)
    }

    /// Restore the contents captured by `checkpoint` and pop it (and every
    /// later checkpoint) off the stack.
    pub fn rollback(&mut self, checkpoint: Checkpoint) -> Result<(), StateError> {
        if checkpoint.0 >= self.savepoints.len() {
            return Err(StateError::UnknownCheckpoint(checkpoint.0));
        }
        self.savepoints.truncate(checkpoint.0 + 1);
        if let Some(saved) = self.savepoints.pop() {
            self.entries = saved;
        }
        trace!(depth = checkpoint.0, "Rolled back to checkpoint");
        Ok(())
    }

    /// Keep the current contents and pop `checkpoint` (and every later
    /// checkpoint) off the stack.
    pub fn release(&mut self, checkpoint: Checkpoint) -> Result<(), StateError> {
        if checkpoint.0 >= self.savepoints.len() {
            return Err(StateError::UnknownCheckpoint(checkpoint.0));
        }
        self.savepoints.truncate(checkpoint.0);
        Ok(())
    }

    /// Number of checkpoints on the stack.
    pub fn depth(&self) -> usize {
        self.savepoints.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Transaction boundaries
    // ═══════════════════════════════════════════════════════════════════════

    /// Start tracking a transaction's writes.
    pub fn begin_transaction(&mut self) -> Result<(), StateError> {
        if self.transaction.is_some() {
            return Err(StateError::TransactionAlreadyOpen);
        }
        self.transaction = Some(OpenTransaction {
            entries_at_start: self.entries.clone(),
            savepoint_base: self.savepoints.len(),
            touched: IndexSet::new(),
        });
        Ok(())
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Make the open transaction's writes part of the round and return its
    /// net changes in key order.
    ///
    /// Keys written and then restored to their original value produce no
    /// change.
    pub fn commit_transaction(&mut self) -> Result<Vec<StateChange>, StateError> {
        let tx = self
            .transaction
            .take()
            .ok_or(StateError::NoOpenTransaction)?;
        self.savepoints.truncate(tx.savepoint_base);

        let mut changes: Vec<StateChange> = tx
            .touched
            .into_iter()
            .filter_map(|key| {
                let before = tx.entries_at_start.get(&key);
                let after = self.entries.get(&key);
                if before == after {
                    return None;
                }
                Some(StateChange {
                    value_hash: after.map(|value| Hash::from_bytes(value)),
                    key,
                })
            })
            .collect();
        changes.sort_by(|a, b| a.key.cmp(&b.key));

        for change in &changes {
            self.round_writes.insert(change.key.clone());
        }
        Ok(changes)
    }

    /// Discard every write of the open transaction.
    pub fn rollback_transaction(&mut self) -> Result<(), StateError> {
        let tx = self
            .transaction
            .take()
            .ok_or(StateError::NoOpenTransaction)?;
        self.savepoints.truncate(tx.savepoint_base);
        self.entries = tx.entries_at_start;
        Ok(())
    }

    /// Whether a committed transaction earlier in this round wrote `key`.
    pub fn written_in_round(&self, key: &StateKey) -> bool {
        self.round_writes.contains(key)
    }

    /// Whether a committed transaction earlier in this round wrote any key
    /// of `partition`.
    pub fn partition_written_in_round(&self, partition: &Partition) -> bool {
        self.round_writes
            .range(StateKey::partition_start(partition)..)
            .next()
            .is_some_and(|key| &key.partition == partition)
    }

    fn touch(&mut self, key: &StateKey) {
        match &mut self.transaction {
            Some(tx) => {
                tx.touched.insert(key.clone());
            }
            None => {
                // Writes outside a transaction (round-end bookkeeping) are
                // part of the round immediately.
                self.round_writes.insert(key.clone());
            }
        }
    }
}

impl ReadableState for WorkingView {
    fn get_raw(&self, key: &StateKey) -> Option<StateValue> {
        self.entries.get(key).cloned()
    }

    fn keys_in(&self, partition: &Partition) -> Vec<StateKey> {
        keys_in(&self.entries, partition)
    }
}

impl WritableState for WorkingView {
    fn put_raw(&mut self, key: StateKey, value: StateValue) {
        self.touch(&key);
        self.entries.insert(key, value);
    }

    fn remove_raw(&mut self, key: &StateKey) {
        self.touch(key);
        self.entries.remove(key);
    }
}

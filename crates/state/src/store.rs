//! Snapshot publication and working-view lifecycle.

use crate::snapshot::Snapshot;
use crate::working_view::{ViewGuard, WorkingView};
use arc_swap::ArcSwap;
use concord_core::StateError;
use concord_types::{RoundNumber, Timestamp};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Default number of committed snapshots kept alive while waiting for a
/// signature.
pub const DEFAULT_MAX_UNSIGNED_SNAPSHOTS: usize = 64;

/// Versioned state store.
///
/// Readers load `Arc<Snapshot>`s without locking; a snapshot lives exactly as
/// long as someone holds it. The store itself holds the latest committed
/// snapshot, the latest signed snapshot, and committed snapshots newer than
/// the signed one (bounded) so they can still be signed.
pub struct StateStore {
    latest: ArcSwap<Snapshot>,
    latest_signed: ArcSwap<Snapshot>,
    awaiting_signature: Mutex<BTreeMap<u64, Arc<Snapshot>>>,
    versions: Mutex<BTreeMap<u64, Weak<Snapshot>>>,
    view_open: Arc<AtomicBool>,
    max_unsigned: usize,
}

impl StateStore {
    /// Create a store whose committed and signed state is `genesis`.
    pub fn new(genesis: Snapshot) -> Self {
        let genesis = Arc::new(genesis);
        let mut versions = BTreeMap::new();
        versions.insert(genesis.version(), Arc::downgrade(&genesis));
        Self {
            latest: ArcSwap::new(genesis.clone()),
            latest_signed: ArcSwap::new(genesis),
            awaiting_signature: Mutex::new(BTreeMap::new()),
            versions: Mutex::new(versions),
            view_open: Arc::new(AtomicBool::new(false)),
            max_unsigned: DEFAULT_MAX_UNSIGNED_SNAPSHOTS,
        }
    }

    /// Bound the number of unsigned snapshots retained for signing.
    pub fn with_max_unsigned(mut self, max_unsigned: usize) -> Self {
        self.max_unsigned = max_unsigned.max(1);
        self
    }

    /// Latest committed snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.latest.load_full()
    }

    /// Latest signed snapshot. Queries and ingest read this one.
    pub fn latest_signed(&self) -> Arc<Snapshot> {
        self.latest_signed.load_full()
    }

    /// A still-retained snapshot by version.
    pub fn snapshot(&self, version: u64) -> Option<Arc<Snapshot>> {
        self.versions.lock().get(&version).and_then(Weak::upgrade)
    }

    /// Open the working view on the latest committed snapshot.
    ///
    /// Only one working view may exist at a time.
    pub fn begin_working_view(&self) -> Result<WorkingView, StateError> {
        let base = self.latest();
        if self
            .view_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StateError::WorkingViewAlreadyOpen(base.version()));
        }
        Ok(WorkingView::new(base, ViewGuard(self.view_open.clone())))
    }

    /// Publish the working view as the next snapshot.
    ///
    /// Fails if a transaction is still open on the view or if another commit
    /// happened since the view was opened.
    pub fn commit(
        &self,
        view: WorkingView,
        round: RoundNumber,
        consensus_time: Timestamp,
    ) -> Result<Arc<Snapshot>, StateError> {
        if view.in_transaction() {
            return Err(StateError::TransactionAlreadyOpen);
        }
        let latest = self.latest();
        if view.base_version() != latest.version() {
            warn!(
                base = view.base_version(),
                latest = latest.version(),
                "Refusing to commit stale working view"
            );
            return Err(StateError::StaleWorkingView {
                base: view.base_version(),
                latest: latest.version(),
            });
        }

        let (entries, guard) = view.into_parts();
        let snapshot = Arc::new(Snapshot::new(
            latest.version() + 1,
            round,
            consensus_time,
            entries,
        ));

        self.versions
            .lock()
            .insert(snapshot.version(), Arc::downgrade(&snapshot));
        self.retain_for_signing(snapshot.clone());
        self.latest.store(snapshot.clone());
        drop(guard);

        debug!(
            version = snapshot.version(),
            round = snapshot.round().0,
            entries = snapshot.len(),
            "Committed snapshot"
        );
        Ok(snapshot)
    }

    /// Promote a committed snapshot to the latest signed one.
    ///
    /// Signing an older version than the current signed one is a no-op.
    pub fn mark_signed(&self, version: u64) -> Result<Arc<Snapshot>, StateError> {
        let current = self.latest_signed();
        if version <= current.version() {
            return Ok(current);
        }
        let snapshot = self
            .snapshot(version)
            .ok_or(StateError::UnknownVersion(version))?;

        self.latest_signed.store(snapshot.clone());
        self.awaiting_signature
            .lock()
            .retain(|&pending, _| pending > version);
        debug!(version, "Snapshot signed");
        Ok(snapshot)
    }

    /// Versions whose snapshots are still referenced somewhere.
    pub fn retained_versions(&self) -> Vec<u64> {
        let mut versions = self.versions.lock();
        versions.retain(|_, weak| weak.strong_count() > 0);
        versions.keys().copied().collect()
    }

    fn retain_for_signing(&self, snapshot: Arc<Snapshot>) {
        let mut pending = self.awaiting_signature.lock();
        pending.insert(snapshot.version(), snapshot);
        while pending.len() > self.max_unsigned {
            if let Some((dropped, _)) = pending.pop_first() {
                warn!(version = dropped, "Dropping unsigned snapshot");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::{ReadableStateExt, WritableStateExt};
    use concord_types::{Account, AccountId, KeyPair};

    fn account(id: u64, balance: u64) -> Account {
        Account::new(AccountId(id), KeyPair::from_seed(&[1; 32]).public_key(), balance)
    }

    fn commit_one(store: &StateStore, balance: u64) -> Arc<Snapshot> {
        let mut view = store.begin_working_view().unwrap();
        view.put(&AccountId(1), &account(1, balance));
        let next = store.latest().round().next();
        store.commit(view, next, Timestamp::from_secs(balance)).unwrap()
    }

    #[test]
    fn test_commit_publishes_new_version() {
        let store = StateStore::new(Snapshot::genesis(vec![]));
        let genesis = store.latest();

        let snapshot = commit_one(&store, 10);
        assert_eq!(snapshot.version(), 1);
        assert_eq!(store.latest().version(), 1);

        // Readers of the old snapshot are unaffected.
        assert_eq!(genesis.get::<Account>(&AccountId(1)).unwrap(), None);
        assert_eq!(
            store.latest().get::<Account>(&AccountId(1)).unwrap(),
            Some(account(1, 10))
        );
    }

    #[test]
    fn test_second_working_view_is_refused() {
        let store = StateStore::new(Snapshot::genesis(vec![]));
        let view = store.begin_working_view().unwrap();
        assert!(matches!(
            store.begin_working_view(),
            Err(StateError::WorkingViewAlreadyOpen(0))
        ));
        drop(view);
        assert!(store.begin_working_view().is_ok());
    }

    #[test]
    fn test_commit_with_open_transaction_is_refused() {
        let store = StateStore::new(Snapshot::genesis(vec![]));
        let mut view = store.begin_working_view().unwrap();
        view.begin_transaction().unwrap();
        assert_eq!(
            store
                .commit(view, RoundNumber(1), Timestamp::from_secs(1))
                .unwrap_err(),
            StateError::TransactionAlreadyOpen
        );
    }

    #[test]
    fn test_retention_follows_references() {
        let store = StateStore::new(Snapshot::genesis(vec![])).with_max_unsigned(1);
        let held = store.latest();
        commit_one(&store, 1);
        commit_one(&store, 2);

        // Genesis is still signed; version 1 was pushed out of the unsigned
        // window; version 2 is latest.
        assert_eq!(store.retained_versions(), vec![0, 2]);
        drop(held);
        assert_eq!(store.retained_versions(), vec![0, 2]);
        assert!(store.snapshot(1).is_none());
    }

    #[test]
    fn test_mark_signed_promotes_and_releases() {
        let store = StateStore::new(Snapshot::genesis(vec![]));
        commit_one(&store, 1);
        commit_one(&store, 2);

        let signed = store.mark_signed(1).unwrap();
        assert_eq!(signed.version(), 1);
        assert_eq!(store.latest_signed().version(), 1);
        assert_eq!(store.retained_versions(), vec![1, 2]);

        // Older signatures never regress the signed snapshot.
        assert_eq!(store.mark_signed(0).unwrap().version(), 1);
        assert!(matches!(
            store.mark_signed(9),
            Err(StateError::UnknownVersion(9))
        ));
    }
}

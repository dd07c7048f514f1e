//! Genesis state construction.

use crate::keys::{account_key, ALICE, BOB, CAROL, FUNDING, NODE_0_ACCOUNT};
use concord_core::StateValue;
use concord_state::{Snapshot, StateStore};
use concord_types::{
    encode_value, Account, AccountId, EntityCounter, SingletonRecord, StateKey, StateRecord,
};
use std::collections::BTreeMap;

/// Builds a genesis [`Snapshot`].
///
/// The entity counter is set past the highest account added, unless one is
/// set explicitly, so handlers creating entities never collide with fixtures.
#[derive(Debug, Default)]
pub struct GenesisBuilder {
    entries: BTreeMap<StateKey, StateValue>,
    highest_account: u64,
    entity_counter: Option<EntityCounter>,
}

impl GenesisBuilder {
    /// Empty genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account keyed by [`account_key`].
    pub fn account(self, id: AccountId, balance: u64) -> Self {
        self.with_account(Account::new(id, account_key(id).public_key(), balance))
    }

    /// Add an arbitrary account.
    pub fn with_account(mut self, account: Account) -> Self {
        self.highest_account = self.highest_account.max(account.id.0);
        let id = account.id;
        self.record(&id, &account)
    }

    /// Add any keyed record.
    pub fn record<T: StateRecord>(mut self, key: &T::Key, value: &T) -> Self {
        self.entries
            .insert(T::state_key(key), encode_value(value).into());
        self
    }

    /// Add a singleton record.
    pub fn singleton<T: SingletonRecord>(mut self, value: &T) -> Self {
        self.entries
            .insert(T::state_key(), encode_value(value).into());
        self
    }

    /// Override the entity counter.
    pub fn entity_counter(mut self, next: u64) -> Self {
        self.entity_counter = Some(EntityCounter { next });
        self
    }

    /// Build the snapshot.
    pub fn build(mut self) -> Snapshot {
        let counter = self.entity_counter.take().unwrap_or(EntityCounter {
            next: (self.highest_account + 1).max(EntityCounter::default().next),
        });
        self.entries
            .insert(EntityCounter::state_key(), encode_value(&counter).into());
        Snapshot::genesis(self.entries)
    }

    /// Build a store seeded with the snapshot.
    pub fn into_store(self) -> StateStore {
        StateStore::new(self.build())
    }
}

/// The genesis most tests start from.
///
/// | Account | Balance |
/// |---------|---------|
/// | `NODE_0_ACCOUNT` | 1 000 |
/// | `FUNDING` | 0 |
/// | `ALICE` | 100 |
/// | `BOB` | 0 |
/// | `CAROL` | 1 000 000 |
pub fn standard_genesis() -> GenesisBuilder {
    GenesisBuilder::new()
        .account(NODE_0_ACCOUNT, 1_000)
        .account(FUNDING, 0)
        .account(ALICE, 100)
        .account(BOB, 0)
        .account(CAROL, 1_000_000)
}

//! State access traits.
//!
//! Snapshots implement [`ReadableState`]; only the working view implements
//! [`WritableState`]. Typed access goes through the blanket extension traits
//! so that every read decodes the same way and decode failures always
//! surface as [`StateError::Corrupted`].

use crate::StateError;
use concord_types::{
    decode_value, encode_value, Partition, SingletonRecord, StateKey, StateRecord,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Encoded state value. Shared between snapshots without copying.
pub type StateValue = Arc<[u8]>;

/// Read access to state.
pub trait ReadableState {
    /// Raw value stored at `key`.
    fn get_raw(&self, key: &StateKey) -> Option<StateValue>;

    /// Every key in `partition`, in ascending key order.
    fn keys_in(&self, partition: &Partition) -> Vec<StateKey>;
}

/// Write access to state.
pub trait WritableState: ReadableState {
    /// Store `value` at `key`.
    fn put_raw(&mut self, key: StateKey, value: StateValue);

    /// Remove `key`.
    fn remove_raw(&mut self, key: &StateKey);
}

/// Typed reads over any [`ReadableState`].
pub trait ReadableStateExt: ReadableState {
    /// Decode the value stored at `key`.
    fn get_at<T: DeserializeOwned>(&self, key: &StateKey) -> Result<Option<T>, StateError> {
        self.get_raw(key)
            .map(|bytes| {
                decode_value(&bytes).map_err(|e| StateError::Corrupted {
                    key: key.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Read a keyed record.
    fn get<T: StateRecord>(&self, key: &T::Key) -> Result<Option<T>, StateError> {
        self.get_at(&T::state_key(key))
    }

    /// Read a singleton.
    fn get_singleton<T: SingletonRecord>(&self) -> Result<Option<T>, StateError> {
        self.get_at(&T::state_key())
    }
}

impl<S: ReadableState + ?Sized> ReadableStateExt for S {}

/// Typed writes over any [`WritableState`].
pub trait WritableStateExt: WritableState {
    /// Store a keyed record.
    fn put<T: StateRecord>(&mut self, key: &T::Key, value: &T) {
        self.put_raw(T::state_key(key), encode_value(value).into());
    }

    /// Remove a keyed record.
    fn remove<T: StateRecord>(&mut self, key: &T::Key) {
        self.remove_raw(&T::state_key(key));
    }

    /// Store a singleton.
    fn put_singleton<T: SingletonRecord>(&mut self, value: &T) {
        self.put_raw(T::state_key(), encode_value(value).into());
    }
}

impl<S: WritableState + ?Sized> WritableStateExt for S {}

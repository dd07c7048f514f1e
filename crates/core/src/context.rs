//! Execution context handed to business handlers.

use crate::{HandlerError, ReadableState, ReadableStateExt, ServiceHandlers, StateValue, WritableState};
use concord_types::{
    encode_value, AccountId, EntityCounter, Partition, PublicKey, ResponseCode, SingletonRecord,
    StateKey, StateRecord, Timestamp, TransactionBody, TransactionId,
};
use std::collections::BTreeSet;
use tracing::warn;

/// Scoped access to the working state during `execute`.
///
/// Reads see every partition. Writes outside the handler's declared scope
/// fail with `UNAUTHORIZED_STATE_ACCESS`, which the workflow treats as an
/// ordinary handler failure and rolls back.
pub struct HandleContext<'a> {
    state: &'a mut dyn WritableState,
    scope: &'a [Partition],
    handlers: &'a ServiceHandlers,
    transaction_id: TransactionId,
    payer: AccountId,
    consensus_time: Timestamp,
    verified_keys: &'a BTreeSet<PublicKey>,
}

impl<'a> HandleContext<'a> {
    /// Create a context.
    pub fn new(
        state: &'a mut dyn WritableState,
        scope: &'a [Partition],
        handlers: &'a ServiceHandlers,
        transaction_id: TransactionId,
        payer: AccountId,
        consensus_time: Timestamp,
        verified_keys: &'a BTreeSet<PublicKey>,
    ) -> Self {
        Self {
            state,
            scope,
            handlers,
            transaction_id,
            payer,
            consensus_time,
            verified_keys,
        }
    }

    /// Id of the transaction being executed.
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Account paying for the transaction.
    pub fn payer(&self) -> AccountId {
        self.payer
    }

    /// Consensus time of the transaction.
    pub fn consensus_time(&self) -> Timestamp {
        self.consensus_time
    }

    /// Keys whose signatures verified on this transaction.
    pub fn verified_keys(&self) -> &BTreeSet<PublicKey> {
        self.verified_keys
    }

    /// Keys another body would require, computed against the current state.
    pub fn required_keys_of(
        &self,
        body: &TransactionBody,
        payer: AccountId,
    ) -> Result<BTreeSet<PublicKey>, ResponseCode> {
        self.handlers
            .handler_for(body)
            .required_keys(body, payer, self)
    }

    /// Store a keyed record.
    pub fn put<T: StateRecord>(&mut self, key: &T::Key, value: &T) -> Result<(), HandlerError> {
        self.put_raw_scoped(T::state_key(key), encode_value(value).into())
    }

    /// Remove a keyed record.
    pub fn remove<T: StateRecord>(&mut self, key: &T::Key) -> Result<(), HandlerError> {
        let key = T::state_key(key);
        self.check_scope(&key)?;
        self.state.remove_raw(&key);
        Ok(())
    }

    /// Allocate the next entity number.
    ///
    /// The counter lives in `SYSTEM`, which handlers cannot write directly.
    pub fn next_entity_id(&mut self) -> Result<u64, HandlerError> {
        let mut counter = self.state.get_singleton::<EntityCounter>()?.unwrap_or_default();
        let id = counter.next;
        counter.next += 1;
        self.state
            .put_raw(EntityCounter::state_key(), encode_value(&counter).into());
        Ok(id)
    }

    fn put_raw_scoped(&mut self, key: StateKey, value: StateValue) -> Result<(), HandlerError> {
        self.check_scope(&key)?;
        self.state.put_raw(key, value);
        Ok(())
    }

    fn check_scope(&self, key: &StateKey) -> Result<(), HandlerError> {
        if self.scope.contains(&key.partition) {
            return Ok(());
        }
        warn!(
            tx_id = %self.transaction_id,
            partition = %key.partition,
            "Handler wrote outside its declared scope"
        );
        Err(HandlerError::Failure(ResponseCode::UnauthorizedStateAccess))
    }
}

impl ReadableState for HandleContext<'_> {
    fn get_raw(&self, key: &StateKey) -> Option<StateValue> {
        self.state.get_raw(key)
    }

    fn keys_in(&self, partition: &Partition) -> Vec<StateKey> {
        self.state.keys_in(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::MapState;
    use concord_types::{Account, KeyPair, ScheduledTransaction};

    fn with_context<R>(scope: &[Partition], f: impl FnOnce(&mut HandleContext<'_>) -> R) -> (R, MapState) {
        let mut state = MapState::default();
        let handlers = ServiceHandlers::new();
        let keys = BTreeSet::new();
        let result = {
            let mut ctx = HandleContext::new(
                &mut state,
                scope,
                &handlers,
                TransactionId::new(AccountId(1001), Timestamp::from_secs(1)),
                AccountId(1001),
                Timestamp::from_secs(2),
                &keys,
            );
            f(&mut ctx)
        };
        (result, state)
    }

    #[test]
    fn test_write_inside_scope_succeeds() {
        let account = Account::new(AccountId(5), KeyPair::from_seed(&[5; 32]).public_key(), 1);
        let (result, state) =
            with_context(&[Partition::ACCOUNTS], |ctx| ctx.put(&account.id, &account));
        assert_eq!(result, Ok(()));
        assert_eq!(state.get::<Account>(&AccountId(5)).unwrap(), Some(account));
    }

    #[test]
    fn test_write_outside_scope_is_rejected() {
        let (result, state) = with_context(&[Partition::ACCOUNTS], |ctx| {
            ctx.remove::<ScheduledTransaction>(&concord_types::ScheduleId(1))
        });
        assert_eq!(
            result,
            Err(HandlerError::Failure(ResponseCode::UnauthorizedStateAccess))
        );
        assert!(state.0.is_empty());
    }

    #[test]
    fn test_entity_ids_are_sequential() {
        let (ids, _) = with_context(&[], |ctx| {
            (ctx.next_entity_id().unwrap(), ctx.next_entity_id().unwrap())
        });
        let first = EntityCounter::default().next;
        assert_eq!(ids, (first, first + 1));
    }
}

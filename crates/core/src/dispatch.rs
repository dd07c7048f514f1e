//! Dispatch table from transaction category to handler.

use crate::{TransactionHandler, UnsupportedHandler};
use concord_types::{TransactionBody, TransactionKind};
use std::fmt;
use std::sync::Arc;

/// The closed set of business handlers, one per transaction category.
///
/// Built once at startup; cloning shares the handlers.
#[derive(Clone)]
pub struct ServiceHandlers {
    token: Arc<dyn TransactionHandler>,
    file: Arc<dyn TransactionHandler>,
    schedule: Arc<dyn TransactionHandler>,
    smart_contract: Arc<dyn TransactionHandler>,
    consensus_topic: Arc<dyn TransactionHandler>,
    network_admin: Arc<dyn TransactionHandler>,
    address_book: Arc<dyn TransactionHandler>,
    util: Arc<dyn TransactionHandler>,
}

impl Default for ServiceHandlers {
    fn default() -> Self {
        let unsupported: Arc<dyn TransactionHandler> = Arc::new(UnsupportedHandler);
        Self {
            token: unsupported.clone(),
            file: unsupported.clone(),
            schedule: unsupported.clone(),
            smart_contract: unsupported.clone(),
            consensus_topic: unsupported.clone(),
            network_admin: unsupported.clone(),
            address_book: unsupported.clone(),
            util: unsupported,
        }
    }
}

impl ServiceHandlers {
    /// A table where every category is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `kind`.
    pub fn with(mut self, kind: TransactionKind, handler: impl TransactionHandler + 'static) -> Self {
        let handler: Arc<dyn TransactionHandler> = Arc::new(handler);
        *self.slot_mut(kind) = handler;
        self
    }

    /// Handler for a body. Exhaustive over the body variants.
    pub fn handler_for(&self, body: &TransactionBody) -> &dyn TransactionHandler {
        match body {
            TransactionBody::Token(_) => self.token.as_ref(),
            TransactionBody::File(_) => self.file.as_ref(),
            TransactionBody::Schedule(_) => self.schedule.as_ref(),
            TransactionBody::SmartContract(_) => self.smart_contract.as_ref(),
            TransactionBody::ConsensusTopic(_) => self.consensus_topic.as_ref(),
            TransactionBody::NetworkAdmin(_) => self.network_admin.as_ref(),
            TransactionBody::AddressBook(_) => self.address_book.as_ref(),
            TransactionBody::Util(_) => self.util.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: TransactionKind) -> &mut Arc<dyn TransactionHandler> {
        match kind {
            TransactionKind::Token => &mut self.token,
            TransactionKind::File => &mut self.file,
            TransactionKind::Schedule => &mut self.schedule,
            TransactionKind::SmartContract => &mut self.smart_contract,
            TransactionKind::ConsensusTopic => &mut self.consensus_topic,
            TransactionKind::NetworkAdmin => &mut self.network_admin,
            TransactionKind::AddressBook => &mut self.address_book,
            TransactionKind::Util => &mut self.util,
        }
    }
}

impl fmt::Debug for ServiceHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandlers").finish_non_exhaustive()
    }
}

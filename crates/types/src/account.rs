//! Ledger accounts.

use crate::{AccountId, Partition, PublicKey, StateRecord};
use serde::{Deserialize, Serialize};

/// An account: the key that controls it and its balance.
///
/// The pipeline needs accounts for payer resolution, payer signature
/// requirements and fee charging; everything else about them belongs to the
/// token service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account id.
    pub id: AccountId,
    /// Controlling key.
    pub key: PublicKey,
    /// Balance in the smallest unit.
    pub balance: u64,
    /// Deleted accounts cannot pay or receive.
    pub deleted: bool,
}

impl Account {
    /// Create a live account.
    pub fn new(id: AccountId, key: PublicKey, balance: u64) -> Self {
        Self {
            id,
            key,
            balance,
            deleted: false,
        }
    }
}

impl StateRecord for Account {
    const PARTITION: Partition = Partition::ACCOUNTS;
    type Key = AccountId;
}

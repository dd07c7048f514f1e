//! Fee collection against the working view.

use concord_core::{FeeSchedule, ReadableStateExt, StateError, SystemAccounts, WritableStateExt};
use concord_state::WorkingView;
use concord_types::{Account, AccountId, FeeCharge, Fees, NodeId};
use tracing::warn;

/// Moves fees from payers (or nodes) to the funding account.
///
/// A charge either succeeds in full or changes nothing. Collected fees are
/// credited to the funding account when it exists.
#[derive(Debug, Clone)]
pub struct FeeCharger {
    schedule: FeeSchedule,
    accounts: SystemAccounts,
}

impl FeeCharger {
    /// Create a charger.
    pub fn new(schedule: FeeSchedule, accounts: SystemAccounts) -> Self {
        Self { schedule, accounts }
    }

    /// Prices in use.
    pub fn schedule(&self) -> &FeeSchedule {
        &self.schedule
    }

    /// Whether `payer` is a live account that can cover `fees`.
    pub fn can_cover(
        &self,
        view: &WorkingView,
        payer: AccountId,
        fees: &Fees,
    ) -> Result<bool, StateError> {
        Ok(view
            .get::<Account>(&payer)?
            .is_some_and(|account| !account.deleted && account.balance >= fees.total()))
    }

    /// Charge `payer` in full, or nothing if it cannot cover `fees`.
    pub fn charge(
        &self,
        view: &mut WorkingView,
        payer: AccountId,
        fees: Fees,
    ) -> Result<Option<FeeCharge>, StateError> {
        if fees.total() == 0 {
            return Ok(Some(FeeCharge::none(payer)));
        }
        let Some(mut account) = view.get::<Account>(&payer)? else {
            return Ok(None);
        };
        if account.deleted || account.balance < fees.total() {
            return Ok(None);
        }
        account.balance -= fees.total();
        view.put(&payer, &account);
        self.credit_funding(view, fees.total())?;
        Ok(Some(FeeCharge {
            charged_to: payer,
            fees,
        }))
    }

    /// Charge the account of `node` for a due-diligence failure.
    pub fn charge_node(
        &self,
        view: &mut WorkingView,
        node: NodeId,
        fees: Fees,
    ) -> Result<FeeCharge, StateError> {
        let node_account = self.accounts.node_account(node);
        match self.charge(view, node_account, fees)? {
            Some(charge) => Ok(charge),
            None => {
                warn!(node = %node, account = %node_account, "Node account cannot cover due-diligence fee");
                Ok(FeeCharge::none(node_account))
            }
        }
    }

    /// Charge `payer`, falling back to the node when the payer cannot cover.
    pub fn charge_payer_or_node(
        &self,
        view: &mut WorkingView,
        payer: AccountId,
        node: NodeId,
        fees: Fees,
    ) -> Result<FeeCharge, StateError> {
        match self.charge(view, payer, fees)? {
            Some(charge) => Ok(charge),
            None => self.charge_node(view, node, fees),
        }
    }

    fn credit_funding(&self, view: &mut WorkingView, amount: u64) -> Result<(), StateError> {
        let funding = self.accounts.funding;
        if let Some(mut account) = view.get::<Account>(&funding)? {
            account.balance = account.balance.saturating_add(amount);
            view.put(&funding, &account);
        }
        Ok(())
    }
}

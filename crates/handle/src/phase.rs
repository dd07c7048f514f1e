//! Per-transaction lifecycle.

use std::fmt;

/// Where a transaction is in handle.
///
/// ```text
/// Received ─┬─> Deduped
///           ├─> Rejected                      (node due diligence)
///           └─> Authorizing ─┬─> Rejected
///                            ├─> Throttled
///                            └─> Charging ─┬─> Rejected   (insolvent)
///                                          └─> Executing ─┬─> RolledBack
///                                                         └─> Committed
/// ```
///
/// Every transaction ends in exactly one terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionPhase {
    Received,
    Deduped,
    Authorizing,
    Rejected,
    Throttled,
    Charging,
    Executing,
    RolledBack,
    Committed,
}

impl TransactionPhase {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionPhase::Deduped
                | TransactionPhase::Rejected
                | TransactionPhase::Throttled
                | TransactionPhase::RolledBack
                | TransactionPhase::Committed
        )
    }

    /// Whether `next` is a legal successor.
    pub fn can_advance_to(self, next: TransactionPhase) -> bool {
        use TransactionPhase::*;
        matches!(
            (self, next),
            (Received, Deduped)
                | (Received, Rejected)
                | (Received, Authorizing)
                | (Authorizing, Rejected)
                | (Authorizing, Throttled)
                | (Authorizing, Charging)
                | (Charging, Rejected)
                | (Charging, Executing)
                | (Executing, RolledBack)
                | (Executing, Committed)
        )
    }

    /// Move to `next`.
    pub fn advance(&mut self, next: TransactionPhase) {
        debug_assert!(
            self.can_advance_to(next),
            "illegal transaction phase transition {self} -> {next}"
        );
        *self = next;
    }
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionPhase::Received => "RECEIVED",
            TransactionPhase::Deduped => "DEDUPED",
            TransactionPhase::Authorizing => "AUTHORIZING",
            TransactionPhase::Rejected => "REJECTED",
            TransactionPhase::Throttled => "THROTTLED",
            TransactionPhase::Charging => "CHARGING",
            TransactionPhase::Executing => "EXECUTING",
            TransactionPhase::RolledBack => "ROLLED_BACK",
            TransactionPhase::Committed => "COMMITTED",
        };
        f.write_str(name)
    }
}

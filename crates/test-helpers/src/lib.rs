//! Test helpers for the Concord workspace.
//!
//! Fixtures here are deterministic: keys derive from account numbers through
//! a seeded ChaCha stream, so every test run (and every simulated node)
//! signs with the same keys.

mod builders;
mod genesis;
mod handlers;
mod keys;

pub use builders::{consensus_round, TxBuilder};
pub use genesis::{standard_genesis, GenesisBuilder};
pub use handlers::{
    reference_handlers, CryptoHandler, FailingHandler, FailureMode, NoopHandler, ScheduleHandler,
};
pub use keys::{account_key, ALICE, BOB, CAROL, FUNDING, NODE_0_ACCOUNT};

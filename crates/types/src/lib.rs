//! Core types for the Concord transaction pipeline.
//!
//! Everything that crosses a crate boundary or a node boundary lives here:
//! hashes and keys, transactions and rounds, state keys, records and status
//! codes. All of it derives `serde` and hashes over its canonical `bincode`
//! encoding.

mod account;
mod crypto;
mod hash;
mod identifiers;
mod record;
mod round;
mod schedule;
mod state;
mod status;
mod timestamp;
mod transaction;

pub mod merkle;
pub mod signing;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use account::Account;
pub use crypto::{KeyPair, PublicKey, Signature};
pub use hash::Hash;
pub use identifiers::{
    AccountId, ContractId, FileId, NodeId, RoundNumber, ScheduleId, TopicId, VotePower,
};
pub use merkle::{build_merkle_tree_with_proofs, merkle_root, MerkleProof};
pub use record::{FeeCharge, Fees, ResourceUsage, RoundSummary, TransactionRecord};
pub use round::{ConsensusRound, ConsensusTransaction};
pub use schedule::ScheduledTransaction;
pub use state::{
    decode_value, encode_value, EntityCounter, KeyEncoding, Partition, SingletonRecord,
    StateChange, StateKey, StateRecord,
};
pub use status::ResponseCode;
pub use timestamp::Timestamp;
pub use transaction::{
    AccountAmount, AddressBookOperation, AdminOperation, ContractOperation, FileOperation,
    ScheduleOperation, SignaturePair, TokenOperation, TopicOperation, Transaction,
    TransactionBody, TransactionData, TransactionId, TransactionKind, UtilOperation,
};

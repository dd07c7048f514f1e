//! Concord node.
//!
//! Wires the pipeline around one [`StateStore`](concord_state::StateStore):
//!
//! - client bytes enter through [`ConsensusNode::submit_transaction`] (ingest)
//! - the consensus layer announces transactions to
//!   [`ConsensusNode::pre_handle`] and delivers ordered rounds to
//!   [`ConsensusNode::on_round_received`] (handle)
//! - queries are served from the latest signed snapshot
//! - peers' round hashes feed ISS detection
//!
//! Any fatal fault halts the node: later rounds are refused instead of being
//! applied on top of state that may have diverged.

mod config;
mod error;
mod iss;
pub mod logging;
mod node;

pub use config::{ConfigError, NodeConfig, StateConfig};
pub use error::NodeError;
pub use iss::{IssConfig, IssDetector, IssStatus};
pub use node::{ConsensusNode, RoundResult};

//! Node errors.

use crate::ConfigError;
use concord_handle::HandleError;
use concord_prehandle::PreHandleError;
use concord_state::StateError;
use concord_types::{Hash, RoundNumber};
use thiserror::Error;

/// Errors surfaced by [`ConsensusNode`](crate::ConsensusNode).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    PreHandle(#[from] PreHandleError),

    #[error(transparent)]
    Handle(#[from] HandleError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("{round} delivered out of order (last handled {last})")]
    RoundOutOfOrder { round: RoundNumber, last: RoundNumber },

    #[error("Round delivered while another round is being handled")]
    Reentrant,

    #[error("Self ISS at {round}: computed {ours}, network agreed on {network}")]
    SelfIss {
        round: RoundNumber,
        ours: Hash,
        network: Hash,
    },

    #[error("Node halted after a fatal fault")]
    Halted,
}

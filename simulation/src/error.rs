//! Error types
//!
//! Every failure here is fatal for the whole run: either a clean rejection
//! before the first cycle, or an abort once units are exchanging messages.

use crate::comm::Tag;

/// Failures of the inter-unit message layer.
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// The peer dropped its end of the link, usually because it failed.
    #[error("unit {peer} is no longer reachable")]
    PeerDisconnected { peer: usize },

    /// Messages arrived out of protocol order.
    #[error("expected {expected:?} from unit {peer}, got {got:?}")]
    UnexpectedTag { peer: usize, expected: Tag, got: Tag },

    /// A migration payload disagreed with the count announced before it.
    #[error("unit {peer} announced {announced} migrants but sent {received}")]
    CountMismatch { peer: usize, announced: u64, received: u64 },

    #[error("message codec: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("global height {height} is not divisible by {units} units")]
    IndivisibleHeight { height: usize, units: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot grow agent store to {requested} agents")]
    CapacityExhausted { requested: usize },

    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("unit {rank} panicked")]
    UnitPanicked { rank: usize },

    #[error("failed to spawn unit thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Comm(#[from] CommError),
}

impl SimError {
    /// Secondary failures caused by another unit going away.
    pub fn is_peer_loss(&self) -> bool {
        matches!(self, SimError::Comm(CommError::PeerDisconnected { .. }))
    }
}

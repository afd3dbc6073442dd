//! Error types for the owner-side engine.

use thiserror::Error;

use sealfeed_core::{CoreError, Epoch, FollowerId};

/// Errors that can occur during grant and revocation operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No free leaf slot. Fatal to the caller: deny the follower or
    /// rebuild the feed with a larger tree.
    #[error("tree capacity exceeded: all {capacity} leaf slots assigned")]
    CapacityExceeded { capacity: u32 },

    /// The follower already holds a leaf slot.
    #[error("follower already granted: {0}")]
    AlreadyGranted(FollowerId),

    /// Revoke or lookup on an identity that holds no slot. Revoking twice
    /// lands here, so the owner can detect stale calls.
    #[error("unknown follower: {0}")]
    UnknownFollower(FollowerId),

    /// The epoch counter is exhausted; no further revocations possible.
    #[error("epoch chain exhausted at {max}")]
    EpochExhausted { max: Epoch },

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

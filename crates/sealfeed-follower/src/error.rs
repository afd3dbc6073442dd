//! Error types for the follower-side key store.

use thiserror::Error;

use sealfeed_core::{CoreError, Epoch};

/// Errors that can occur while maintaining follower key state.
#[derive(Debug, Error)]
pub enum FollowerError {
    /// A rekey event arrived out of order. Events must be replayed in
    /// strict epoch order; the caller should fetch the gap and retry.
    #[error("rekey event out of order: expected epoch {expected}, got {got}")]
    StaleEpoch { expected: Epoch, got: Epoch },

    /// No CEK is known for the requested epoch. Either the post is newer
    /// than the store's state (fetch pending rekey events first) or the
    /// epoch is outside the feed's range.
    #[error("no content key known for epoch {epoch}")]
    KeyNotFound { epoch: Epoch },

    /// The store could not follow a rekey event to the new root key and
    /// is locked out. Terminal: only a fresh grant recovers access.
    #[error("locked out of the feed; re-grant required")]
    LockedOut,

    /// Operation requires an applied grant.
    #[error("key store not initialized; apply a grant first")]
    NotInitialized,

    /// A grant was applied to a store that already holds current keys.
    #[error("key store already initialized")]
    AlreadyInitialized,

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for follower operations.
pub type Result<T> = std::result::Result<T, FollowerError>;

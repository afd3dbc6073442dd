//! Error types for Sealfeed core.

use thiserror::Error;

use crate::types::Epoch;

/// Core errors for crypto, chain, and record operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// AEAD authentication failed: wrong key, corrupted ciphertext, or a
    /// genuinely locked-out reader. Never distinguishes which.
    #[error("decryption failure")]
    DecryptionFailure,

    /// Encryption could not be performed (invalid key material).
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// An epoch outside the chain's valid range was requested, or a
    /// forward derivation (target newer than known) was attempted.
    #[error("epoch out of range: target {target}, known up to {known}")]
    EpochOutOfRange { target: Epoch, known: Epoch },

    /// A published record failed canonical decoding.
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// An encrypted Grant/Rekey inner payload failed to deserialize.
    #[error("malformed bundle: {0}")]
    MalformedBundle(String),

    /// Tree or chain was constructed with an invalid capacity.
    #[error("invalid capacity: {0}")]
    InvalidCapacity(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

//! # Sealfeed Core
//!
//! Pure primitives for Sealfeed: crypto wrappers, the epoch CEK hash chain,
//! per-post encryption, and the published record shapes with their canonical
//! encoding.
//!
//! This crate contains no I/O, no storage, no networking. The public ledger
//! the records land on is an external collaborator; privacy comes entirely
//! from key management, since every published byte is readable by anyone.
//!
//! ## Key Types
//!
//! - [`EpochChain`] / [`Cek`] - backward-derivable content keys, one per epoch
//! - [`AeadKey`] / [`HybridCiphertext`] - XChaCha20-Poly1305 and ECIES wrappers
//! - [`GrantRecord`] / [`RekeyEventRecord`] / [`EncryptedPostRecord`] /
//!   [`FeedStateRecord`] - the four ledger record shapes
//!
//! ## Canonicalization
//!
//! All published records use deterministic CBOR. See [`canonical`].

pub mod canonical;
pub mod chain;
pub mod crypto;
pub mod error;
pub mod post;
pub mod records;
pub mod types;

pub use chain::{derive_backward, Cek, EpochChain, MAX_EPOCH};
pub use crypto::{
    kdf, sha256, AeadKey, EphemeralKeyPair, HybridCiphertext, Nonce24, SharedKey, X25519PublicKey,
    X25519StaticSecret,
};
pub use error::{CoreError, Result};
pub use post::{decrypt_post, encrypt_post};
pub use records::{
    EncryptedPostRecord, FeedStateRecord, GrantBundle, GrantRecord, PathKey, RecordKind,
    RekeyEventRecord, RekeyPacket, DEFAULT_TREE_CAPACITY, RECORD_VERSION,
};
pub use types::{Epoch, FeedId, FollowerId, LeafIndex, NodeId, OwnerId, RecordId};

//! Published record shapes for the external append-only ledger.
//!
//! The ledger itself (read/write/query, transport, retries) is an external
//! collaborator; the core only defines the four record shapes it consumes
//! and produces, each a tagged, versioned struct with a single canonical
//! binary encoding (see [`crate::canonical`]). Anything that does not parse
//! is rejected, never coerced.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::chain::Cek;
use crate::crypto::{AeadKey, HybridCiphertext, Nonce24};
use crate::error::{CoreError, Result};
use crate::types::{Epoch, FeedId, FollowerId, LeafIndex, NodeId, OwnerId, RecordId};

/// The current record schema version.
pub const RECORD_VERSION: u8 = 0;

/// Default key tree capacity: next power of two above the expected
/// follower maximum.
pub const DEFAULT_TREE_CAPACITY: u32 = 1024;

/// The kind of published record, determining field interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum RecordKind {
    // Feed kinds (0x0000 - 0x00FF)
    /// Feed bootstrap state: capacities plus the owner's recovery seed.
    FeedState = 0x0001,

    // Key-management kinds (0x0100 - 0x01FF)
    /// Onboards one follower with an encrypted key bundle.
    Grant = 0x0100,
    /// Advances the epoch after a revocation; replayed by followers.
    Rekey = 0x0101,

    // Content kinds (0x0200 - 0x02FF)
    /// An encrypted post.
    Post = 0x0200,
}

impl RecordKind {
    /// Convert to u16 for serialization.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Try to parse from u16.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::FeedState),
            0x0100 => Some(Self::Grant),
            0x0101 => Some(Self::Rekey),
            0x0200 => Some(Self::Post),
            _ => None,
        }
    }
}

/// Feed bootstrap record, published once per feed.
///
/// The seed is hybrid-encrypted to the owner's *own* public key so a second
/// device holding the owner's secret can regenerate the epoch chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedStateRecord {
    /// The feed owner.
    pub owner: OwnerId,

    /// The feed this state belongs to.
    pub feed_id: FeedId,

    /// Leaf capacity of the key tree (power of two).
    pub tree_capacity: u32,

    /// Highest epoch the precomputed chain supports.
    pub max_epoch: u32,

    /// The chain seed, encrypted to the owner's key.
    pub encrypted_seed: HybridCiphertext,
}

/// Onboards a follower: assigns a leaf slot and delivers the key bundle.
///
/// Created once per approval; deleted from the ledger on revocation (the
/// deletion itself is the ledger collaborator's job).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRecord {
    /// The feed being granted.
    pub feed_id: FeedId,

    /// The follower being onboarded.
    pub follower: FollowerId,

    /// The assigned leaf slot.
    pub leaf_index: LeafIndex,

    /// [`GrantBundle`] bytes, hybrid-encrypted to the follower's key.
    pub bundle: HybridCiphertext,
}

/// The plaintext inside a Grant: everything a follower needs to read the
/// feed at the current epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantBundle {
    /// The follower's leaf slot.
    pub leaf_index: LeafIndex,

    /// Epoch at grant time.
    pub epoch: Epoch,

    /// CEK for that epoch.
    pub cek: [u8; 32],

    /// Node keys on the slot's path, leaf first, root last, at their
    /// current versions.
    pub path_keys: Vec<PathKey>,
}

impl GrantBundle {
    /// The bundled CEK.
    pub fn cek(&self) -> Cek {
        Cek::from_bytes(self.cek)
    }

    /// Serialize to CBOR bytes (the hybrid-encryption plaintext).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::MalformedBundle(e.to_string()))
    }
}

/// One versioned node key inside a grant bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathKey {
    /// The tree node.
    pub node: NodeId,

    /// Key version at grant time.
    pub version: u32,

    /// The 32-byte key value.
    pub key: [u8; 32],
}

impl PathKey {
    /// The key as AEAD key material.
    pub fn aead_key(&self) -> AeadKey {
        AeadKey::from_bytes(self.key)
    }
}

/// A small ciphertext conveying one new node key to everyone who already
/// holds the wrapping key — which, by construction, excludes the evicted
/// follower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RekeyPacket {
    /// The node whose key was re-versioned.
    pub target: NodeId,

    /// The new version of the target's key.
    pub target_version: u32,

    /// The node whose key wraps this packet.
    pub wrap: NodeId,

    /// The version of the wrapping key.
    pub wrap_version: u32,

    /// Whether the wrapping key is itself new in this same event
    /// (a key learned from an earlier packet in the list).
    pub wrap_is_new: bool,

    /// AEAD nonce.
    pub nonce: Nonce24,

    /// The new 32-byte node key, encrypted.
    pub ciphertext: Vec<u8>,
}

/// Published after a revocation; followers replay these in epoch order.
/// Append-only on the ledger, never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyEventRecord {
    /// The feed this event belongs to.
    pub feed_id: FeedId,

    /// The epoch this event advances the feed to.
    pub new_epoch: Epoch,

    /// Rekey packets, ordered from the evicted leaf's parent up to the
    /// root. At most `2 * tree_depth` entries.
    pub packets: Vec<RekeyPacket>,

    /// Nonce for the encrypted CEK.
    pub cek_nonce: Nonce24,

    /// The new epoch's CEK, encrypted under the new root key.
    pub encrypted_cek: Vec<u8>,
}

/// The encrypted fields of a post record. The surrounding plain post
/// document (timestamps, replies, etc.) is the ledger collaborator's model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPostRecord {
    /// The post author (the feed owner).
    pub author: OwnerId,

    /// Epoch whose CEK encrypts this post.
    pub epoch: Epoch,

    /// Per-post random nonce, also an input to the post key derivation.
    pub nonce: Nonce24,

    /// The encrypted content.
    pub ciphertext: Bytes,

    /// Optional public teaser shown to non-followers.
    pub teaser: Option<String>,
}

impl FeedStateRecord {
    /// Content-addressed identifier of this record.
    pub fn record_id(&self) -> RecordId {
        RecordId::of(&self.canonical_bytes())
    }
}

impl GrantRecord {
    /// Content-addressed identifier of this record.
    pub fn record_id(&self) -> RecordId {
        RecordId::of(&self.canonical_bytes())
    }
}

impl RekeyEventRecord {
    /// Content-addressed identifier of this record.
    pub fn record_id(&self) -> RecordId {
        RecordId::of(&self.canonical_bytes())
    }
}

impl EncryptedPostRecord {
    /// Content-addressed identifier of this record.
    pub fn record_id(&self) -> RecordId {
        RecordId::of(&self.canonical_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kind_roundtrip() {
        for kind in [
            RecordKind::FeedState,
            RecordKind::Grant,
            RecordKind::Rekey,
            RecordKind::Post,
        ] {
            assert_eq!(RecordKind::from_u16(kind.to_u16()), Some(kind));
        }
        assert_eq!(RecordKind::from_u16(0xffff), None);
    }

    #[test]
    fn test_grant_bundle_roundtrip() {
        let bundle = GrantBundle {
            leaf_index: LeafIndex::new(2),
            epoch: Epoch::FIRST,
            cek: [0x42; 32],
            path_keys: vec![
                PathKey {
                    node: NodeId::new(3, 2),
                    version: 0,
                    key: [1; 32],
                },
                PathKey {
                    node: NodeId::new(2, 1),
                    version: 4,
                    key: [2; 32],
                },
            ],
        };

        let bytes = bundle.to_bytes();
        let recovered = GrantBundle::from_bytes(&bytes).unwrap();
        assert_eq!(bundle, recovered);
    }

    #[test]
    fn test_grant_bundle_rejects_garbage() {
        let err = GrantBundle::from_bytes(b"not cbor at all").unwrap_err();
        assert!(matches!(err, CoreError::MalformedBundle(_)));
    }
}

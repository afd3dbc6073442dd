//! Strong type definitions for Sealfeed.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte owner identifier (the feed publisher's principal).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub [u8; 32]);

impl OwnerId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for OwnerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 32-byte follower identifier.
///
/// Derived from the follower's public key so that one key holds at most
/// one identity in a feed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FollowerId(pub [u8; 32]);

impl FollowerId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a follower identity from an X25519 public key.
    pub fn from_public_key(public_key: &crate::crypto::X25519PublicKey) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("sealfeed-follower-v1");
        hasher.update(public_key.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for FollowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FollowerId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for FollowerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for FollowerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 32-byte feed identifier.
///
/// Derived from Blake3(owner || feed_name).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedId(pub [u8; 32]);

impl FeedId {
    /// Derive a feed ID from owner and feed name.
    pub fn derive(owner: &OwnerId, feed_name: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("sealfeed-feed-v1");
        hasher.update(&owner.0);
        hasher.update(b":");
        hasher.update(feed_name.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

/// A 32-byte record identifier: Blake3 of a record's canonical bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub [u8; 32]);

impl RecordId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute the identifier of a canonical record encoding.
    pub fn of(canonical_bytes: &[u8]) -> Self {
        Self(*blake3::hash(canonical_bytes).as_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", &self.to_hex()[..16])
    }
}

/// An epoch number: 1-based, monotonically non-decreasing, advances on
/// every revocation. Identifies one CEK version.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Epoch(pub u32);

impl Epoch {
    /// The first valid epoch.
    pub const FIRST: Self = Self(1);

    /// Create from a raw epoch number.
    pub const fn new(epoch: u32) -> Self {
        Self(epoch)
    }

    /// Get the raw epoch number.
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// The next epoch.
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this is a valid (1-based) epoch number.
    pub const fn is_valid(&self) -> bool {
        self.0 >= 1
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch({})", self.0)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a leaf slot in the key tree (0-based, < capacity).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeafIndex(pub u32);

impl LeafIndex {
    /// Create from a raw index.
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index.
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for LeafIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LeafIndex({})", self.0)
    }
}

impl fmt::Display for LeafIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for a node in the key tree.
///
/// The root is `(level 0, index 0)`; a node at `(l, i)` has children
/// `(l+1, 2i)` and `(l+1, 2i+1)`. Leaves sit at `level == depth`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Distance from the root (root is 0).
    pub level: u8,
    /// Position within the level, left to right.
    pub index: u32,
}

impl NodeId {
    /// The root node.
    pub const ROOT: Self = Self { level: 0, index: 0 };

    /// Create a node identifier.
    pub const fn new(level: u8, index: u32) -> Self {
        Self { level, index }
    }

    /// The leaf node for a slot in a tree of the given depth.
    pub const fn leaf(depth: u8, slot: LeafIndex) -> Self {
        Self {
            level: depth,
            index: slot.0,
        }
    }

    /// Whether this node is the root.
    pub const fn is_root(&self) -> bool {
        self.level == 0
    }

    /// The parent node. Root has no parent.
    pub const fn parent(&self) -> Option<Self> {
        if self.level == 0 {
            None
        } else {
            Some(Self {
                level: self.level - 1,
                index: self.index / 2,
            })
        }
    }

    /// The sibling node. Root has no sibling.
    pub const fn sibling(&self) -> Option<Self> {
        if self.level == 0 {
            None
        } else {
            Some(Self {
                level: self.level,
                index: self.index ^ 1,
            })
        }
    }

    /// The left child.
    pub const fn left_child(&self) -> Self {
        Self {
            level: self.level + 1,
            index: self.index * 2,
        }
    }

    /// The right child.
    pub const fn right_child(&self) -> Self {
        Self {
            level: self.level + 1,
            index: self.index * 2 + 1,
        }
    }

    /// Whether `descendant` lies in the subtree rooted at this node
    /// (a node is its own descendant).
    pub fn contains(&self, descendant: &NodeId) -> bool {
        if descendant.level < self.level {
            return false;
        }
        let shift = descendant.level - self.level;
        (descendant.index >> shift) == self.index
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}/{})", self.level, self.index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.level, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_id_derivation() {
        let owner = OwnerId::from_bytes([7u8; 32]);
        let id1 = FeedId::derive(&owner, "posts");
        let id2 = FeedId::derive(&owner, "posts");
        assert_eq!(id1, id2);

        let id3 = FeedId::derive(&owner, "other");
        assert_ne!(id1, id3);

        let other_owner = OwnerId::from_bytes([8u8; 32]);
        let id4 = FeedId::derive(&other_owner, "posts");
        assert_ne!(id1, id4);
    }

    #[test]
    fn test_epoch_ordering() {
        assert!(Epoch::FIRST < Epoch::new(2));
        assert_eq!(Epoch::FIRST.next(), Epoch::new(2));
        assert!(!Epoch::new(0).is_valid());
    }

    #[test]
    fn test_node_id_parent_child() {
        let n = NodeId::new(3, 5);
        assert_eq!(n.parent(), Some(NodeId::new(2, 2)));
        assert_eq!(n.sibling(), Some(NodeId::new(3, 4)));
        assert_eq!(NodeId::new(2, 2).left_child(), NodeId::new(3, 4));
        assert_eq!(NodeId::new(2, 2).right_child(), NodeId::new(3, 5));
        assert_eq!(NodeId::ROOT.parent(), None);
        assert_eq!(NodeId::ROOT.sibling(), None);
    }

    #[test]
    fn test_node_id_contains() {
        let root = NodeId::ROOT;
        let leaf = NodeId::new(10, 1023);
        assert!(root.contains(&leaf));
        assert!(root.contains(&root));

        let left = NodeId::new(1, 0);
        let right = NodeId::new(1, 1);
        assert!(left.contains(&NodeId::new(10, 511)));
        assert!(!left.contains(&NodeId::new(10, 512)));
        assert!(right.contains(&NodeId::new(10, 512)));
        assert!(!right.contains(&left));
    }

    #[test]
    fn test_follower_id_hex() {
        let id = FollowerId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
    }
}

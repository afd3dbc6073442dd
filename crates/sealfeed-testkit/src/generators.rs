//! Proptest generators for property-based testing.

use proptest::prelude::*;

use sealfeed_core::{
    Cek, Epoch, FeedId, FollowerId, LeafIndex, NodeId, Nonce24, OwnerId, MAX_EPOCH,
};

/// Generate a random OwnerId.
pub fn owner_id() -> impl Strategy<Value = OwnerId> {
    any::<[u8; 32]>().prop_map(OwnerId::from_bytes)
}

/// Generate a random FollowerId.
pub fn follower_id() -> impl Strategy<Value = FollowerId> {
    any::<[u8; 32]>().prop_map(FollowerId::from_bytes)
}

/// Generate a random FeedId.
pub fn feed_id() -> impl Strategy<Value = FeedId> {
    any::<[u8; 32]>().prop_map(FeedId::from_bytes)
}

/// Generate a random CEK.
pub fn cek() -> impl Strategy<Value = Cek> {
    any::<[u8; 32]>().prop_map(Cek::from_bytes)
}

/// Generate a valid epoch (1-indexed).
pub fn epoch() -> impl Strategy<Value = Epoch> {
    (1u32..=MAX_EPOCH).prop_map(Epoch::new)
}

/// Generate a pair of epochs with the first no newer than the second,
/// both at most `max`.
pub fn ordered_epochs_up_to(max: u32) -> impl Strategy<Value = (Epoch, Epoch)> {
    (1u32..=max)
        .prop_flat_map(|newer| (1u32..=newer, Just(newer)))
        .prop_map(|(older, newer)| (Epoch::new(older), Epoch::new(newer)))
}

/// Generate a pair of epochs with the first no newer than the second.
pub fn ordered_epochs() -> impl Strategy<Value = (Epoch, Epoch)> {
    ordered_epochs_up_to(MAX_EPOCH)
}

/// Generate a leaf index within a capacity.
pub fn leaf_index(capacity: u32) -> impl Strategy<Value = LeafIndex> {
    (0..capacity).prop_map(LeafIndex::new)
}

/// Generate a node in a tree of the given depth.
pub fn node_id(depth: u8) -> impl Strategy<Value = NodeId> {
    (0..=depth).prop_flat_map(|level| (Just(level), 0u32..(1u32 << level)))
        .prop_map(|(level, index)| NodeId::new(level, index))
}

/// Generate a random 24-byte nonce.
pub fn nonce() -> impl Strategy<Value = Nonce24> {
    any::<[u8; 24]>().prop_map(Nonce24::from_bytes)
}

/// Generate plaintext bytes of a bounded length.
pub fn plaintext(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate an optional teaser string.
pub fn teaser() -> impl Strategy<Value = Option<String>> {
    prop::option::of("[a-zA-Z0-9 ]{0,64}")
}

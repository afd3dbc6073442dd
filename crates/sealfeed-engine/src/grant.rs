//! The Grant protocol: onboarding a follower.
//!
//! A grant assigns a free leaf slot, bundles the slot's current path keys
//! with the current CEK and epoch, and hybrid-encrypts the bundle to the
//! follower's personal public key. Nothing else needs to change: existing
//! followers are unaffected, and historical ciphertext is untouched.

use sealfeed_core::{
    Cek, Epoch, FeedId, FollowerId, GrantBundle, GrantRecord, HybridCiphertext, X25519PublicKey,
};

use crate::error::Result;
use crate::tree::KeyTree;

/// Builds one Grant against the tree's and chain's current state.
pub struct GrantBuilder<'a> {
    feed_id: FeedId,
    tree: &'a mut KeyTree,
    epoch: Epoch,
    cek: Cek,
}

impl<'a> GrantBuilder<'a> {
    /// Start a grant at the feed's current epoch.
    pub fn new(feed_id: FeedId, tree: &'a mut KeyTree, epoch: Epoch, cek: Cek) -> Self {
        Self {
            feed_id,
            tree,
            epoch,
            cek,
        }
    }

    /// Assign a leaf to the follower and produce the Grant record for the
    /// owner to publish.
    ///
    /// Fails with `CapacityExceeded` when no slot is free (fatal to the
    /// caller, never retried) and `AlreadyGranted` if the follower already
    /// holds a slot. Re-granting after a revocation reuses a free slot
    /// with fresh key versions; old values are never reissued.
    pub fn grant(
        self,
        follower: FollowerId,
        follower_public: &X25519PublicKey,
    ) -> Result<GrantRecord> {
        let slot = self.tree.assign_leaf(follower)?;

        let bundle = GrantBundle {
            leaf_index: slot,
            epoch: self.epoch,
            cek: *self.cek.as_bytes(),
            path_keys: self.tree.path_keys(slot),
        };

        let ciphertext = HybridCiphertext::encrypt(follower_public, &bundle.to_bytes())
            .map_err(crate::error::EngineError::Core)?;

        tracing::debug!(follower = %follower, slot = %slot, epoch = %self.epoch, "grant issued");

        Ok(GrantRecord {
            feed_id: self.feed_id,
            follower,
            leaf_index: slot,
            bundle: ciphertext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealfeed_core::{LeafIndex, X25519StaticSecret};

    fn follower(n: u8) -> FollowerId {
        FollowerId::from_bytes([n; 32])
    }

    fn feed() -> FeedId {
        FeedId::from_bytes([0xfe; 32])
    }

    #[test]
    fn test_grant_assigns_and_bundles() {
        let mut tree = KeyTree::new(8).unwrap();
        let secret = X25519StaticSecret::generate();
        let cek = Cek::from_bytes([0x11; 32]);

        let record = GrantBuilder::new(feed(), &mut tree, Epoch::FIRST, cek.clone())
            .grant(follower(1), &secret.public_key())
            .unwrap();

        assert_eq!(record.leaf_index, LeafIndex::new(0));
        assert_eq!(record.follower, follower(1));

        // The follower can open the bundle and finds the full path.
        let plaintext = record.bundle.decrypt(&secret).unwrap();
        let bundle = GrantBundle::from_bytes(&plaintext).unwrap();
        assert_eq!(bundle.leaf_index, LeafIndex::new(0));
        assert_eq!(bundle.epoch, Epoch::FIRST);
        assert_eq!(bundle.cek, *cek.as_bytes());
        assert_eq!(bundle.path_keys.len(), tree.depth() as usize + 1);
    }

    #[test]
    fn test_grant_wrong_key_cannot_open_bundle() {
        let mut tree = KeyTree::new(8).unwrap();
        let secret = X25519StaticSecret::generate();
        let other = X25519StaticSecret::generate();

        let record = GrantBuilder::new(feed(), &mut tree, Epoch::FIRST, Cek::from_bytes([0; 32]))
            .grant(follower(1), &secret.public_key())
            .unwrap();

        assert!(record.bundle.decrypt(&other).is_err());
    }

    #[test]
    fn test_regrant_gets_fresh_leaf_key() {
        let mut tree = KeyTree::new(8).unwrap();
        let secret = X25519StaticSecret::generate();
        let cek = Cek::from_bytes([0x11; 32]);

        let first = GrantBuilder::new(feed(), &mut tree, Epoch::FIRST, cek.clone())
            .grant(follower(1), &secret.public_key())
            .unwrap();
        let first_bundle =
            GrantBundle::from_bytes(&first.bundle.decrypt(&secret).unwrap()).unwrap();

        tree.release_leaf(&follower(1)).unwrap();

        let second = GrantBuilder::new(feed(), &mut tree, Epoch::FIRST, cek)
            .grant(follower(2), &secret.public_key())
            .unwrap();
        let second_bundle =
            GrantBundle::from_bytes(&second.bundle.decrypt(&secret).unwrap()).unwrap();

        // Same slot, different leaf key version.
        assert_eq!(first.leaf_index, second.leaf_index);
        assert!(second_bundle.path_keys[0].version > first_bundle.path_keys[0].version);
        assert_ne!(second_bundle.path_keys[0].key, first_bundle.path_keys[0].key);
    }
}

//! The owner's feed key engine.
//!
//! An explicit, constructed object owning the key tree and the epoch
//! chain. The owner's device is the sole writer; there is no ambient
//! global state and no hidden cache. Callers hold the engine and pass it
//! by reference.

use sealfeed_core::{
    encrypt_post, Cek, EncryptedPostRecord, Epoch, EpochChain, FeedId, FeedStateRecord, FollowerId,
    GrantRecord, HybridCiphertext, OwnerId, RekeyEventRecord, Result as CoreResult,
    X25519PublicKey, X25519StaticSecret, DEFAULT_TREE_CAPACITY, MAX_EPOCH,
};

use crate::error::Result;
use crate::grant::GrantBuilder;
use crate::revoke::RevocationEngine;
use crate::tree::KeyTree;

/// Owner-side state for one feed: the LKH tree, the precomputed CEK
/// chain, and the current epoch.
pub struct FeedKeyEngine {
    owner: OwnerId,
    feed_id: FeedId,
    seed: [u8; 32],
    tree: KeyTree,
    chain: EpochChain,
    current_epoch: Epoch,
}

impl FeedKeyEngine {
    /// Create the engine for a new feed, starting at epoch 1.
    ///
    /// Deterministic given the seed (the tree's node keys are random, but
    /// the chain is not), so a recovered seed regenerates every CEK.
    pub fn new(
        owner: OwnerId,
        feed_name: &str,
        seed: [u8; 32],
        tree_capacity: u32,
        max_epoch: u32,
    ) -> Result<Self> {
        let feed_id = FeedId::derive(&owner, feed_name);
        let tree = KeyTree::new(tree_capacity)?;
        let chain = EpochChain::generate(&seed, max_epoch)?;

        tracing::info!(feed = %feed_id, capacity = tree_capacity, max_epoch, "feed key engine created");

        Ok(Self {
            owner,
            feed_id,
            seed,
            tree,
            chain,
            current_epoch: Epoch::FIRST,
        })
    }

    /// Create the engine with the default tree capacity (1,024 leaf slots)
    /// and the full epoch chain.
    pub fn with_defaults(owner: OwnerId, feed_name: &str, seed: [u8; 32]) -> Result<Self> {
        Self::new(owner, feed_name, seed, DEFAULT_TREE_CAPACITY, MAX_EPOCH)
    }

    /// The feed owner.
    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// The feed this engine manages.
    pub fn feed_id(&self) -> &FeedId {
        &self.feed_id
    }

    /// The current epoch.
    pub fn current_epoch(&self) -> Epoch {
        self.current_epoch
    }

    /// The CEK for the current epoch.
    pub fn current_cek(&self) -> &Cek {
        self.chain
            .cek(self.current_epoch)
            .expect("current epoch never exceeds max_epoch")
    }

    /// Number of currently granted followers.
    pub fn follower_count(&self) -> u32 {
        self.tree.assigned_count()
    }

    /// Whether a follower currently holds a slot.
    pub fn is_granted(&self, follower: &FollowerId) -> bool {
        self.tree.slot_of(follower).is_some()
    }

    /// Onboard a follower: assign a leaf slot and issue the Grant record.
    pub fn grant(
        &mut self,
        follower: FollowerId,
        follower_public: &X25519PublicKey,
    ) -> Result<GrantRecord> {
        let cek = self.current_cek().clone();
        GrantBuilder::new(self.feed_id, &mut self.tree, self.current_epoch, cek)
            .grant(follower, follower_public)
    }

    /// Evict a follower. Advances the epoch and returns the rekey event to
    /// publish; the follower's Grant record should be deleted from the
    /// ledger by the caller.
    pub fn revoke(&mut self, follower: &FollowerId) -> Result<RekeyEventRecord> {
        let event = RevocationEngine::new(self.feed_id, &mut self.tree, &self.chain)
            .revoke(follower, self.current_epoch)?;
        self.current_epoch = event.new_epoch;
        Ok(event)
    }

    /// Encrypt one post under the current epoch's CEK.
    pub fn encrypt_post(
        &self,
        plaintext: &[u8],
        teaser: Option<String>,
    ) -> CoreResult<EncryptedPostRecord> {
        encrypt_post(
            self.current_cek(),
            self.current_epoch,
            &self.owner,
            plaintext,
            teaser,
        )
    }

    /// Export the feed bootstrap record, with the chain seed encrypted to
    /// the owner's own public key for multi-device recovery.
    pub fn feed_state(&self, owner_public: &X25519PublicKey) -> CoreResult<FeedStateRecord> {
        Ok(FeedStateRecord {
            owner: self.owner,
            feed_id: self.feed_id,
            tree_capacity: self.tree.capacity(),
            max_epoch: self.chain.max_epoch().get(),
            encrypted_seed: HybridCiphertext::encrypt(owner_public, &self.seed)?,
        })
    }

    /// Recover the chain seed from a published feed state on another
    /// device holding the owner's secret.
    pub fn recover_seed(
        record: &FeedStateRecord,
        owner_secret: &X25519StaticSecret,
    ) -> CoreResult<[u8; 32]> {
        let bytes = record.encrypted_seed.decrypt(owner_secret)?;
        bytes.as_slice().try_into().map_err(|_| {
            sealfeed_core::CoreError::MalformedBundle("recovered seed is not 32 bytes".into())
        })
    }
}

impl std::fmt::Debug for FeedKeyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FeedKeyEngine(feed={}, epoch={}, followers={})",
            self.feed_id,
            self.current_epoch,
            self.follower_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn follower(n: u8) -> FollowerId {
        FollowerId::from_bytes([n; 32])
    }

    fn engine() -> FeedKeyEngine {
        FeedKeyEngine::new(OwnerId::from_bytes([1; 32]), "posts", [0x42; 32], 8, 64).unwrap()
    }

    #[test]
    fn test_grant_then_revoke_advances_epoch() {
        let mut engine = engine();
        let secret = X25519StaticSecret::generate();

        engine.grant(follower(1), &secret.public_key()).unwrap();
        engine.grant(follower(2), &secret.public_key()).unwrap();
        assert_eq!(engine.current_epoch(), Epoch::FIRST);
        assert_eq!(engine.follower_count(), 2);

        engine.revoke(&follower(1)).unwrap();
        assert_eq!(engine.current_epoch(), Epoch::new(2));
        assert_eq!(engine.follower_count(), 1);
        assert!(!engine.is_granted(&follower(1)));
        assert!(engine.is_granted(&follower(2)));
    }

    #[test]
    fn test_revoke_unknown_surfaces_error() {
        let mut engine = engine();
        assert!(matches!(
            engine.revoke(&follower(9)),
            Err(EngineError::UnknownFollower(_))
        ));
        // Epoch did not move.
        assert_eq!(engine.current_epoch(), Epoch::FIRST);
    }

    #[test]
    fn test_cek_changes_per_epoch() {
        let mut engine = engine();
        let secret = X25519StaticSecret::generate();
        engine.grant(follower(1), &secret.public_key()).unwrap();

        let cek1 = engine.current_cek().clone();
        engine.revoke(&follower(1)).unwrap();
        let cek2 = engine.current_cek().clone();

        assert_ne!(cek1.as_bytes(), cek2.as_bytes());
        // Older CEK is one hash of the newer.
        assert_eq!(*cek1.as_bytes(), sealfeed_core::sha256(cek2.as_bytes()));
    }

    #[test]
    fn test_post_encrypts_at_current_epoch() {
        let engine = engine();
        let record = engine.encrypt_post(b"hello", None).unwrap();
        assert_eq!(record.epoch, Epoch::FIRST);

        let plaintext = sealfeed_core::decrypt_post(engine.current_cek(), &record).unwrap();
        assert_eq!(&plaintext[..], b"hello");
    }

    #[test]
    fn test_with_defaults_uses_full_parameters() {
        let engine =
            FeedKeyEngine::with_defaults(OwnerId::from_bytes([1; 32]), "posts", [0x42; 32])
                .unwrap();
        let owner_secret = X25519StaticSecret::generate();

        let record = engine.feed_state(&owner_secret.public_key()).unwrap();
        assert_eq!(record.tree_capacity, DEFAULT_TREE_CAPACITY);
        assert_eq!(record.max_epoch, MAX_EPOCH);
    }

    #[test]
    fn test_feed_state_recovery() {
        let engine = engine();
        let owner_secret = X25519StaticSecret::generate();

        let record = engine.feed_state(&owner_secret.public_key()).unwrap();
        assert_eq!(record.tree_capacity, 8);
        assert_eq!(record.max_epoch, 64);

        let seed = FeedKeyEngine::recover_seed(&record, &owner_secret).unwrap();
        assert_eq!(seed, [0x42; 32]);

        // The recovered seed regenerates the identical chain.
        let rebuilt = FeedKeyEngine::new(
            OwnerId::from_bytes([1; 32]),
            "posts",
            seed,
            record.tree_capacity,
            record.max_epoch,
        )
        .unwrap();
        assert_eq!(
            rebuilt.current_cek().as_bytes(),
            engine.current_cek().as_bytes()
        );
    }
}

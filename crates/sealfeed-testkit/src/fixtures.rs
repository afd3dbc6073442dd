//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a feed with its owner-side
//! engine, and follower handles bundling an identity, a secret, and a
//! key store.

use sealfeed_core::{
    EncryptedPostRecord, FollowerId, GrantRecord, OwnerId, RekeyEventRecord, X25519StaticSecret,
};
use sealfeed_engine::FeedKeyEngine;
use sealfeed_follower::FollowerKeyStore;

/// Default tree capacity for fixtures; small so tests exercise full trees.
pub const FIXTURE_CAPACITY: u32 = 8;

/// Default epoch chain length for fixtures.
pub const FIXTURE_MAX_EPOCH: u32 = 64;

/// A feed with its owner-side engine and the owner's device secret.
pub struct FeedFixture {
    pub owner_secret: X25519StaticSecret,
    pub engine: FeedKeyEngine,
}

impl FeedFixture {
    /// Create a fixture with a deterministic chain seed.
    pub fn new() -> Self {
        Self::with_seed([0x42; 32])
    }

    /// Create with a specific chain seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::with_params(seed, FIXTURE_CAPACITY, FIXTURE_MAX_EPOCH)
    }

    /// Create with full control over capacity and chain length.
    pub fn with_params(seed: [u8; 32], capacity: u32, max_epoch: u32) -> Self {
        let owner = OwnerId::from_bytes([0x01; 32]);
        let engine = FeedKeyEngine::new(owner, "posts", seed, capacity, max_epoch)
            .expect("fixture parameters are valid");
        Self {
            owner_secret: X25519StaticSecret::generate(),
            engine,
        }
    }

    /// Grant a follower and apply the grant to its store.
    pub fn join(&mut self, follower: &mut FollowerHandle) -> GrantRecord {
        let grant = self
            .engine
            .grant(follower.id, &follower.secret.public_key())
            .expect("fixture grant succeeds");
        follower
            .store
            .apply_grant(&grant, &follower.secret)
            .expect("fixture grant applies");
        grant
    }

    /// Revoke a follower, returning the rekey event for stores to replay.
    pub fn revoke(&mut self, follower: &FollowerHandle) -> RekeyEventRecord {
        self.engine
            .revoke(&follower.id)
            .expect("fixture revocation succeeds")
    }

    /// Publish a post at the current epoch.
    pub fn post(&self, text: &str) -> EncryptedPostRecord {
        self.engine
            .encrypt_post(text.as_bytes(), None)
            .expect("fixture post encrypts")
    }

    /// A follower handle for this feed with a fresh keypair.
    pub fn follower(&self) -> FollowerHandle {
        FollowerHandle::generate(*self.engine.feed_id())
    }

    /// Multiple follower handles for multi-party tests.
    pub fn followers(&self, count: usize) -> Vec<FollowerHandle> {
        (0..count).map(|_| self.follower()).collect()
    }
}

impl Default for FeedFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// One follower: identity, device secret, and per-feed key store.
pub struct FollowerHandle {
    pub id: FollowerId,
    pub secret: X25519StaticSecret,
    pub store: FollowerKeyStore,
}

impl FollowerHandle {
    /// Generate a handle with a fresh keypair, identity derived from it.
    pub fn generate(feed_id: sealfeed_core::FeedId) -> Self {
        let secret = X25519StaticSecret::generate();
        let id = FollowerId::from_public_key(&secret.public_key());
        Self {
            id,
            secret,
            store: FollowerKeyStore::new(feed_id),
        }
    }

    /// Decrypt a post through the handle's store.
    pub fn read(&mut self, post: &EncryptedPostRecord) -> sealfeed_follower::Result<Vec<u8>> {
        Ok(self.store.decrypt_post(post)?.to_vec())
    }
}

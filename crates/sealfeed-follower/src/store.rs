//! Follower-side key state: one store per followed feed.
//!
//! The store moves through three states. It starts *uninitialized*,
//! becomes *current* when a Grant's key bundle is applied, and stays
//! current by replaying Rekey events in strict epoch order. A rekey it
//! cannot follow to the new root key means the follower was evicted (or
//! the state is corrupt): the store becomes *locked*, a terminal state
//! that only a fresh grant leaves.
//!
//! Locking never revokes history. The newest CEK the store reached keeps
//! every older epoch derivable, so posts published before the eviction
//! stay readable. What a locked store can never do is produce a CEK for
//! a newer epoch.

use std::collections::HashMap;

use sealfeed_core::{
    decrypt_post, derive_backward, AeadKey, Cek, Epoch, FeedId, GrantBundle, GrantRecord,
    LeafIndex, NodeId, RekeyEventRecord, X25519StaticSecret,
};

use crate::cache::CekCache;
use crate::error::{FollowerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Uninitialized,
    Current,
    Locked,
}

/// Keys held after a grant: the slot, the path key material, and the
/// newest CEK position on the epoch chain.
#[derive(Debug, Clone)]
struct KeyState {
    leaf: NodeId,
    leaf_index: LeafIndex,
    epoch: Epoch,
    newest_cek: Cek,
    path_keys: HashMap<NodeId, (u32, AeadKey)>,
}

/// Per-feed follower key store.
pub struct FollowerKeyStore {
    feed_id: FeedId,
    status: Status,
    keys: Option<KeyState>,
    cache: CekCache,
}

impl FollowerKeyStore {
    /// Create an uninitialized store for one feed.
    pub fn new(feed_id: FeedId) -> Self {
        Self {
            feed_id,
            status: Status::Uninitialized,
            keys: None,
            cache: CekCache::default(),
        }
    }

    /// The feed this store follows.
    pub fn feed_id(&self) -> &FeedId {
        &self.feed_id
    }

    /// The newest epoch the store has reached, once initialized.
    pub fn epoch(&self) -> Option<Epoch> {
        self.keys.as_ref().map(|k| k.epoch)
    }

    /// The leaf slot assigned by the applied grant.
    pub fn leaf_index(&self) -> Option<LeafIndex> {
        self.keys.as_ref().map(|k| k.leaf_index)
    }

    /// Whether the store holds current keys.
    pub fn is_current(&self) -> bool {
        self.status == Status::Current
    }

    /// Whether the store has been locked out of the feed.
    pub fn is_locked(&self) -> bool {
        self.status == Status::Locked
    }

    /// Apply a Grant addressed to this follower, decrypting the key bundle
    /// with the follower's personal secret.
    ///
    /// Valid from the uninitialized state and from the locked state (a
    /// re-grant after eviction starts the follower over at the feed's
    /// current epoch). Applying a grant over current keys is rejected.
    pub fn apply_grant(
        &mut self,
        record: &GrantRecord,
        secret: &X25519StaticSecret,
    ) -> Result<()> {
        if self.status == Status::Current {
            return Err(FollowerError::AlreadyInitialized);
        }
        self.check_feed(&record.feed_id)?;

        let plaintext = record.bundle.decrypt(secret)?;
        let bundle = GrantBundle::from_bytes(&plaintext)?;
        let keys = Self::unpack_bundle(&bundle)?;

        tracing::debug!(
            feed = %self.feed_id,
            slot = %keys.leaf_index,
            epoch = %keys.epoch,
            "grant applied"
        );

        self.keys = Some(keys);
        self.status = Status::Current;
        self.cache.clear();
        Ok(())
    }

    /// Replay one Rekey event.
    ///
    /// Events must arrive in strict epoch order; a gap or repeat fails with
    /// [`FollowerError::StaleEpoch`] and leaves the store unchanged, so the
    /// caller can fetch the missing events and retry. A single pass over
    /// the packets suffices because the owner orders them from the evicted
    /// leaf's parent up to the root: a packet wrapped under a new key
    /// always follows the packet that taught us that key.
    ///
    /// If the pass does not yield the new root key the store locks: either
    /// this follower was the one evicted, or its state has diverged from
    /// the tree. Both are unrecoverable without a fresh grant.
    pub fn apply_rekey(&mut self, record: &RekeyEventRecord) -> Result<()> {
        match self.status {
            Status::Uninitialized => return Err(FollowerError::NotInitialized),
            Status::Locked => return Err(FollowerError::LockedOut),
            Status::Current => {}
        }
        self.check_feed(&record.feed_id)?;

        let keys = self.keys.as_ref().ok_or(FollowerError::NotInitialized)?;
        let expected = keys.epoch.next();
        if record.new_epoch != expected {
            return Err(FollowerError::StaleEpoch {
                expected,
                got: record.new_epoch,
            });
        }

        let (learned, cek_bytes) = match replay_packets(keys, record) {
            Ok(outcome) => outcome,
            Err(reason) => return self.lock(reason),
        };

        let keys = self.keys.as_mut().ok_or(FollowerError::NotInitialized)?;
        for (node, entry) in learned {
            keys.path_keys.insert(node, entry);
        }
        keys.epoch = record.new_epoch;
        keys.newest_cek = Cek::from_bytes(cek_bytes);
        self.cache.clear();

        tracing::debug!(
            feed = %self.feed_id,
            epoch = %record.new_epoch,
            "rekey applied"
        );
        Ok(())
    }

    /// The CEK for an epoch, derived backward from the newest known CEK.
    ///
    /// Available in the locked state too, for epochs up to the last one
    /// the store reached: eviction stops new keys, not old ones.
    pub fn cek_at(&mut self, epoch: Epoch) -> Result<Cek> {
        let keys = match self.status {
            Status::Uninitialized => return Err(FollowerError::NotInitialized),
            Status::Current | Status::Locked => {
                self.keys.as_ref().ok_or(FollowerError::NotInitialized)?
            }
        };

        if epoch > keys.epoch {
            return Err(match self.status {
                Status::Locked => FollowerError::LockedOut,
                _ => FollowerError::KeyNotFound { epoch },
            });
        }
        if !epoch.is_valid() {
            return Err(FollowerError::KeyNotFound { epoch });
        }

        if let Some(cek) = self.cache.get(epoch) {
            return Ok(cek.clone());
        }

        let cek = derive_backward(&keys.newest_cek, keys.epoch, epoch)?;
        self.cache.insert(epoch, cek.clone());
        Ok(cek)
    }

    /// Decrypt a post using the store's key material.
    pub fn decrypt_post(
        &mut self,
        record: &sealfeed_core::EncryptedPostRecord,
    ) -> Result<bytes::Bytes> {
        let cek = self.cek_at(record.epoch)?;
        Ok(decrypt_post(&cek, record)?)
    }

    fn check_feed(&self, feed_id: &FeedId) -> Result<()> {
        if feed_id != &self.feed_id {
            return Err(FollowerError::Core(
                sealfeed_core::CoreError::MalformedRecord(format!(
                    "record for feed {} applied to store for feed {}",
                    feed_id, self.feed_id
                )),
            ));
        }
        Ok(())
    }

    fn unpack_bundle(bundle: &GrantBundle) -> Result<KeyState> {
        let first = bundle.path_keys.first().ok_or_else(|| {
            sealfeed_core::CoreError::MalformedBundle("bundle has no path keys".into())
        })?;
        let last = bundle.path_keys.last().ok_or_else(|| {
            sealfeed_core::CoreError::MalformedBundle("bundle has no path keys".into())
        })?;

        let leaf = NodeId::leaf(first.node.level, bundle.leaf_index);
        if first.node != leaf || !last.node.is_root() {
            return Err(FollowerError::Core(
                sealfeed_core::CoreError::MalformedBundle(
                    "path keys do not run from the assigned leaf to the root".into(),
                ),
            ));
        }

        let mut path_keys = HashMap::with_capacity(bundle.path_keys.len());
        for path_key in &bundle.path_keys {
            if !path_key.node.contains(&leaf) {
                return Err(FollowerError::Core(
                    sealfeed_core::CoreError::MalformedBundle(format!(
                        "path key for {} is off the leaf's path",
                        path_key.node
                    )),
                ));
            }
            path_keys.insert(path_key.node, (path_key.version, path_key.aead_key()));
        }

        Ok(KeyState {
            leaf,
            leaf_index: bundle.leaf_index,
            epoch: bundle.epoch,
            newest_cek: bundle.cek(),
            path_keys,
        })
    }

    fn lock(&mut self, reason: &str) -> Result<()> {
        tracing::warn!(feed = %self.feed_id, reason, "follower locked out");
        self.status = Status::Locked;
        Err(FollowerError::LockedOut)
    }
}

/// One pass over a rekey event's packets against the held path keys.
///
/// Returns the keys learned for our path plus the new CEK bytes, or a
/// lockout reason when the event does not lead to the new root key.
fn replay_packets(
    keys: &KeyState,
    record: &RekeyEventRecord,
) -> std::result::Result<(HashMap<NodeId, (u32, AeadKey)>, [u8; 32]), &'static str> {
    let mut learned: HashMap<NodeId, (u32, AeadKey)> = HashMap::new();

    for packet in &record.packets {
        if !packet.target.contains(&keys.leaf) {
            continue;
        }

        let wrap_key = if packet.wrap_is_new {
            learned
                .get(&packet.wrap)
                .filter(|(version, _)| *version == packet.wrap_version)
                .map(|(_, key)| key.clone())
        } else {
            keys.path_keys
                .get(&packet.wrap)
                .filter(|(version, _)| *version == packet.wrap_version)
                .map(|(_, key)| key.clone())
        };

        // A packet for a path node we cannot open is normal: each node gets
        // up to two packets and we hold the wrap key for at most one.
        let Some(wrap_key) = wrap_key else {
            continue;
        };

        let bytes = wrap_key
            .decrypt(&packet.nonce, &packet.ciphertext)
            .map_err(|_| "rekey packet failed to decrypt")?;
        let raw =
            <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| "rekey packet carried a malformed key")?;

        learned.insert(packet.target, (packet.target_version, AeadKey::from_bytes(raw)));
    }

    let Some((_, root_key)) = learned.get(&NodeId::ROOT) else {
        return Err("no path to the new root key");
    };

    let bytes = root_key
        .decrypt(&record.cek_nonce, &record.encrypted_cek)
        .map_err(|_| "content key failed to decrypt")?;
    let cek_bytes = <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| "rekey event carried a malformed content key")?;

    Ok((learned, cek_bytes))
}

impl std::fmt::Debug for FollowerKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FollowerKeyStore(feed={}, status={:?}, epoch={:?})",
            self.feed_id,
            self.status,
            self.epoch()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealfeed_core::{FollowerId, OwnerId};
    use sealfeed_engine::FeedKeyEngine;

    struct Member {
        id: FollowerId,
        secret: X25519StaticSecret,
        store: FollowerKeyStore,
    }

    fn member(n: u8, feed_id: FeedId) -> Member {
        let secret = X25519StaticSecret::generate();
        Member {
            id: FollowerId::from_bytes([n; 32]),
            secret,
            store: FollowerKeyStore::new(feed_id),
        }
    }

    fn engine() -> FeedKeyEngine {
        FeedKeyEngine::new(OwnerId::from_bytes([1; 32]), "posts", [0x42; 32], 8, 64).unwrap()
    }

    fn join(engine: &mut FeedKeyEngine, member: &mut Member) {
        let grant = engine.grant(member.id, &member.secret.public_key()).unwrap();
        member.store.apply_grant(&grant, &member.secret).unwrap();
    }

    #[test]
    fn test_grant_initializes_store() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());

        assert!(!bob.store.is_current());
        join(&mut engine, &mut bob);

        assert!(bob.store.is_current());
        assert_eq!(bob.store.epoch(), Some(Epoch::FIRST));
        assert_eq!(bob.store.leaf_index(), Some(LeafIndex::new(0)));
    }

    #[test]
    fn test_uninitialized_store_rejects_everything() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());
        join(&mut engine, &mut bob);
        let event = engine.revoke(&bob.id).unwrap();

        let mut fresh = FollowerKeyStore::new(*engine.feed_id());
        assert!(matches!(
            fresh.apply_rekey(&event),
            Err(FollowerError::NotInitialized)
        ));
        assert!(matches!(
            fresh.cek_at(Epoch::FIRST),
            Err(FollowerError::NotInitialized)
        ));
    }

    #[test]
    fn test_double_grant_rejected() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());
        join(&mut engine, &mut bob);

        let grant = engine
            .grant(FollowerId::from_bytes([3; 32]), &bob.secret.public_key())
            .unwrap();
        assert!(matches!(
            bob.store.apply_grant(&grant, &bob.secret),
            Err(FollowerError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_decrypts_current_and_past_posts() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());
        let mut carol = member(3, *engine.feed_id());
        join(&mut engine, &mut bob);
        join(&mut engine, &mut carol);

        let old_post = engine.encrypt_post(b"epoch one", None).unwrap();
        let event = engine.revoke(&bob.id).unwrap();
        carol.store.apply_rekey(&event).unwrap();

        let new_post = engine.encrypt_post(b"epoch two", None).unwrap();

        assert_eq!(carol.store.epoch(), Some(Epoch::new(2)));
        assert_eq!(&carol.store.decrypt_post(&new_post).unwrap()[..], b"epoch two");
        // Backward derivation keeps history readable.
        assert_eq!(&carol.store.decrypt_post(&old_post).unwrap()[..], b"epoch one");
    }

    #[test]
    fn test_evicted_follower_locks_but_keeps_history() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());
        let mut carol = member(3, *engine.feed_id());
        join(&mut engine, &mut bob);
        join(&mut engine, &mut carol);

        let old_post = engine.encrypt_post(b"before", None).unwrap();
        let event = engine.revoke(&bob.id).unwrap();

        assert!(matches!(
            bob.store.apply_rekey(&event),
            Err(FollowerError::LockedOut)
        ));
        assert!(bob.store.is_locked());

        // New posts are out of reach.
        let new_post = engine.encrypt_post(b"after", None).unwrap();
        assert!(matches!(
            bob.store.decrypt_post(&new_post),
            Err(FollowerError::LockedOut)
        ));

        // Posts from before the eviction stay readable.
        assert_eq!(&bob.store.decrypt_post(&old_post).unwrap()[..], b"before");
    }

    #[test]
    fn test_rekey_out_of_order_rejected() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());
        let mut carol = member(3, *engine.feed_id());
        let mut dave = member(4, *engine.feed_id());
        join(&mut engine, &mut bob);
        join(&mut engine, &mut carol);
        join(&mut engine, &mut dave);

        let first = engine.revoke(&bob.id).unwrap();
        let second = engine.revoke(&dave.id).unwrap();

        // Skipping an event is detected and leaves the store usable.
        assert!(matches!(
            carol.store.apply_rekey(&second),
            Err(FollowerError::StaleEpoch { .. })
        ));
        assert!(carol.store.is_current());
        assert_eq!(carol.store.epoch(), Some(Epoch::FIRST));

        // Replaying in order succeeds.
        carol.store.apply_rekey(&first).unwrap();
        carol.store.apply_rekey(&second).unwrap();
        assert_eq!(carol.store.epoch(), Some(Epoch::new(3)));

        // Replaying a consumed event is also stale.
        assert!(matches!(
            carol.store.apply_rekey(&first),
            Err(FollowerError::StaleEpoch { .. })
        ));
    }

    #[test]
    fn test_regrant_recovers_locked_store() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());
        let mut carol = member(3, *engine.feed_id());
        join(&mut engine, &mut bob);
        join(&mut engine, &mut carol);

        let event = engine.revoke(&bob.id).unwrap();
        let _ = bob.store.apply_rekey(&event);
        assert!(bob.store.is_locked());

        // Owner re-approves Bob: a fresh grant at the current epoch.
        join(&mut engine, &mut bob);
        assert!(bob.store.is_current());
        assert_eq!(bob.store.epoch(), Some(Epoch::new(2)));

        let post = engine.encrypt_post(b"welcome back", None).unwrap();
        assert_eq!(&bob.store.decrypt_post(&post).unwrap()[..], b"welcome back");
    }

    #[test]
    fn test_future_epoch_key_not_found() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());
        join(&mut engine, &mut bob);

        assert!(matches!(
            bob.store.cek_at(Epoch::new(5)),
            Err(FollowerError::KeyNotFound { .. })
        ));
    }

    #[test]
    fn test_wrong_feed_record_rejected() {
        let mut engine = engine();
        let mut bob = member(2, *engine.feed_id());

        let mut other = FeedKeyEngine::new(
            OwnerId::from_bytes([9; 32]),
            "other",
            [0x43; 32],
            8,
            64,
        )
        .unwrap();
        let stray = other.grant(bob.id, &bob.secret.public_key()).unwrap();
        assert!(bob.store.apply_grant(&stray, &bob.secret).is_err());
        assert!(!bob.store.is_current());

        join(&mut engine, &mut bob);
        assert!(bob.store.is_current());
    }

    #[test]
    fn test_many_followers_survive_many_revocations() {
        let mut engine = engine();
        let mut members: Vec<Member> = (0..8).map(|n| member(n + 10, *engine.feed_id())).collect();
        for m in members.iter_mut() {
            join(&mut engine, m);
        }

        // Revoke every other follower, replaying events on the survivors.
        for round in 0..4 {
            let evicted = members[round * 2].id;
            let event = engine.revoke(&evicted).unwrap();
            for m in members.iter_mut() {
                let _ = m.store.apply_rekey(&event);
            }
        }

        let post = engine.encrypt_post(b"survivors only", None).unwrap();
        for (i, m) in members.iter_mut().enumerate() {
            if i % 2 == 0 {
                assert!(m.store.is_locked(), "member {} should be locked", i);
                assert!(m.store.decrypt_post(&post).is_err());
            } else {
                assert!(m.store.is_current(), "member {} should be current", i);
                assert_eq!(&m.store.decrypt_post(&post).unwrap()[..], b"survivors only");
            }
        }
    }
}

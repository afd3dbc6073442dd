//! The Revoke protocol: evicting a follower in O(log N) packets.
//!
//! Revocation bumps the epoch, re-versions every node on the evicted
//! path from the leaf's parent to the root, and publishes a minimal set
//! of rekey packets. Each re-keyed node gets at most two packets:
//!
//! - its new key wrapped under the *current* key of its off-path child
//!   (the sibling subtree root — a key the evicted follower never held),
//!   skipped when that subtree holds no assigned leaf;
//! - its new key wrapped under the previous step's *new* key, so
//!   followers who entered lower on the path can climb, skipped when the
//!   on-path child's subtree is empty.
//!
//! Every remaining follower's path joins the evicted path at exactly one
//! node, decrypts that node's sibling-wrapped packet with a key it already
//! holds, then follows the chained packets to the root. The evicted
//! follower holds only superseded on-path keys, none of which wrap
//! anything — that is the lockout, cryptographic rather than by omission.

use sealfeed_core::{
    AeadKey, Epoch, EpochChain, FeedId, FollowerId, NodeId, Nonce24, RekeyEventRecord, RekeyPacket,
};

use crate::error::{EngineError, Result};
use crate::tree::KeyTree;

/// Produces one rekey event against the tree's current state.
pub struct RevocationEngine<'a> {
    feed_id: FeedId,
    tree: &'a mut KeyTree,
    chain: &'a EpochChain,
}

impl<'a> RevocationEngine<'a> {
    /// Prepare a revocation against the given tree and chain.
    pub fn new(feed_id: FeedId, tree: &'a mut KeyTree, chain: &'a EpochChain) -> Self {
        Self {
            feed_id,
            tree,
            chain,
        }
    }

    /// Evict a follower. Returns the rekey event for the owner to publish.
    ///
    /// Fails with `UnknownFollower` when the identity holds no slot (a
    /// second revoke of the same follower lands here) and `EpochExhausted`
    /// when the chain has no epoch left to advance to.
    pub fn revoke(self, follower: &FollowerId, current_epoch: Epoch) -> Result<RekeyEventRecord> {
        let slot = self
            .tree
            .slot_of(follower)
            .ok_or(EngineError::UnknownFollower(*follower))?;

        let new_epoch = current_epoch.next();
        if new_epoch > self.chain.max_epoch() {
            return Err(EngineError::EpochExhausted {
                max: self.chain.max_epoch(),
            });
        }

        self.tree.release_leaf(follower)?;

        let depth = self.tree.depth();
        let mut packets = Vec::with_capacity(2 * depth as usize);
        let mut node = NodeId::leaf(depth, slot);
        // The previous step's new key, used to chain packets up the path.
        let mut below: Option<(NodeId, u32, AeadKey)> = None;

        while let Some(parent) = node.parent() {
            let off_path = node.sibling().expect("non-root node has a sibling");
            let off_path_key = {
                let (version, key) = self.tree.key_of(off_path);
                (version, key.clone())
            };

            let (new_version, new_key) = self.tree.bump_version(parent);

            if self.tree.subtree_occupied(off_path) {
                packets.push(seal_packet(
                    parent,
                    new_version,
                    &new_key,
                    off_path,
                    off_path_key.0,
                    &off_path_key.1,
                    false,
                )?);
            }

            if let Some((below_node, below_version, below_key)) = &below {
                if self.tree.subtree_occupied(*below_node) {
                    packets.push(seal_packet(
                        parent,
                        new_version,
                        &new_key,
                        *below_node,
                        *below_version,
                        below_key,
                        true,
                    )?);
                }
            }

            below = Some((parent, new_version, new_key));
            node = parent;
        }

        let (_, root_version, root_key) = below.expect("tree depth is at least 1");
        debug_assert_eq!(root_version, self.tree.key_of(NodeId::ROOT).0);

        let new_cek = self.chain.cek(new_epoch).map_err(EngineError::Core)?;
        let cek_nonce = Nonce24::generate();
        let encrypted_cek = root_key
            .encrypt(&cek_nonce, new_cek.as_bytes())
            .map_err(EngineError::Core)?;

        tracing::debug!(
            follower = %follower,
            slot = %slot,
            new_epoch = %new_epoch,
            packets = packets.len(),
            "follower revoked"
        );

        Ok(RekeyEventRecord {
            feed_id: self.feed_id,
            new_epoch,
            packets,
            cek_nonce,
            encrypted_cek,
        })
    }
}

#[allow(clippy::too_many_arguments)]
fn seal_packet(
    target: NodeId,
    target_version: u32,
    new_key: &AeadKey,
    wrap: NodeId,
    wrap_version: u32,
    wrap_key: &AeadKey,
    wrap_is_new: bool,
) -> Result<RekeyPacket> {
    let nonce = Nonce24::generate();
    let ciphertext = wrap_key
        .encrypt(&nonce, new_key.as_bytes())
        .map_err(EngineError::Core)?;

    Ok(RekeyPacket {
        target,
        target_version,
        wrap,
        wrap_version,
        wrap_is_new,
        nonce,
        ciphertext,
    })
}

//! The Logical Key Hierarchy: a fixed-capacity binary tree of versioned
//! node keys.
//!
//! Every node, leaves included, carries a random 32-byte key with a
//! monotonically increasing version. A follower assigned to a leaf knows
//! exactly the keys on its path to the root (leaf included), which is what
//! makes O(log N) revocation possible: re-keying one path and publishing
//! one packet per off-path sibling reaches every remaining follower.
//!
//! Superseded key versions stay retrievable but are never issued again;
//! a slot reassigned after a revocation gets a fresh leaf key version so
//! the previous occupant learns nothing about its successor.

use std::collections::{BTreeSet, HashMap};

use sealfeed_core::{AeadKey, FollowerId, LeafIndex, NodeId, PathKey};

use crate::error::{EngineError, Result};

/// Upper bound on leaf capacity (depth stays comfortably within u8).
pub const MAX_TREE_CAPACITY: u32 = 1 << 16;

/// One node's current key plus its superseded versions.
struct NodeState {
    version: u32,
    key: AeadKey,
    history: HashMap<u32, AeadKey>,
}

impl NodeState {
    fn fresh() -> Self {
        Self {
            version: 0,
            key: AeadKey::generate(),
            history: HashMap::new(),
        }
    }

    fn bump(&mut self) -> (u32, AeadKey) {
        let old = std::mem::replace(&mut self.key, AeadKey::generate());
        self.history.insert(self.version, old);
        self.version += 1;
        (self.version, self.key.clone())
    }
}

/// A complete binary key tree over follower leaf slots.
pub struct KeyTree {
    capacity: u32,
    depth: u8,
    // Heap layout, 1-based: node (level, index) lives at (1 << level) + index.
    nodes: Vec<NodeState>,
    slots: Vec<Option<FollowerId>>,
    by_follower: HashMap<FollowerId, LeafIndex>,
    free: BTreeSet<u32>,
}

impl KeyTree {
    /// Create a tree with the given leaf capacity (a power of two ≥ 2).
    ///
    /// Every node starts with a fresh random key at version 0.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity < 2 || capacity > MAX_TREE_CAPACITY || !capacity.is_power_of_two() {
            return Err(sealfeed_core::CoreError::InvalidCapacity(format!(
                "tree capacity must be a power of two in 2..={}, got {}",
                MAX_TREE_CAPACITY, capacity
            ))
            .into());
        }

        let node_count = 2 * capacity as usize;
        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            nodes.push(NodeState::fresh());
        }

        Ok(Self {
            capacity,
            depth: capacity.trailing_zeros() as u8,
            nodes,
            slots: vec![None; capacity as usize],
            by_follower: HashMap::new(),
            free: (0..capacity).collect(),
        })
    }

    /// Leaf capacity.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tree depth: `log2(capacity)`, so every path has `depth + 1` nodes.
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Number of currently assigned slots.
    pub fn assigned_count(&self) -> u32 {
        self.by_follower.len() as u32
    }

    fn heap_index(&self, node: NodeId) -> usize {
        debug_assert!(node.level <= self.depth);
        debug_assert!(node.index < (1u32 << node.level));
        (1usize << node.level) + node.index as usize
    }

    /// Assign the lowest-index free slot to a follower.
    ///
    /// The leaf key is re-versioned on every assignment so a slot's
    /// previous occupant never shares a key with its successor.
    pub fn assign_leaf(&mut self, follower: FollowerId) -> Result<LeafIndex> {
        if self.by_follower.contains_key(&follower) {
            return Err(EngineError::AlreadyGranted(follower));
        }

        let index = *self
            .free
            .iter()
            .next()
            .ok_or(EngineError::CapacityExceeded {
                capacity: self.capacity,
            })?;
        self.free.remove(&index);

        let slot = LeafIndex::new(index);
        self.slots[index as usize] = Some(follower);
        self.by_follower.insert(follower, slot);
        self.bump_version(NodeId::leaf(self.depth, slot));

        Ok(slot)
    }

    /// Free a follower's slot. The slot's keys stay burned: any future
    /// occupant gets a new version.
    pub fn release_leaf(&mut self, follower: &FollowerId) -> Result<LeafIndex> {
        let slot = self
            .by_follower
            .remove(follower)
            .ok_or(EngineError::UnknownFollower(*follower))?;
        self.slots[slot.get() as usize] = None;
        self.free.insert(slot.get());
        Ok(slot)
    }

    /// The slot currently assigned to a follower, if any.
    pub fn slot_of(&self, follower: &FollowerId) -> Option<LeafIndex> {
        self.by_follower.get(follower).copied()
    }

    /// The nodes on a slot's path, leaf first, root last.
    pub fn direct_path(&self, slot: LeafIndex) -> Vec<NodeId> {
        let mut path = Vec::with_capacity(self.depth as usize + 1);
        let mut node = NodeId::leaf(self.depth, slot);
        path.push(node);
        while let Some(parent) = node.parent() {
            path.push(parent);
            node = parent;
        }
        path
    }

    /// The sibling of each direct-path node below the root, leaf level
    /// first. This is the minimal cover of every leaf *outside* the path.
    pub fn copath(&self, slot: LeafIndex) -> Vec<NodeId> {
        self.direct_path(slot)
            .iter()
            .filter_map(|node| node.sibling())
            .collect()
    }

    /// Current version and key of a node.
    pub fn key_of(&self, node: NodeId) -> (u32, &AeadKey) {
        let state = &self.nodes[self.heap_index(node)];
        (state.version, &state.key)
    }

    /// A node's key at a specific version, if it ever existed.
    pub fn key_at(&self, node: NodeId, version: u32) -> Option<&AeadKey> {
        let state = &self.nodes[self.heap_index(node)];
        if version == state.version {
            Some(&state.key)
        } else {
            state.history.get(&version)
        }
    }

    /// Replace a node's key with a fresh random one and increment its
    /// version. The superseded key stays retrievable via [`Self::key_at`].
    pub fn bump_version(&mut self, node: NodeId) -> (u32, AeadKey) {
        let idx = self.heap_index(node);
        self.nodes[idx].bump()
    }

    /// Whether any assigned leaf lies in the subtree rooted at `node`.
    pub fn subtree_occupied(&self, node: NodeId) -> bool {
        let shift = self.depth - node.level;
        let first = (node.index as usize) << shift;
        let last = ((node.index as usize) + 1) << shift;
        self.slots[first..last].iter().any(Option::is_some)
    }

    /// The versioned keys on a slot's path, leaf first, root last —
    /// exactly what a grant bundle carries.
    pub fn path_keys(&self, slot: LeafIndex) -> Vec<PathKey> {
        self.direct_path(slot)
            .into_iter()
            .map(|node| {
                let (version, key) = self.key_of(node);
                PathKey {
                    node,
                    version,
                    key: *key.as_bytes(),
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for KeyTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "KeyTree(capacity={}, assigned={})",
            self.capacity,
            self.assigned_count()
        )
    }
}

//! The per-epoch Content Encryption Key hash chain.
//!
//! CEKs are precomputed from a single random seed, highest epoch first:
//! `cek[max] = kdf(seed, "sealfeed-cek-root-v1")`, then
//! `cek[e] = sha256(cek[e+1])` down to epoch 1. Knowing any CEK lets a
//! reader derive every *older* CEK by repeated hashing; deriving a newer
//! one from an older one would require inverting SHA-256. That one-way
//! property is the whole forward-secrecy story: a revoked follower keeps
//! reading history and nothing else.

use crate::crypto::{kdf, sha256};
use crate::error::{CoreError, Result};
use crate::types::Epoch;

/// Maximum number of epochs a feed can advance through.
pub const MAX_EPOCH: u32 = 2000;

/// Domain-separation context for the chain root.
const CEK_ROOT_CONTEXT: &[u8] = b"sealfeed-cek-root-v1";

/// A Content Encryption Key for one epoch's worth of posts.
#[derive(Clone, PartialEq, Eq)]
pub struct Cek(pub(crate) [u8; 32]);

impl Cek {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Cek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cek(..)")
    }
}

/// Derive the CEK of an older epoch from a known one.
///
/// Applies SHA-256 `known_epoch - target` times. Fails with
/// [`CoreError::EpochOutOfRange`] when the target is newer than the known
/// epoch (forward derivation is intentionally impossible) or below 1.
pub fn derive_backward(known: &Cek, known_epoch: Epoch, target: Epoch) -> Result<Cek> {
    if !target.is_valid() || target > known_epoch {
        return Err(CoreError::EpochOutOfRange {
            target,
            known: known_epoch,
        });
    }

    let mut cek = known.0;
    for _ in target.get()..known_epoch.get() {
        cek = sha256(&cek);
    }
    Ok(Cek(cek))
}

/// The owner-side precomputed chain of CEKs for epochs `1..=max_epoch`.
#[derive(Clone)]
pub struct EpochChain {
    // ceks[e - 1] is the CEK for epoch e.
    ceks: Vec<Cek>,
    max_epoch: Epoch,
}

impl EpochChain {
    /// Precompute the full chain from a 32-byte seed.
    ///
    /// Deterministic given the seed, so the owner can regenerate the chain
    /// on another device from the recovered seed alone.
    pub fn generate(seed: &[u8; 32], max_epoch: u32) -> Result<Self> {
        if max_epoch == 0 || max_epoch > MAX_EPOCH {
            return Err(CoreError::InvalidCapacity(format!(
                "max_epoch must be in 1..={}, got {}",
                MAX_EPOCH, max_epoch
            )));
        }

        let mut ceks = vec![Cek([0u8; 32]); max_epoch as usize];
        ceks[max_epoch as usize - 1] = Cek(kdf(seed, CEK_ROOT_CONTEXT));
        for e in (1..max_epoch).rev() {
            let next = ceks[e as usize].0;
            ceks[e as usize - 1] = Cek(sha256(&next));
        }

        Ok(Self {
            ceks,
            max_epoch: Epoch::new(max_epoch),
        })
    }

    /// The highest epoch this chain supports.
    pub fn max_epoch(&self) -> Epoch {
        self.max_epoch
    }

    /// The CEK for a given epoch.
    pub fn cek(&self, epoch: Epoch) -> Result<&Cek> {
        if !epoch.is_valid() || epoch > self.max_epoch {
            return Err(CoreError::EpochOutOfRange {
                target: epoch,
                known: self.max_epoch,
            });
        }
        Ok(&self.ceks[epoch.get() as usize - 1])
    }
}

impl std::fmt::Debug for EpochChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EpochChain(max_epoch={})", self.max_epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_link_consistency() {
        let chain = EpochChain::generate(&[0x42; 32], 16).unwrap();

        // cek[e] == sha256(cek[e+1]) for every valid e.
        for e in 1..16u32 {
            let older = chain.cek(Epoch::new(e)).unwrap();
            let newer = chain.cek(Epoch::new(e + 1)).unwrap();
            assert_eq!(older.0, sha256(&newer.0));
        }
    }

    #[test]
    fn test_chain_deterministic() {
        let a = EpochChain::generate(&[0x42; 32], 8).unwrap();
        let b = EpochChain::generate(&[0x42; 32], 8).unwrap();
        assert_eq!(a.cek(Epoch::FIRST).unwrap(), b.cek(Epoch::FIRST).unwrap());

        let c = EpochChain::generate(&[0x43; 32], 8).unwrap();
        assert_ne!(a.cek(Epoch::FIRST).unwrap(), c.cek(Epoch::FIRST).unwrap());
    }

    #[test]
    fn test_derive_backward_matches_chain() {
        let chain = EpochChain::generate(&[0x42; 32], 16).unwrap();
        let newest = chain.cek(Epoch::new(16)).unwrap();

        for e in 1..=16u32 {
            let derived = derive_backward(newest, Epoch::new(16), Epoch::new(e)).unwrap();
            assert_eq!(&derived, chain.cek(Epoch::new(e)).unwrap());
        }
    }

    #[test]
    fn test_derive_forward_fails() {
        let chain = EpochChain::generate(&[0x42; 32], 8).unwrap();
        let old = chain.cek(Epoch::new(3)).unwrap();

        let err = derive_backward(old, Epoch::new(3), Epoch::new(4)).unwrap_err();
        assert!(matches!(err, CoreError::EpochOutOfRange { .. }));
    }

    #[test]
    fn test_derive_epoch_zero_fails() {
        let chain = EpochChain::generate(&[0x42; 32], 8).unwrap();
        let known = chain.cek(Epoch::new(3)).unwrap();

        assert!(derive_backward(known, Epoch::new(3), Epoch::new(0)).is_err());
    }

    #[test]
    fn test_generate_rejects_bad_max() {
        assert!(EpochChain::generate(&[0u8; 32], 0).is_err());
        assert!(EpochChain::generate(&[0u8; 32], MAX_EPOCH + 1).is_err());
        assert!(EpochChain::generate(&[0u8; 32], MAX_EPOCH).is_ok());
    }

    #[test]
    fn test_cek_out_of_range() {
        let chain = EpochChain::generate(&[0x42; 32], 8).unwrap();
        assert!(chain.cek(Epoch::new(9)).is_err());
        assert!(chain.cek(Epoch::new(0)).is_err());
    }
}

//! Cryptographic primitives for Sealfeed.
//!
//! XChaCha20-Poly1305 authenticated encryption (192-bit nonces, safe to
//! draw at random per call), an HMAC-SHA-256 key derivation function, and
//! an ECIES-style hybrid construction over X25519 for one-time bundle
//! delivery. Pure functions over key material; no state.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Derive 32 bytes from input key material and a context string.
///
/// HMAC-SHA-256 keyed by `ikm` over `context`. Every use-site passes a
/// fixed literal context prefix for domain separation.
pub fn kdf(ikm: &[u8], context: &[u8]) -> [u8; 32] {
    // `Mac` and the AEAD `KeyInit` both provide `new_from_slice`.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(ikm).expect("HMAC accepts any key length");
    mac.update(context);
    mac.finalize().into_bytes().into()
}

/// SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    digest.into()
}

/// A 256-bit symmetric key for XChaCha20-Poly1305.
#[derive(Clone, PartialEq, Eq)]
pub struct AeadKey([u8; 32]);

impl AeadKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt plaintext under this key. Ciphertext includes the tag.
    pub fn encrypt(&self, nonce: &Nonce24, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))?;

        cipher
            .encrypt(XNonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| CoreError::EncryptionError(e.to_string()))
    }

    /// Decrypt ciphertext under this key.
    ///
    /// A tag mismatch (wrong key, corrupted ciphertext) always surfaces as
    /// [`CoreError::DecryptionFailure`], never garbage plaintext.
    pub fn decrypt(&self, nonce: &Nonce24, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|_| CoreError::DecryptionFailure)?;

        cipher
            .decrypt(XNonce::from_slice(&nonce.0), ciphertext)
            .map_err(|_| CoreError::DecryptionFailure)
    }
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material never appears in logs.
        write!(f, "AeadKey(..)")
    }
}

/// A 192-bit nonce for XChaCha20-Poly1305. Random per call; no counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce24(pub [u8; 24]);

impl Nonce24 {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 24];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 24]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 24] {
        &self.0
    }
}

/// An X25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to x25519-dalek PublicKey.
    pub fn to_dalek(&self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(pk: PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 static secret key, used for key agreement only.
pub struct X25519StaticSecret(StaticSecret);

impl X25519StaticSecret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(StaticSecret::from(bytes))
    }

    /// Create from seed bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(StaticSecret::from(bytes))
    }

    /// Derive the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(PublicKey::from(&self.0))
    }

    /// Perform key agreement with a peer's public key.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.0.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

/// A shared secret derived from X25519 key agreement.
#[derive(Clone)]
pub struct SharedKey([u8; 32]);

impl SharedKey {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive an AEAD key from this shared secret and a context.
    pub fn derive_aead_key(&self, context: &[u8]) -> AeadKey {
        AeadKey(kdf(&self.0, context))
    }
}

/// Ephemeral key pair for one-time key agreement.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(rand::thread_rng());
        let public = X25519PublicKey::from(PublicKey::from(&secret));
        Self { secret, public }
    }

    /// Get the public key.
    pub fn public_key(&self) -> X25519PublicKey {
        self.public
    }

    /// Perform key agreement with a peer's public key.
    ///
    /// Consumes the ephemeral secret (can only be used once).
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> SharedKey {
        let shared = self.secret.diffie_hellman(&peer_public.to_dalek());
        SharedKey(*shared.as_bytes())
    }
}

/// Context prefix for hybrid encryption key derivation.
const HYBRID_CONTEXT: &[u8] = b"sealfeed-hybrid-v1";

/// An ECIES-style hybrid ciphertext: ephemeral X25519 ECDH + XChaCha20.
///
/// Used only for one-time deliveries encrypted to a personal public key
/// (Grant bundles, the owner's recovery seed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridCiphertext {
    /// Sender's ephemeral public key.
    pub ephemeral_public: X25519PublicKey,

    /// Nonce used for the AEAD layer.
    pub nonce: Nonce24,

    /// The encrypted payload (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl HybridCiphertext {
    /// Encrypt plaintext to a recipient's public key.
    pub fn encrypt(recipient: &X25519PublicKey, plaintext: &[u8]) -> Result<Self> {
        let ephemeral = EphemeralKeyPair::generate();
        let ephemeral_public = ephemeral.public_key();

        let shared = ephemeral.diffie_hellman(recipient);
        let wrap_key = shared.derive_aead_key(&hybrid_context(&ephemeral_public, recipient));

        let nonce = Nonce24::generate();
        let ciphertext = wrap_key.encrypt(&nonce, plaintext)?;

        Ok(Self {
            ephemeral_public,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt with the recipient's secret key.
    pub fn decrypt(&self, recipient_secret: &X25519StaticSecret) -> Result<Vec<u8>> {
        let recipient_public = recipient_secret.public_key();
        let shared = recipient_secret.diffie_hellman(&self.ephemeral_public);
        let wrap_key =
            shared.derive_aead_key(&hybrid_context(&self.ephemeral_public, &recipient_public));

        wrap_key.decrypt(&self.nonce, &self.ciphertext)
    }
}

/// Binds the derived wrap key to both sides of the exchange.
fn hybrid_context(ephemeral: &X25519PublicKey, recipient: &X25519PublicKey) -> Vec<u8> {
    let mut context = Vec::with_capacity(HYBRID_CONTEXT.len() + 64);
    context.extend_from_slice(HYBRID_CONTEXT);
    context.extend_from_slice(ephemeral.as_bytes());
    context.extend_from_slice(recipient.as_bytes());
    context
}

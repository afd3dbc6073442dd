//! Per-post encryption.
//!
//! Each post is encrypted under a key derived from the epoch CEK, the
//! post's random nonce, and the author — never under the CEK directly.
//! A nonce collision then exposes at most one post, and a ciphertext
//! cannot be replayed under a different author or epoch.

use bytes::Bytes;

use crate::chain::Cek;
use crate::crypto::{kdf, AeadKey, Nonce24};
use crate::error::Result;
use crate::records::EncryptedPostRecord;
use crate::types::{Epoch, OwnerId};

/// Domain-separation prefix for post keys.
const POST_CONTEXT: &[u8] = b"sealfeed-post-v1";

/// Encrypt one post's content under the given epoch CEK.
pub fn encrypt_post(
    cek: &Cek,
    epoch: Epoch,
    author: &OwnerId,
    plaintext: &[u8],
    teaser: Option<String>,
) -> Result<EncryptedPostRecord> {
    let nonce = Nonce24::generate();
    let post_key = derive_post_key(cek, &nonce, author);
    let ciphertext = post_key.encrypt(&nonce, plaintext)?;

    Ok(EncryptedPostRecord {
        author: *author,
        epoch,
        nonce,
        ciphertext: Bytes::from(ciphertext),
        teaser,
    })
}

/// Decrypt a post with the CEK of its epoch.
///
/// The caller is responsible for handing in the CEK matching
/// `record.epoch`; a mismatched CEK surfaces as `DecryptionFailure`.
pub fn decrypt_post(cek: &Cek, record: &EncryptedPostRecord) -> Result<Bytes> {
    let post_key = derive_post_key(cek, &record.nonce, &record.author);
    let plaintext = post_key.decrypt(&record.nonce, &record.ciphertext)?;
    Ok(Bytes::from(plaintext))
}

/// `post_key = kdf(cek, "sealfeed-post-v1" || nonce || author)`.
fn derive_post_key(cek: &Cek, nonce: &Nonce24, author: &OwnerId) -> AeadKey {
    let mut context = Vec::with_capacity(POST_CONTEXT.len() + 24 + 32);
    context.extend_from_slice(POST_CONTEXT);
    context.extend_from_slice(nonce.as_bytes());
    context.extend_from_slice(author.as_bytes());
    AeadKey::from_bytes(kdf(cek.as_bytes(), &context))
}

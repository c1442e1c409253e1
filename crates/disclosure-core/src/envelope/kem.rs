//! Content key encapsulation with Kyber768
//!
//! ```text
//! ENCAPSULATE(content_key, recipient_pk):
//! 1. (ss, kem_ct) = Kyber768.Encapsulate(recipient_pk)
//! 2. wrap_key     = HKDF-SHA256(salt = kem_ct, ikm = ss, info = HKDF_INFO)
//! 3. wrapped      = ChaCha20-Poly1305(wrap_key, fresh nonce, content_key)
//! 4. blob         = kem_ct || nonce || wrapped
//! ```
//!
//! The recipient decapsulates `kem_ct` with its secret key, re-derives
//! `wrap_key` and unwraps the content key. The asymmetric primitive only ever
//! sees a fixed-size key, whatever the payload size.

use crate::crypto::{self, ContentKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{DisclosureError, DisclosureResult};
use crate::identity::{RecipientKeyPair, RecipientPublicKey};

use hkdf::Hkdf;
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{Ciphertext, SharedSecret};
use sha2::Sha256;

/// Domain separation string for HKDF
const HKDF_INFO: &[u8] = b"disclosure-envelope-v1/kem-wrap";

/// Size of the wrapped content key (key + tag)
const WRAPPED_KEY_SIZE: usize = KEY_SIZE + TAG_SIZE;

/// Total size of an encapsulated key blob.
pub fn encapsulated_key_size() -> usize {
    kyber768::ciphertext_bytes() + NONCE_SIZE + WRAPPED_KEY_SIZE
}

/// Encapsulate `content_key` to `recipient`.
pub fn encapsulate(
    content_key: &ContentKey,
    recipient: &RecipientPublicKey,
) -> DisclosureResult<Vec<u8>> {
    let (shared, kem_ciphertext) = kyber768::encapsulate(recipient.kem());
    let wrap_key = derive_wrap_key(shared.as_bytes(), kem_ciphertext.as_bytes())?;

    let (wrapped, nonce) = crypto::encrypt(content_key.as_bytes(), &wrap_key)?;

    let mut blob = Vec::with_capacity(encapsulated_key_size());
    blob.extend_from_slice(kem_ciphertext.as_bytes());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&wrapped);
    Ok(blob)
}

/// Recover the content key from an encapsulated blob.
///
/// A blob addressed to a different key pair fails with
/// [`DisclosureError::AuthenticationFailed`]: Kyber768 decapsulation with the
/// wrong secret yields an unrelated secret, so the unwrap tag cannot verify.
pub fn decapsulate(blob: &[u8], keypair: &RecipientKeyPair) -> DisclosureResult<ContentKey> {
    let ct_len = kyber768::ciphertext_bytes();
    if blob.len() != encapsulated_key_size() {
        return Err(DisclosureError::MalformedRecord(format!(
            "Encapsulated key is {} bytes, expected {}",
            blob.len(),
            encapsulated_key_size()
        )));
    }

    let (kem_bytes, rest) = blob.split_at(ct_len);
    let (nonce_bytes, wrapped) = rest.split_at(NONCE_SIZE);

    let kem_ciphertext = kyber768::Ciphertext::from_bytes(kem_bytes)
        .map_err(|_| DisclosureError::MalformedRecord("Invalid Kyber768 ciphertext".to_string()))?;
    let shared = kyber768::decapsulate(&kem_ciphertext, keypair.kem_secret());
    let wrap_key = derive_wrap_key(shared.as_bytes(), kem_bytes)?;

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(nonce_bytes);

    let key_bytes = crypto::decrypt(wrapped, &nonce, &wrap_key)?;
    ContentKey::from_slice(&key_bytes)
}

fn derive_wrap_key(shared_secret: &[u8], kem_ciphertext: &[u8]) -> DisclosureResult<ContentKey> {
    let hkdf = Hkdf::<Sha256>::new(Some(kem_ciphertext), shared_secret);
    let mut output = [0u8; KEY_SIZE];
    hkdf.expand(HKDF_INFO, &mut output)
        .map_err(|e| DisclosureError::Crypto(format!("HKDF expand failed: {}", e)))?;
    Ok(ContentKey::from_bytes(output))
}

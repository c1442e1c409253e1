//! Symmetric content encryption using ChaCha20-Poly1305 AEAD
//!
//! Every disclosed payload is encrypted under its own random 256-bit content
//! key. The key is used for exactly one encryption and travels to recipients
//! only in encapsulated form (see [`crate::envelope`]).
//!
//! # Wire Format
//!
//! Ciphertext format: `[ciphertext + auth_tag (16 bytes)]`, with the 12-byte
//! nonce carried separately.
//!
//! # Example
//!
//! ```
//! use disclosure_core::crypto::{decrypt, encrypt, generate_content_key};
//!
//! let key = generate_content_key().unwrap();
//! let (ciphertext, nonce) = encrypt(b"hello", &key).unwrap();
//! let plaintext = decrypt(&ciphertext, &nonce, &key).unwrap();
//!
//! assert_eq!(plaintext, b"hello");
//! ```

use crate::error::{DisclosureError, DisclosureResult};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Content key size (256 bits)
pub const KEY_SIZE: usize = 32;

/// Authentication tag size appended to every ciphertext
pub const TAG_SIZE: usize = 16;

/// A 256-bit symmetric content key.
///
/// Deliberately not `Clone`: a content key protects one payload and is then
/// dropped.
pub struct ContentKey([u8; KEY_SIZE]);

impl ContentKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a key from a slice, rejecting anything that is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> DisclosureResult<Self> {
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            DisclosureError::Crypto(format!(
                "Content key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new((&self.0).into())
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ContentKey(<redacted>)")
    }
}

/// Generate a new random content key.
///
/// Fails only when the operating system's entropy source is unavailable.
pub fn generate_content_key() -> DisclosureResult<ContentKey> {
    let mut key = [0u8; KEY_SIZE];
    getrandom::getrandom(&mut key)
        .map_err(|e| DisclosureError::Crypto(format!("Entropy source unavailable: {}", e)))?;
    Ok(ContentKey(key))
}

/// Generate a random 12-byte nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt a payload under `key` with a freshly generated nonce.
///
/// Returns the ciphertext (with tag) and the nonce that must accompany it.
pub fn encrypt(
    plaintext: &[u8],
    key: &ContentKey,
) -> DisclosureResult<(Vec<u8>, [u8; NONCE_SIZE])> {
    let nonce = generate_nonce();
    let ciphertext = key
        .cipher()
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| DisclosureError::Crypto(format!("Encryption failed: {}", e)))?;
    Ok((ciphertext, nonce))
}

/// Decrypt a payload produced by [`encrypt`].
///
/// Any tag mismatch is reported as [`DisclosureError::AuthenticationFailed`];
/// no plaintext is returned in that case.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    key: &ContentKey,
) -> DisclosureResult<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(DisclosureError::AuthenticationFailed(
            "Ciphertext shorter than authentication tag".to_string(),
        ));
    }

    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| DisclosureError::AuthenticationFailed(format!("{}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_content_key() {
        let key1 = generate_content_key().unwrap();
        let key2 = generate_content_key().unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
        assert_eq!(key1.as_bytes().len(), KEY_SIZE);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_content_key().unwrap();

        let plaintext = b"Hello, World!";
        let (ciphertext, nonce) = encrypt(plaintext, &key).unwrap();
        let decrypted = decrypt(&ciphertext, &nonce, &key).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = generate_content_key().unwrap();

        let (ciphertext, nonce) = encrypt(b"", &key).unwrap();
        assert_eq!(ciphertext.len(), TAG_SIZE);

        let decrypted = decrypt(&ciphertext, &nonce, &key).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let key = generate_content_key().unwrap();

        let (ct1, nonce1) = encrypt(b"same", &key).unwrap();
        let (ct2, nonce2) = encrypt(b"same", &key).unwrap();

        assert_ne!(nonce1, nonce2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let key = generate_content_key().unwrap();
        let other = generate_content_key().unwrap();

        let (ciphertext, nonce) = encrypt(b"secret", &key).unwrap();
        let result = decrypt(&ciphertext, &nonce, &other);

        assert!(matches!(result, Err(DisclosureError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_tampered_tag_fails_authentication() {
        let key = generate_content_key().unwrap();
        let (mut ciphertext, nonce) = encrypt(b"secret", &key).unwrap();

        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x80;

        let result = decrypt(&ciphertext, &nonce, &key);
        assert!(matches!(result, Err(DisclosureError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_truncated_ciphertext() {
        let key = generate_content_key().unwrap();
        let result = decrypt(&[0u8; 4], &[0u8; NONCE_SIZE], &key);
        assert!(matches!(result, Err(DisclosureError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_key_from_slice_wrong_length() {
        assert!(matches!(
            ContentKey::from_slice(&[0u8; 16]),
            Err(DisclosureError::Crypto(_))
        ));
        assert!(ContentKey::from_slice(&[7u8; 32]).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = ContentKey::from_bytes([0xAB; KEY_SIZE]);
        assert_eq!(format!("{:?}", key), "ContentKey(<redacted>)");
    }
}

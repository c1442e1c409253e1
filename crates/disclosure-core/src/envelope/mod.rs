//! Sealed envelopes for private disclosures
//!
//! An [`Envelope`] is what one recipient receives: the content key
//! encapsulated to that recipient's Kyber768 key, plus the payload encrypted
//! under the content key with ChaCha20-Poly1305.
//!
//! ## Wire Format
//!
//! ```text
//! +----------+------------------+-------+------------+
//! | version  | encapsulated_key | nonce | ciphertext |
//! | (1 byte) | (1148 bytes)     | (12)  | (variable) |
//! +----------+------------------+-------+------------+
//! ```
//!
//! Encoded with postcard and transported as standard base64. The encoding is
//! shared privately with the disclosure service and is not a public contract.
//!
//! ## Example
//!
//! ```ignore
//! use disclosure_core::envelope::Envelope;
//! use disclosure_core::identity::RecipientKeyPair;
//!
//! let recipient = RecipientKeyPair::generate();
//! let envelope = Envelope::seal(b"{\"displayName\":\"Love\"}", &recipient.public_key())?;
//!
//! let wire = envelope.to_base64()?;
//! let opened = Envelope::from_base64(&wire)?.open(&recipient)?;
//! ```

mod kem;
mod sealed;

pub use kem::{decapsulate, encapsulate, encapsulated_key_size};
pub use sealed::{RecipientSlot, SealedBox};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{self, NONCE_SIZE};
use crate::error::{DisclosureError, DisclosureResult};
use crate::identity::{RecipientKeyPair, RecipientPublicKey};

/// Current envelope protocol version
pub const ENVELOPE_VERSION: u8 = 1;

/// Generate a key pair for a new recipient identity.
///
/// Only [`RecipientKeyPair::public_key`] ever leaves the recipient.
pub fn generate_recipient_keypair() -> RecipientKeyPair {
    RecipientKeyPair::generate()
}

/// Single-recipient encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for forward compatibility
    pub version: u8,
    /// Content key encapsulated to the recipient
    pub encapsulated_key: Vec<u8>,
    /// Nonce used for the payload encryption
    pub nonce: [u8; NONCE_SIZE],
    /// Encrypted payload (with tag)
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Seal `plaintext` for a single recipient under a fresh content key.
    pub fn seal(plaintext: &[u8], recipient: &RecipientPublicKey) -> DisclosureResult<Self> {
        let content_key = crypto::generate_content_key()?;
        let encapsulated_key = encapsulate(&content_key, recipient)?;
        let (ciphertext, nonce) = crypto::encrypt(plaintext, &content_key)?;

        Ok(Self {
            version: ENVELOPE_VERSION,
            encapsulated_key,
            nonce,
            ciphertext,
        })
    }

    /// Open the envelope with the recipient's key pair.
    pub fn open(&self, keypair: &RecipientKeyPair) -> DisclosureResult<Vec<u8>> {
        if self.version != ENVELOPE_VERSION {
            return Err(DisclosureError::EnvelopeVersionUnsupported(self.version));
        }

        let content_key = decapsulate(&self.encapsulated_key, keypair)?;
        crypto::decrypt(&self.ciphertext, &self.nonce, &content_key)
    }

    /// Serialize with postcard.
    pub fn to_bytes(&self) -> DisclosureResult<Vec<u8>> {
        postcard::to_allocvec(self).map_err(|e| DisclosureError::Serialization(e.to_string()))
    }

    /// Deserialize from postcard bytes.
    pub fn from_bytes(bytes: &[u8]) -> DisclosureResult<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| DisclosureError::MalformedRecord(format!("Invalid envelope: {}", e)))
    }

    /// Transport encoding (base64 of the postcard bytes).
    pub fn to_base64(&self) -> DisclosureResult<String> {
        Ok(STANDARD.encode(self.to_bytes()?))
    }

    /// Parse the transport encoding.
    pub fn from_base64(encoded: &str) -> DisclosureResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DisclosureError::MalformedRecord(format!("Invalid base64: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

//! Sealed boxes for a set of trusted recipients
//!
//! A [`SealedBox`] encrypts the payload once under one content key and
//! encapsulates that key separately for every trusted recipient. Each
//! recipient is then served the [`Envelope`] built from its own slot.

use serde::{Deserialize, Serialize};

use crate::crypto::{self, NONCE_SIZE};
use crate::error::{DisclosureError, DisclosureResult};
use crate::identity::{Identity, RecipientKeyPair, RecipientPublicKey};

use super::{encapsulate, Envelope, ENVELOPE_VERSION};

/// Encapsulated content key for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientSlot {
    /// Recipient identity (for lookup)
    pub recipient: Identity,
    /// Content key encapsulated to the recipient's public key
    pub encapsulated_key: Vec<u8>,
}

/// Payload sealed to multiple recipients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedBox {
    /// Per-recipient encapsulated keys
    pub slots: Vec<RecipientSlot>,
    /// Nonce for content encryption
    pub nonce: [u8; NONCE_SIZE],
    /// Encrypted content
    pub ciphertext: Vec<u8>,
}

impl SealedBox {
    /// Seal `plaintext` for every recipient in `recipients`.
    pub fn seal(
        plaintext: &[u8],
        recipients: &[(Identity, RecipientPublicKey)],
    ) -> DisclosureResult<Self> {
        if recipients.is_empty() {
            return Err(DisclosureError::Crypto(
                "Cannot seal to zero recipients".to_string(),
            ));
        }

        let content_key = crypto::generate_content_key()?;

        let slots = recipients
            .iter()
            .map(|(recipient, public_key)| {
                Ok(RecipientSlot {
                    recipient: recipient.clone(),
                    encapsulated_key: encapsulate(&content_key, public_key)?,
                })
            })
            .collect::<DisclosureResult<Vec<_>>>()?;

        let (ciphertext, nonce) = crypto::encrypt(plaintext, &content_key)?;

        Ok(Self {
            slots,
            nonce,
            ciphertext,
        })
    }

    /// Extract the single-recipient envelope for `recipient`.
    pub fn envelope_for(&self, recipient: &Identity) -> Option<Envelope> {
        self.slots
            .iter()
            .find(|slot| &slot.recipient == recipient)
            .map(|slot| Envelope {
                version: ENVELOPE_VERSION,
                encapsulated_key: slot.encapsulated_key.clone(),
                nonce: self.nonce,
                ciphertext: self.ciphertext.clone(),
            })
    }

    /// Open the box as `recipient`.
    pub fn open(
        &self,
        recipient: &Identity,
        keypair: &RecipientKeyPair,
    ) -> DisclosureResult<Vec<u8>> {
        self.envelope_for(recipient)
            .ok_or_else(|| {
                DisclosureError::Crypto(format!("No sealed key for recipient {}", recipient))
            })?
            .open(keypair)
    }

    /// Check if this sealed box is addressed to `identity`.
    pub fn is_addressed_to(&self, identity: &Identity) -> bool {
        self.slots.iter().any(|slot| &slot.recipient == identity)
    }

    /// All recipient identities.
    pub fn recipients(&self) -> impl Iterator<Item = &Identity> {
        self.slots.iter().map(|slot| &slot.recipient)
    }
}

//! Recipient key pairs and per-session key material
//!
//! | Key Type | Purpose | Algorithm |
//! |----------|---------|-----------|
//! | Key encapsulation | Unwrapping content keys | Kyber768 (round 3) |
//!
//! The session key material is established outside this crate (login) and
//! installed into a [`SessionKeySlot`]; the fetch coordinator reads it from
//! there for every pass.

use crate::error::{DisclosureError, DisclosureResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{PublicKey as KemPublicKey, SecretKey as KemSecretKey};
use std::sync::Arc;
use tracing::info;

use super::Identity;

/// Public half of a recipient key pair.
#[derive(Clone)]
pub struct RecipientPublicKey(kyber768::PublicKey);

impl RecipientPublicKey {
    /// Parse a public key from its raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> DisclosureResult<Self> {
        kyber768::PublicKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| {
                DisclosureError::Crypto(format!(
                    "Invalid Kyber768 public key ({} bytes, expected {})",
                    bytes.len(),
                    kyber768::public_key_bytes()
                ))
            })
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Standard base64 of the raw bytes, the form shared with encrypting parties.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.as_bytes())
    }

    pub fn from_base64(encoded: &str) -> DisclosureResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim().as_bytes())
            .map_err(|e| DisclosureError::Crypto(format!("Invalid public key encoding: {}", e)))?;
        Self::from_bytes(&bytes)
    }

    pub(crate) fn kem(&self) -> &kyber768::PublicKey {
        &self.0
    }
}

impl PartialEq for RecipientPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for RecipientPublicKey {}

impl std::fmt::Debug for RecipientPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fingerprint = blake3::hash(self.as_bytes());
        write!(f, "RecipientPublicKey({})", &fingerprint.to_hex()[..16])
    }
}

/// Kyber768 key pair generated once per recipient identity.
#[derive(Clone)]
pub struct RecipientKeyPair {
    public: kyber768::PublicKey,
    secret: kyber768::SecretKey,
}

impl RecipientKeyPair {
    /// Generate a fresh key pair.
    pub fn generate() -> Self {
        let (public, secret) = kyber768::keypair();
        Self { public, secret }
    }

    /// The shareable public key.
    pub fn public_key(&self) -> RecipientPublicKey {
        RecipientPublicKey(self.public.clone())
    }

    pub(crate) fn kem_secret(&self) -> &kyber768::SecretKey {
        &self.secret
    }

    /// Serialize the key pair.
    ///
    /// Format: `[secret_len: 4 LE][secret][public]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let secret = self.secret.as_bytes();
        let public = self.public.as_bytes();

        let mut bytes = Vec::with_capacity(4 + secret.len() + public.len());
        bytes.extend_from_slice(&(secret.len() as u32).to_le_bytes());
        bytes.extend_from_slice(secret);
        bytes.extend_from_slice(public);
        bytes
    }

    /// Deserialize a key pair produced by [`RecipientKeyPair::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> DisclosureResult<Self> {
        if bytes.len() < 4 {
            return Err(DisclosureError::Crypto("Key pair data too short".to_string()));
        }

        let secret_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let rest = &bytes[4..];
        if rest.len() < secret_len {
            return Err(DisclosureError::Crypto(
                "Secret key data truncated".to_string(),
            ));
        }

        let secret = kyber768::SecretKey::from_bytes(&rest[..secret_len])
            .map_err(|_| DisclosureError::Crypto("Invalid Kyber768 secret key".to_string()))?;
        let public = kyber768::PublicKey::from_bytes(&rest[secret_len..])
            .map_err(|_| DisclosureError::Crypto("Invalid Kyber768 public key".to_string()))?;

        Ok(Self { public, secret })
    }
}

impl std::fmt::Debug for RecipientKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecipientKeyPair")
            .field("public", &self.public_key())
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Key material of the signed-in account.
#[derive(Debug, Clone)]
pub struct SessionKeys {
    identity: Identity,
    keypair: RecipientKeyPair,
}

impl SessionKeys {
    pub fn new(identity: Identity, keypair: RecipientKeyPair) -> Self {
        Self { identity, keypair }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn keypair(&self) -> &RecipientKeyPair {
        &self.keypair
    }
}

/// Source of the caller's own decapsulation key.
pub trait SessionKeyProvider: Send + Sync {
    /// Current session keys, or [`DisclosureError::NoSession`].
    fn session_keys(&self) -> DisclosureResult<Arc<SessionKeys>>;
}

/// Login-scoped holder for [`SessionKeys`].
#[derive(Default)]
pub struct SessionKeySlot {
    current: RwLock<Option<Arc<SessionKeys>>>,
}

impl SessionKeySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-populated with keys.
    pub fn with_keys(keys: SessionKeys) -> Self {
        let slot = Self::new();
        slot.install(keys);
        slot
    }

    /// Install keys after a successful session exchange.
    pub fn install(&self, keys: SessionKeys) {
        info!(identity = %keys.identity(), "Session keys installed");
        *self.current.write() = Some(Arc::new(keys));
    }

    /// Drop the keys on logout.
    pub fn clear(&self) {
        if self.current.write().take().is_some() {
            info!("Session keys cleared");
        }
    }
}

impl SessionKeyProvider for SessionKeySlot {
    fn session_keys(&self) -> DisclosureResult<Arc<SessionKeys>> {
        self.current.read().clone().ok_or(DisclosureError::NoSession)
    }
}

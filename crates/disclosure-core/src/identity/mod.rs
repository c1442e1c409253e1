//! Identity handles and recipient key material
//!
//! An [`Identity`] is an opaque account handle (usually a DID) used as the
//! cache key throughout the pipeline. Recipients hold a Kyber768
//! [`RecipientKeyPair`]; only the public half is ever handed to encrypting
//! parties.

mod keys;
mod store;

pub use keys::{
    RecipientKeyPair, RecipientPublicKey, SessionKeyProvider, SessionKeySlot, SessionKeys,
};
pub use store::{load_session_keys, save_session_keys};

use crate::error::DisclosureError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, globally unique account handle.
///
/// Format is not interpreted beyond being non-empty and free of whitespace,
/// so `did:plc:...`, `did:web:...` and locally derived `did:key:z...`
/// handles are all accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Parse an identity handle.
    pub fn parse(s: &str) -> Result<Self, DisclosureError> {
        if s.is_empty() {
            return Err(DisclosureError::InvalidIdentity(
                "identity cannot be empty".to_string(),
            ));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(DisclosureError::InvalidIdentity(format!(
                "identity contains whitespace: {:?}",
                s
            )));
        }
        Ok(Identity(s.to_string()))
    }

    /// Derive a `did:key` handle from a recipient public key.
    ///
    /// `did:key:z{base58(blake3(public_key))}`
    pub fn from_public_key(public_key: &RecipientPublicKey) -> Self {
        let hash = blake3::hash(public_key.as_bytes());
        let encoded = bs58::encode(hash.as_bytes()).into_string();
        Identity(format!("did:key:z{}", encoded))
    }

    /// Get the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the handle uses DID syntax.
    pub fn is_did(&self) -> bool {
        self.0.starts_with("did:")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = DisclosureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = DisclosureError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Identity::parse(&s)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let id = Identity::parse("did:plc:abc123").unwrap();
        assert_eq!(id.as_str(), "did:plc:abc123");
        assert!(id.is_did());
    }

    #[test]
    fn test_parse_opaque_handle() {
        let id: Identity = "alice.example.com".parse().unwrap();
        assert!(!id.is_did());
        assert_eq!(id.to_string(), "alice.example.com");
    }

    #[test]
    fn test_parse_rejects_empty_and_whitespace() {
        assert!(matches!(
            Identity::parse(""),
            Err(DisclosureError::InvalidIdentity(_))
        ));
        assert!(matches!(
            Identity::parse("did:plc:a b"),
            Err(DisclosureError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_from_public_key_is_stable() {
        let keys = RecipientKeyPair::generate();
        let id1 = Identity::from_public_key(&keys.public_key());
        let id2 = Identity::from_public_key(&keys.public_key());

        assert_eq!(id1, id2);
        assert!(id1.as_str().starts_with("did:key:z"));

        let other = RecipientKeyPair::generate();
        assert_ne!(id1, Identity::from_public_key(&other.public_key()));
    }

    #[test]
    fn test_serde_validates() {
        let id = Identity::parse("did:plc:xyz").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"did:plc:xyz\"");

        let back: Identity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<Identity>("\"\"").is_err());
    }
}

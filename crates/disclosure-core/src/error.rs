//! Error types for the disclosure pipeline

use thiserror::Error;

/// Main error type for disclosure operations
#[derive(Error, Debug)]
pub enum DisclosureError {
    /// A cryptographic primitive failed (key generation, encapsulation, encryption)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Decryption failed its integrity check (tampered data or wrong key)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The remote disclosure service failed for the whole batch
    #[error("Disclosure service error: {0}")]
    Service(String),

    /// Envelope protocol version not supported
    #[error("Envelope version {0} is not supported")]
    EnvelopeVersionUnsupported(u8),

    /// A single record returned by the service could not be decoded
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Identity string is not a usable handle
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    /// No session keys are installed (logged out or not yet established)
    #[error("No active session")]
    NoSession,

    /// Configuration is invalid
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using DisclosureError
pub type DisclosureResult<T> = Result<T, DisclosureError>;

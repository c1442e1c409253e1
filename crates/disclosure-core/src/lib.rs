//! Private content disclosure pipeline
//!
//! Owners seal private profile attributes (display name, description, avatar,
//! banner, pronouns) to each trusted recipient's post-quantum public key.
//! Viewers fetch those envelopes in batches as identities appear in their
//! result sets, decrypt them once, cache the result, and overlay it onto the
//! public records at read time.
//!
//! ## Overview
//!
//! ```text
//! result set ──extract──► FetchCoordinator ──batch_fetch──► DisclosureApi
//!     ▲                        │ claim / release                 │
//!     │                        ▼                                 ▼
//!  Overlay ◄──change event── DisclosureCache ◄──upsert── Envelope::open
//! ```
//!
//! - [`envelope`]: Kyber768 key encapsulation + ChaCha20-Poly1305
//! - [`cache`]: identity -> attributes | no-disclosure, inflight claims,
//!   change notification
//! - [`fetch`]: the coordinator, the remote API contract, error telemetry
//! - [`merge`]: pure read-time overlay
//! - [`consumer`]: binds a result set's query key to the coordinator
//! - [`session`]: login-scoped owner of all of the above
//!
//! ## Quick Start
//!
//! ```ignore
//! use disclosure_core::{DisclosureSession, DisclosureConfig, TracingTelemetry};
//!
//! let session = DisclosureSession::login(
//!     DisclosureConfig::default(),
//!     keys,
//!     api,
//!     Arc::new(TracingTelemetry),
//! )?;
//!
//! let outcome = session
//!     .coordinator()
//!     .run_fetch_pass(&QueryKey::new("followers"), &pages, profile_identities)
//!     .await;
//!
//! let merged = pages.overlay(&session.cache().snapshot());
//! ```

pub mod cache;
pub mod config;
pub mod consumer;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod merge;
pub mod session;
pub mod types;

// Re-exports
pub use cache::{CacheEntry, CacheEvent, DisclosureCache, InflightClaim, SubscriptionId};
pub use config::DisclosureConfig;
pub use consumer::{
    DisclosureConsumer, InMemoryResultSets, PendingPass, ResultSetEvent, ResultSetSource,
    ResultSetUpdate,
};
pub use envelope::{generate_recipient_keypair, Envelope, SealedBox, ENVELOPE_VERSION};
pub use error::{DisclosureError, DisclosureResult};
pub use fetch::{
    DisclosureApi, DisclosureRecord, FetchCoordinator, InMemoryDisclosureApi, MemoryTelemetry,
    Notice, NoticeThrottle, PassMode, PassOutcome, PassPhase, PassReport, Requester,
    TelemetrySink, TracingTelemetry,
};
pub use identity::{
    Identity, RecipientKeyPair, RecipientPublicKey, SessionKeyProvider, SessionKeySlot,
    SessionKeys,
};
pub use merge::{
    collect_identities, merge_record, profile_identities, AttributeLookup, CacheSnapshot, Overlay,
};
pub use session::DisclosureSession;
pub use types::*;

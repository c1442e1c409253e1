//! Core types for the disclosure pipeline

pub mod attributes;
pub mod profile;

pub use attributes::{PrivateAttributes, PronounSet, Pronouns};
pub use profile::ProfileView;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a result-set query (e.g. `feed:home`,
/// `followers:did:plc:abc`).
///
/// Update events are matched against it exactly, so two queries that share an
/// extraction shape never trigger each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

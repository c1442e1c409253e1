//! Private profile attributes - the decrypted payload of a disclosure
//!
//! The plaintext inside an [`crate::envelope::Envelope`] is the camelCase JSON
//! form of [`PrivateAttributes`]:
//!
//! ```json
//! {
//!   "displayName": "Love",
//!   "description": "tending the garden",
//!   "avatar": "bafkrei...",
//!   "pronouns": [{ "forms": ["she", "her"], "weight": 2 }, { "forms": ["they", "them"] }]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{DisclosureError, DisclosureResult};

/// Attributes revealed only to trusted recipients.
///
/// Always produced whole from one successful decryption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Avatar blob reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Banner blob reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pronouns: Option<Pronouns>,
}

impl PrivateAttributes {
    /// Decode a decrypted payload.
    pub fn from_json(bytes: &[u8]) -> DisclosureResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| DisclosureError::Serialization(format!("Invalid attributes: {}", e)))
    }

    /// Encode as the plaintext sealed into an envelope.
    pub fn to_json(&self) -> DisclosureResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| DisclosureError::Serialization(e.to_string()))
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.description.is_none()
            && self.avatar.is_none()
            && self.banner.is_none()
            && self.pronouns.is_none()
    }
}

/// Pronoun specification: a flat value or a list of selectable sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pronouns {
    /// Free-form value, e.g. `"she/they"`
    Flat(String),
    /// Ordered pronoun sets
    Sets(Vec<PronounSet>),
}

impl Pronouns {
    /// Human-readable rendering, e.g. `she/her, they/them`.
    pub fn display(&self) -> String {
        match self {
            Pronouns::Flat(value) => value.clone(),
            Pronouns::Sets(sets) => sets
                .iter()
                .map(|set| set.forms.join("/"))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// The preferred set: highest weight, first on ties.
    pub fn preferred(&self) -> Option<&PronounSet> {
        match self {
            Pronouns::Flat(_) => None,
            Pronouns::Sets(sets) => sets.iter().fold(None, |best: Option<&PronounSet>, set| {
                match best {
                    Some(b) if b.weight.unwrap_or(0) >= set.weight.unwrap_or(0) => Some(b),
                    _ => Some(set),
                }
            }),
        }
    }
}

/// One pronoun set, e.g. `["they", "them", "theirs"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PronounSet {
    pub forms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl PronounSet {
    pub fn new<I, S>(forms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            forms: forms.into_iter().map(Into::into).collect(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }
}

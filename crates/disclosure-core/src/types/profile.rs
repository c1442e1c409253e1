//! Public profile view - the identity-bearing record read paths render
//!
//! Feeds, follower lists and notifications carry a [`ProfileView`] for every
//! account they reference. Private attributes are overlaid on top of it at
//! read time (see [`crate::merge`]), never written into it upstream.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;

use super::{PrivateAttributes, Pronouns};

/// Publicly visible profile fields for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub identity: Identity,
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub banner: Option<String>,
    #[serde(default)]
    pub pronouns: Option<Pronouns>,
}

impl ProfileView {
    /// Create a view with only identity and handle set.
    pub fn new(identity: Identity, handle: impl Into<String>) -> Self {
        Self {
            identity,
            handle: handle.into(),
            display_name: None,
            description: None,
            avatar: None,
            banner: None,
            pronouns: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Copy of this view with `attrs` overlaid.
    ///
    /// Each field is overlaid independently; a private field that is unset
    /// leaves the public value in place.
    pub fn with_private(&self, attrs: &PrivateAttributes) -> Self {
        Self {
            identity: self.identity.clone(),
            handle: self.handle.clone(),
            display_name: attrs.display_name.clone().or_else(|| self.display_name.clone()),
            description: attrs.description.clone().or_else(|| self.description.clone()),
            avatar: attrs.avatar.clone().or_else(|| self.avatar.clone()),
            banner: attrs.banner.clone().or_else(|| self.banner.clone()),
            pronouns: attrs.pronouns.clone().or_else(|| self.pronouns.clone()),
        }
    }

    /// Name to render: display name, falling back to the handle.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.handle)
    }
}

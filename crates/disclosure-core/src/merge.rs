//! Read-time merge of private attributes into public records
//!
//! Result-set caches are never written with decrypted data. Every read runs
//! the records through [`Overlay::overlay`] against the current cache state
//! instead, and consumers re-run it whenever the cache reports a change.
//!
//! ```ignore
//! let merged: Vec<ProfileView> = followers.overlay(&cache.snapshot());
//! ```

use std::collections::{HashMap, HashSet};

use crate::identity::Identity;
use crate::types::{PrivateAttributes, ProfileView};

/// Read-only source of disclosed attributes.
pub trait AttributeLookup {
    fn lookup(&self, identity: &Identity) -> Option<PrivateAttributes>;
}

/// Frozen copy of the disclosed entries of a cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    entries: HashMap<Identity, PrivateAttributes>,
}

impl CacheSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, identity: Identity, attrs: PrivateAttributes) {
        self.entries.insert(identity, attrs);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Identity, PrivateAttributes)> for CacheSnapshot {
    fn from_iter<I: IntoIterator<Item = (Identity, PrivateAttributes)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl AttributeLookup for CacheSnapshot {
    fn lookup(&self, identity: &Identity) -> Option<PrivateAttributes> {
        self.entries.get(identity).cloned()
    }
}

impl<L: AttributeLookup + ?Sized> AttributeLookup for &L {
    fn lookup(&self, identity: &Identity) -> Option<PrivateAttributes> {
        (**self).lookup(identity)
    }
}

impl<L: AttributeLookup + ?Sized> AttributeLookup for std::sync::Arc<L> {
    fn lookup(&self, identity: &Identity) -> Option<PrivateAttributes> {
        (**self).lookup(identity)
    }
}

/// A record (or container of records) that private attributes can be
/// projected onto.
///
/// Implementations must be pure: same input and lookup state, same output,
/// and the input is left untouched.
pub trait Overlay: Clone {
    fn overlay(&self, lookup: &dyn AttributeLookup) -> Self;
}

impl Overlay for ProfileView {
    fn overlay(&self, lookup: &dyn AttributeLookup) -> Self {
        match lookup.lookup(&self.identity) {
            Some(attrs) => self.with_private(&attrs),
            None => self.clone(),
        }
    }
}

impl<T: Overlay> Overlay for Vec<T> {
    fn overlay(&self, lookup: &dyn AttributeLookup) -> Self {
        self.iter().map(|item| item.overlay(lookup)).collect()
    }
}

impl<T: Overlay> Overlay for Option<T> {
    fn overlay(&self, lookup: &dyn AttributeLookup) -> Self {
        self.as_ref().map(|item| item.overlay(lookup))
    }
}

/// Merge a single record against `lookup`.
pub fn merge_record<T: Overlay>(record: &T, lookup: &dyn AttributeLookup) -> T {
    record.overlay(lookup)
}

/// Union of identities referenced by `pages`, using a per-page extractor.
///
/// Convenience for building the extractor handed to
/// [`crate::fetch::FetchCoordinator::run_fetch_pass`].
pub fn collect_identities<P, F, I>(pages: &[P], per_page: F) -> HashSet<Identity>
where
    F: Fn(&P) -> I,
    I: IntoIterator<Item = Identity>,
{
    pages.iter().flat_map(per_page).collect()
}

/// Identities of every profile in a page of [`ProfileView`]s.
pub fn profile_identities(pages: &[Vec<ProfileView>]) -> HashSet<Identity> {
    collect_identities(pages, |page| {
        page.iter().map(|p| p.identity.clone()).collect::<Vec<_>>()
    })
}

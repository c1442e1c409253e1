//! Disclosure cache - decrypted private attributes keyed by identity
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  entries:  Identity -> Disclosed(attrs) | NoDisclosure          │
//! │            (absent key = never checked)                         │
//! │  inflight: Identity -> claim id    (test-and-set per identity)  │
//! │  changes:  callback registry + broadcast::Sender<CacheEvent>    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads never block on a fetch and never trigger one. Writes come only from
//! the fetch coordinator. The cache lives for one session and is emptied by
//! [`DisclosureCache::clear_all`] on logout or account switch.

mod claim;

pub use claim::InflightClaim;

use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::identity::Identity;
use crate::merge::{AttributeLookup, CacheSnapshot};
use crate::types::PrivateAttributes;

use claim::InflightTable;

/// Default capacity of the change broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Cached state for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Private attributes from the latest successful decryption
    Disclosed(PrivateAttributes),
    /// Checked with the service, nothing disclosed to us
    NoDisclosure,
}

/// Change notifications emitted by the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Attributes for these identities were added or replaced
    Changed { identities: Vec<Identity> },
    /// A single identity was evicted
    Evicted { identity: Identity },
    /// Everything was cleared
    Cleared,
}

/// Handle returned by [`DisclosureCache::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type ChangeCallback = Arc<dyn Fn(&CacheEvent) + Send + Sync>;

/// Process-wide (per session) store of disclosed attributes.
pub struct DisclosureCache {
    entries: RwLock<HashMap<Identity, CacheEntry>>,
    inflight: InflightTable,
    next_claim: AtomicU64,
    observers: Mutex<HashMap<SubscriptionId, ChangeCallback>>,
    next_observer: AtomicU64,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl Default for DisclosureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DisclosureCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a cache whose broadcast channel holds `event_capacity` events.
    pub fn with_capacity(event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            next_claim: AtomicU64::new(1),
            observers: Mutex::new(HashMap::new()),
            next_observer: AtomicU64::new(1),
            event_tx,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Disclosed attributes for `identity`.
    ///
    /// `None` both when the identity was never checked and when it was
    /// checked and nothing was disclosed; use [`Self::is_checked`] to tell
    /// them apart.
    pub fn get(&self, identity: &Identity) -> Option<PrivateAttributes> {
        match self.entries.read().get(identity) {
            Some(CacheEntry::Disclosed(attrs)) => Some(attrs.clone()),
            _ => None,
        }
    }

    /// Raw entry, distinguishing NONE from never-checked.
    pub fn entry(&self, identity: &Identity) -> Option<CacheEntry> {
        self.entries.read().get(identity).cloned()
    }

    /// Whether the service has been asked about `identity`.
    pub fn is_checked(&self, identity: &Identity) -> bool {
        self.entries.read().contains_key(identity)
    }

    /// Number of checked identities.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Immutable copy of every disclosed entry, for merging a whole result set
    /// against one consistent state.
    pub fn snapshot(&self) -> CacheSnapshot {
        let entries = self.entries.read();
        CacheSnapshot::from_iter(entries.iter().filter_map(|(id, entry)| match entry {
            CacheEntry::Disclosed(attrs) => Some((id.clone(), attrs.clone())),
            CacheEntry::NoDisclosure => None,
        }))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Replace the entries for every identity in `updates`.
    ///
    /// Notifies subscribers only when at least one entry actually changed.
    /// Returns whether anything changed.
    pub fn upsert_many(&self, updates: HashMap<Identity, PrivateAttributes>) -> bool {
        let mut changed = Vec::new();
        {
            let mut entries = self.entries.write();
            for (identity, attrs) in updates {
                let next = CacheEntry::Disclosed(attrs);
                if entries.get(&identity) != Some(&next) {
                    entries.insert(identity.clone(), next);
                    changed.push(identity);
                }
            }
        }

        self.notify_changed(changed)
    }

    /// Write the results of the pass holding `claim`: `disclosed` attributes
    /// first, then NONE for every other identity in `checked`.
    ///
    /// Identities the claim no longer owns are skipped. That only happens when
    /// [`Self::clear_all`] ran while the pass was in flight, and keeps results
    /// decrypted for a previous session out of the next one. Returns whether
    /// any disclosed entry changed.
    pub fn commit(
        &self,
        claim: &InflightClaim,
        disclosed: HashMap<Identity, PrivateAttributes>,
        checked: &[Identity],
    ) -> bool {
        let mut changed = Vec::new();
        let mut stale = 0usize;
        {
            let mut entries = self.entries.write();
            let inflight = self.inflight.lock();
            let owned = |identity: &Identity| inflight.get(identity) == Some(&claim.id());

            for (identity, attrs) in disclosed {
                if !owned(&identity) {
                    stale += 1;
                    continue;
                }
                let next = CacheEntry::Disclosed(attrs);
                if entries.get(&identity) != Some(&next) {
                    entries.insert(identity.clone(), next);
                    changed.push(identity);
                }
            }
            for identity in checked {
                if owned(identity) {
                    entries
                        .entry(identity.clone())
                        .or_insert(CacheEntry::NoDisclosure);
                }
            }
        }

        if stale > 0 {
            debug!(stale, "Discarded results of a claim cleared mid-flight");
        }
        self.notify_changed(changed)
    }

    /// Record NONE for every identity that has no entry yet.
    ///
    /// Never overwrites a disclosed entry written by a concurrent pass. The
    /// merged view is unaffected, so no notification is sent.
    pub fn mark_checked_many<'a>(&self, identities: impl IntoIterator<Item = &'a Identity>) {
        let mut entries = self.entries.write();
        for identity in identities {
            entries
                .entry(identity.clone())
                .or_insert(CacheEntry::NoDisclosure);
        }
    }

    /// Forget `identity` so the next pass checks it again.
    pub fn evict(&self, identity: &Identity) -> bool {
        let removed = self.entries.write().remove(identity);
        match removed {
            Some(CacheEntry::Disclosed(_)) => {
                self.notify(CacheEvent::Evicted {
                    identity: identity.clone(),
                });
                true
            }
            Some(CacheEntry::NoDisclosure) => true,
            None => false,
        }
    }

    /// Drop every entry and every inflight claim.
    ///
    /// The only teardown path; called on session or account switch.
    pub fn clear_all(&self) {
        // Lock order matches `commit`: entries, then inflight.
        let (cleared_entries, cleared_claims) = {
            let mut entries = self.entries.write();
            let mut inflight = self.inflight.lock();
            let counts = (entries.len(), inflight.len());
            entries.clear();
            inflight.clear();
            counts
        };

        info!(cleared_entries, cleared_claims, "Disclosure cache cleared");
        self.notify(CacheEvent::Cleared);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inflight claims
    // ═══════════════════════════════════════════════════════════════════════

    /// Atomically claim every identity in `identities` not already inflight.
    ///
    /// The returned token holds only the newly claimed subset; identities
    /// owned by another pass are silently left out.
    pub fn claim(&self, identities: impl IntoIterator<Item = Identity>) -> InflightClaim {
        let id = self.next_claim.fetch_add(1, Ordering::Relaxed);
        let mut claimed = HashSet::new();
        {
            let mut inflight = self.inflight.lock();
            for identity in identities {
                if let std::collections::hash_map::Entry::Vacant(slot) =
                    inflight.entry(identity.clone())
                {
                    slot.insert(id);
                    claimed.insert(identity);
                }
            }
        }
        InflightClaim::new(id, claimed, self.inflight.clone())
    }

    /// Release a claim. Equivalent to dropping it.
    pub fn release(&self, claim: InflightClaim) {
        claim.release();
    }

    pub fn is_inflight(&self, identity: &Identity) -> bool {
        self.inflight.lock().contains_key(identity)
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.lock().len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Subscriptions
    // ═══════════════════════════════════════════════════════════════════════

    /// Register a change callback.
    ///
    /// Callbacks run synchronously on the writing task, outside any cache
    /// lock; they must not block.
    pub fn subscribe<F>(&self, on_change: F) -> SubscriptionId
    where
        F: Fn(&CacheEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().insert(id, Arc::new(on_change));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.lock().remove(&id).is_some()
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Subscribe to change events as an async stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    fn notify_changed(&self, mut changed: Vec<Identity>) -> bool {
        if changed.is_empty() {
            return false;
        }
        changed.sort();
        debug!(count = changed.len(), "Disclosure cache updated");
        self.notify(CacheEvent::Changed {
            identities: changed,
        });
        true
    }

    fn notify(&self, event: CacheEvent) {
        let callbacks: Vec<ChangeCallback> = self.observers.lock().values().cloned().collect();
        for callback in callbacks {
            callback(&event);
        }
        // No receivers is fine
        let _ = self.event_tx.send(event);
    }
}

impl AttributeLookup for DisclosureCache {
    fn lookup(&self, identity: &Identity) -> Option<PrivateAttributes> {
        self.get(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    fn attrs(name: &str) -> PrivateAttributes {
        PrivateAttributes {
            display_name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_absent_for_unchecked_and_none() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");

        assert!(cache.get(&x).is_none());
        assert!(!cache.is_checked(&x));

        cache.mark_checked_many([&x]);
        assert!(cache.get(&x).is_none());
        assert!(cache.is_checked(&x));
        assert_eq!(cache.entry(&x), Some(CacheEntry::NoDisclosure));
    }

    #[test]
    fn test_upsert_replaces_wholesale() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");

        let first = PrivateAttributes {
            display_name: Some("A".into()),
            description: Some("bio".into()),
            ..Default::default()
        };
        cache.upsert_many(HashMap::from([(x.clone(), first)]));
        cache.upsert_many(HashMap::from([(x.clone(), attrs("B"))]));

        let current = cache.get(&x).unwrap();
        assert_eq!(current.display_name.as_deref(), Some("B"));
        assert!(current.description.is_none());
    }

    #[test]
    fn test_mark_checked_does_not_clobber() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");

        cache.upsert_many(HashMap::from([(x.clone(), attrs("X"))]));
        cache.mark_checked_many([&x]);

        assert_eq!(cache.get(&x), Some(attrs("X")));
    }

    #[test]
    fn test_identical_upsert_notifies_once() {
        let cache = DisclosureCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        cache.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let x = id("did:plc:x");
        assert!(cache.upsert_many(HashMap::from([(x.clone(), attrs("X"))])));
        assert!(!cache.upsert_many(HashMap::from([(x.clone(), attrs("X"))])));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let cache = DisclosureCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let sub = cache.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(cache.subscriber_count(), 1);

        assert!(cache.unsubscribe(sub));
        assert!(!cache.unsubscribe(sub));
        cache.upsert_many(HashMap::from([(id("did:plc:x"), attrs("X"))]));

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");

        let first = cache.claim([x.clone()]);
        let second = cache.claim([x.clone()]);

        assert!(first.contains(&x));
        assert!(second.is_empty());
        assert!(cache.is_inflight(&x));

        cache.release(first);
        assert!(!cache.is_inflight(&x));

        let third = cache.claim([x.clone()]);
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_partial_claim() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");
        let y = id("did:plc:y");

        let _held = cache.claim([x.clone()]);
        let claim = cache.claim([x.clone(), y.clone()]);

        assert_eq!(claim.identities(), &HashSet::from([y]));
    }

    #[test]
    fn test_drop_releases_claim() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");
        {
            let _claim = cache.claim([x.clone()]);
            assert_eq!(cache.inflight_len(), 1);
        }
        assert_eq!(cache.inflight_len(), 0);
    }

    #[test]
    fn test_stale_claim_cannot_release_newer_claim() {
        let cache = DisclosureCache::new();
        let w = id("did:plc:w");

        let stale = cache.claim([w.clone()]);
        cache.clear_all();

        let fresh = cache.claim([w.clone()]);
        assert_eq!(fresh.len(), 1);

        drop(stale);
        assert!(cache.is_inflight(&w));

        drop(fresh);
        assert!(!cache.is_inflight(&w));
    }

    #[test]
    fn test_commit_writes_owned_identities() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");
        let y = id("did:plc:y");

        let claim = cache.claim([x.clone(), y.clone()]);
        let changed = cache.commit(
            &claim,
            HashMap::from([(x.clone(), attrs("X"))]),
            &[x.clone(), y.clone()],
        );

        assert!(changed);
        assert_eq!(cache.get(&x), Some(attrs("X")));
        assert_eq!(cache.entry(&y), Some(CacheEntry::NoDisclosure));
    }

    #[test]
    fn test_commit_after_clear_is_discarded() {
        let cache = DisclosureCache::new();
        let w = id("did:plc:w");

        let stale = cache.claim([w.clone()]);
        cache.clear_all();

        let changed = cache.commit(&stale, HashMap::from([(w.clone(), attrs("old"))]), &[w.clone()]);
        assert!(!changed);
        assert!(!cache.is_checked(&w));
    }

    #[test]
    fn test_retain_gives_back_identities() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");
        let y = id("did:plc:y");

        let mut claim = cache.claim([x.clone(), y.clone()]);
        claim.retain(|identity| identity == &x);

        assert!(claim.contains(&x));
        assert!(!claim.contains(&y));
        assert!(cache.is_inflight(&x));
        assert!(!cache.is_inflight(&y));
    }

    #[test]
    fn test_clear_all_resets_everything() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");
        let w = id("did:plc:w");

        cache.upsert_many(HashMap::from([(x.clone(), attrs("X"))]));
        let _claim = cache.claim([w.clone()]);

        cache.clear_all();

        assert!(cache.get(&x).is_none());
        assert!(!cache.is_checked(&x));
        assert!(!cache.is_inflight(&w));
    }

    #[test]
    fn test_evict() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");
        let y = id("did:plc:y");

        cache.upsert_many(HashMap::from([(x.clone(), attrs("X"))]));
        cache.mark_checked_many([&y]);

        assert!(cache.evict(&x));
        assert!(cache.evict(&y));
        assert!(!cache.evict(&y));
        assert!(!cache.is_checked(&x));
        assert!(!cache.is_checked(&y));
    }

    #[tokio::test]
    async fn test_broadcast_events() {
        let cache = DisclosureCache::new();
        let mut events = cache.subscribe_events();
        let x = id("did:plc:x");

        cache.upsert_many(HashMap::from([(x.clone(), attrs("X"))]));
        cache.clear_all();

        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Changed {
                identities: vec![x]
            }
        );
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Cleared);
    }

    #[test]
    fn test_snapshot_excludes_none() {
        let cache = DisclosureCache::new();
        let x = id("did:plc:x");
        let y = id("did:plc:y");

        cache.upsert_many(HashMap::from([(x.clone(), attrs("X"))]));
        cache.mark_checked_many([&y]);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.lookup(&x), Some(attrs("X")));
        assert!(snapshot.lookup(&y).is_none());
    }
}

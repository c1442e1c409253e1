//! Result-set consumers
//!
//! A consumer binds one query (a feed, a follower list, a notification list)
//! to the fetch coordinator. It triggers a pass when it mounts and whenever the
//! result set for *its* query key reports an update, and it produces the merged
//! view of the loaded pages on demand.
//!
//! Each consumer remembers which identities it already handed to the
//! coordinator so that loading page N+1 only sends the identities page N+1
//! introduced. A manual refresh forgets that memory and revalidates; the
//! shared cache's checked state is left alone. The memory follows the cache:
//! an evicted identity is forgotten, and a cleared cache (logout, account
//! switch) triggers a full resync.

mod source;

pub use source::InMemoryResultSets;

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::CacheEvent;
use crate::fetch::{FetchCoordinator, PassMode, PassOutcome};
use crate::identity::Identity;
use crate::merge::Overlay;
use crate::types::QueryKey;

/// What happened to a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSetUpdate {
    /// Another page was appended
    PageLoaded,
    /// The result set was reloaded from scratch by a user action
    Refreshed,
}

/// Update notification from a result-set cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSetEvent {
    pub query: QueryKey,
    pub update: ResultSetUpdate,
}

impl ResultSetEvent {
    pub fn page_loaded(query: QueryKey) -> Self {
        Self {
            query,
            update: ResultSetUpdate::PageLoaded,
        }
    }

    pub fn refreshed(query: QueryKey) -> Self {
        Self {
            query,
            update: ResultSetUpdate::Refreshed,
        }
    }
}

/// The application's result-set cache, seen from a consumer.
///
/// Pages are returned exactly as fetched from the public API; decrypted data
/// is never written back into them.
pub trait ResultSetSource: Send + Sync + 'static {
    type Page: Overlay + Send + Sync + 'static;

    /// Currently loaded pages for `query`, oldest first.
    fn pages(&self, query: &QueryKey) -> Vec<Self::Page>;

    /// Stream of update events for every query.
    fn subscribe(&self) -> broadcast::Receiver<ResultSetEvent>;
}

type Extractor<P> = Arc<dyn Fn(&[P]) -> HashSet<Identity> + Send + Sync>;

/// A fetch pass prepared by a consumer, ready to be awaited or spawned.
#[must_use = "a pending pass does nothing until run or spawned"]
pub struct PendingPass {
    coordinator: Arc<FetchCoordinator>,
    query: QueryKey,
    identities: HashSet<Identity>,
    mode: PassMode,
}

impl PendingPass {
    pub fn identities(&self) -> &HashSet<Identity> {
        &self.identities
    }

    pub fn mode(&self) -> PassMode {
        self.mode
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub async fn run(self) -> PassOutcome {
        if self.identities.is_empty() {
            return PassOutcome::Skipped;
        }
        self.coordinator
            .fetch_identities(&self.query, self.identities, self.mode)
            .await
    }

    /// Run on the tokio runtime without waiting for it.
    pub fn spawn(self) -> JoinHandle<PassOutcome> {
        tokio::spawn(self.run())
    }
}

/// One (result set, view) pairing.
pub struct DisclosureConsumer<S: ResultSetSource> {
    query: QueryKey,
    source: Arc<S>,
    coordinator: Arc<FetchCoordinator>,
    extractor: Extractor<S::Page>,
    extracted: HashSet<Identity>,
}

impl<S: ResultSetSource> DisclosureConsumer<S> {
    pub fn new<F>(query: QueryKey, source: Arc<S>, coordinator: Arc<FetchCoordinator>, extractor: F) -> Self
    where
        F: Fn(&[S::Page]) -> HashSet<Identity> + Send + Sync + 'static,
    {
        Self {
            query,
            source,
            coordinator,
            extractor: Arc::new(extractor),
            extracted: HashSet::new(),
        }
    }

    pub fn query(&self) -> &QueryKey {
        &self.query
    }

    /// Identities already handed to the coordinator by this consumer.
    pub fn extracted(&self) -> &HashSet<Identity> {
        &self.extracted
    }

    /// Eager pass over whatever is loaded at mount time.
    pub fn on_mount(&mut self) -> PendingPass {
        self.prepare(PassMode::Unchecked)
    }

    /// React to a result-set update. Events for other queries are ignored.
    pub fn on_result_set_event(&mut self, event: &ResultSetEvent) -> Option<PendingPass> {
        if event.query != self.query {
            return None;
        }
        match event.update {
            ResultSetUpdate::PageLoaded => Some(self.prepare(PassMode::Unchecked)),
            ResultSetUpdate::Refreshed => {
                debug!(query = %self.query, forgotten = self.extracted.len(), "Refresh: revalidating");
                self.extracted.clear();
                Some(self.prepare(PassMode::Revalidate))
            }
        }
    }

    /// Keep local memory in step with the shared cache.
    ///
    /// Returns a pass when the cache was emptied and everything on screen has
    /// to be checked again under the current session.
    pub fn on_cache_event(&mut self, event: &CacheEvent) -> Option<PendingPass> {
        match event {
            CacheEvent::Changed { .. } => None,
            CacheEvent::Evicted { identity } => {
                self.extracted.remove(identity);
                None
            }
            CacheEvent::Cleared => {
                debug!(query = %self.query, forgotten = self.extracted.len(), "Cache cleared: resyncing");
                Some(self.resync())
            }
        }
    }

    /// Pass over every loaded identity, ignoring local memory. Used after
    /// missing events.
    pub fn resync(&mut self) -> PendingPass {
        self.extracted.clear();
        self.prepare(PassMode::Unchecked)
    }

    /// Loaded pages merged with the current cache state.
    pub fn view(&self) -> Vec<S::Page> {
        let snapshot = self.coordinator.cache().snapshot();
        self.source.pages(&self.query).overlay(&snapshot)
    }

    fn prepare(&mut self, mode: PassMode) -> PendingPass {
        let pages = self.source.pages(&self.query);
        let referenced = (self.extractor)(&pages);
        let identities: HashSet<Identity> = referenced.difference(&self.extracted).cloned().collect();
        self.extracted.extend(identities.iter().cloned());

        debug!(
            query = %self.query,
            pages = pages.len(),
            new_identities = identities.len(),
            "Prepared fetch pass"
        );
        PendingPass {
            coordinator: self.coordinator.clone(),
            query: self.query.clone(),
            identities,
            mode,
        }
    }

    /// Drive the consumer until `output` has no receivers or a source closes.
    ///
    /// Publishes a fresh merged view on every relevant result-set update and
    /// on every cache change. Passes are spawned, so a slow fetch never delays
    /// re-rendering.
    pub async fn run(mut self, output: watch::Sender<Vec<S::Page>>) {
        let mut result_sets = self.source.subscribe();
        let mut cache_events = self.coordinator.cache().subscribe_events();

        output.send_replace(self.view());
        self.on_mount().spawn();

        loop {
            tokio::select! {
                _ = output.closed() => {
                    debug!(query = %self.query, "Consumer output dropped");
                    break;
                }
                event = result_sets.recv() => match event {
                    Ok(event) => {
                        if let Some(pass) = self.on_result_set_event(&event) {
                            pass.spawn();
                            output.send_replace(self.view());
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(query = %self.query, missed, "Missed result-set events, resyncing");
                        self.resync().spawn();
                        output.send_replace(self.view());
                    }
                    Err(RecvError::Closed) => break,
                },
                event = cache_events.recv() => match event {
                    Ok(event) => {
                        if let Some(pass) = self.on_cache_event(&event) {
                            pass.spawn();
                        }
                        output.send_replace(self.view());
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(query = %self.query, missed, "Missed cache events, resyncing");
                        self.resync().spawn();
                        output.send_replace(self.view());
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }
}

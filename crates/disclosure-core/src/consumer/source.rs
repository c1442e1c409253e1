use parking_lot::RwLock;
use std::collections::HashMap;
use tokio::sync::broadcast;
use tracing::debug;

use super::{ResultSetEvent, ResultSetSource};
use crate::merge::Overlay;
use crate::types::QueryKey;

const EVENT_CAPACITY: usize = 64;

/// In-memory result-set cache keyed by query.
pub struct InMemoryResultSets<P> {
    pages: RwLock<HashMap<QueryKey, Vec<P>>>,
    event_tx: broadcast::Sender<ResultSetEvent>,
}

impl<P: Clone> InMemoryResultSets<P> {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            pages: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Append a page and announce it.
    pub fn push_page(&self, query: &QueryKey, page: P) {
        let count = {
            let mut pages = self.pages.write();
            let loaded = pages.entry(query.clone()).or_default();
            loaded.push(page);
            loaded.len()
        };
        debug!(query = %query, pages = count, "Page loaded");
        let _ = self.event_tx.send(ResultSetEvent::page_loaded(query.clone()));
    }

    /// Replace all pages for `query` and announce a manual refresh.
    pub fn refresh(&self, query: &QueryKey, pages: Vec<P>) {
        self.pages.write().insert(query.clone(), pages);
        debug!(query = %query, "Result set refreshed");
        let _ = self.event_tx.send(ResultSetEvent::refreshed(query.clone()));
    }
}

impl<P: Clone> Default for InMemoryResultSets<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> ResultSetSource for InMemoryResultSets<P>
where
    P: Overlay + Send + Sync + 'static,
{
    type Page = P;

    fn pages(&self, query: &QueryKey) -> Vec<P> {
        self.pages.read().get(query).cloned().unwrap_or_default()
    }

    fn subscribe(&self) -> broadcast::Receiver<ResultSetEvent> {
        self.event_tx.subscribe()
    }
}

//! DisclosureSession - one signed-in account's disclosure pipeline
//!
//! Owns the cache, the session key slot and the fetch coordinator. Created at
//! login, handed by reference to every consumer, and torn down at logout or
//! account switch, which empties the cache.
//!
//! # Example
//!
//! ```ignore
//! let session = DisclosureSession::login(config, keys, api, Arc::new(TracingTelemetry))?;
//!
//! let mut followers = session.consumer(query, result_sets.clone(), profile_identities);
//! followers.on_mount().spawn();
//!
//! let merged = followers.view();
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::cache::DisclosureCache;
use crate::config::DisclosureConfig;
use crate::consumer::{DisclosureConsumer, ResultSetSource};
use crate::error::DisclosureResult;
use crate::fetch::{DisclosureApi, FetchCoordinator, TelemetrySink};
use crate::identity::{Identity, SessionKeyProvider, SessionKeySlot, SessionKeys};
use crate::types::QueryKey;

pub struct DisclosureSession {
    config: DisclosureConfig,
    cache: Arc<DisclosureCache>,
    keys: Arc<SessionKeySlot>,
    coordinator: Arc<FetchCoordinator>,
}

impl DisclosureSession {
    /// Build the pipeline for a freshly signed-in account.
    ///
    /// # Errors
    ///
    /// Returns `DisclosureError::Config` if `config` fails validation.
    pub fn login(
        config: DisclosureConfig,
        keys: SessionKeys,
        api: Arc<dyn DisclosureApi>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> DisclosureResult<Self> {
        config.validate()?;
        info!(identity = %keys.identity(), "Starting disclosure session");

        let cache = Arc::new(DisclosureCache::with_capacity(config.event_channel_capacity));
        let slot = Arc::new(SessionKeySlot::with_keys(keys));
        let coordinator = Arc::new(FetchCoordinator::new(
            cache.clone(),
            api,
            slot.clone(),
            telemetry,
            &config,
        ));

        Ok(Self {
            config,
            cache,
            keys: slot,
            coordinator,
        })
    }

    pub fn config(&self) -> &DisclosureConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<DisclosureCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    /// Identity of the signed-in account, if still signed in.
    pub fn identity(&self) -> Option<Identity> {
        self.keys
            .session_keys()
            .ok()
            .map(|keys| keys.identity().clone())
    }

    /// Bind a new consumer for `query` to this session.
    pub fn consumer<S, F>(&self, query: QueryKey, source: Arc<S>, extractor: F) -> DisclosureConsumer<S>
    where
        S: ResultSetSource,
        F: Fn(&[S::Page]) -> HashSet<Identity> + Send + Sync + 'static,
    {
        DisclosureConsumer::new(query, source, self.coordinator.clone(), extractor)
    }

    /// Replace the signed-in account and discard everything cached for the
    /// previous one.
    ///
    /// Keys change before the cache is cleared: a pass that claims after the
    /// clear can only have pinned the new account's keys.
    pub fn switch_account(&self, keys: SessionKeys) {
        info!(identity = %keys.identity(), "Switching disclosure session account");
        self.keys.install(keys);
        self.cache.clear_all();
    }

    /// Forget the account and everything decrypted for it.
    pub fn logout(&self) {
        info!("Ending disclosure session");
        self.keys.clear();
        self.cache.clear_all();
    }
}

impl Drop for DisclosureSession {
    fn drop(&mut self) {
        self.keys.clear();
        self.cache.clear_all();
    }
}

//! Fetch coordinator - turns "these identities are on screen" into at most
//! one batched service call per pass.
//!
//! ```text
//! extract ──► filter unchecked ──► claim ──► re-check ──► batch_fetch
//!                                                            │
//!            release ◄── commit (upsert + mark checked) ◄── open records
//! ```
//!
//! Passes never return errors to the caller. Batch failures mark the claimed
//! identities checked (so the next render does not immediately retry) and
//! raise a throttled [`Notice::ServiceDegraded`]; per-record failures are
//! logged, reported as [`Notice::RecordRejected`] and otherwise skipped.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::api::{DisclosureApi, DisclosureRecord, Requester};
use super::telemetry::{Notice, NoticeThrottle, TelemetrySink};
use crate::cache::DisclosureCache;
use crate::config::DisclosureConfig;
use crate::envelope::Envelope;
use crate::error::{DisclosureError, DisclosureResult};
use crate::identity::{Identity, RecipientKeyPair, SessionKeyProvider, SessionKeys};
use crate::types::{PrivateAttributes, QueryKey};

/// Which identities a pass considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Only identities the cache has never checked
    Unchecked,
    /// Every extracted identity, checked or not (manual refresh)
    Revalidate,
}

/// Lifecycle of a single pass, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    Extracting,
    Claiming,
    Fetching,
    Writing,
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassPhase::Idle => "idle",
            PassPhase::Extracting => "extracting",
            PassPhase::Claiming => "claiming",
            PassPhase::Fetching => "fetching",
            PassPhase::Writing => "writing",
        };
        f.write_str(name)
    }
}

/// Counters for a pass that reached the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub query: QueryKey,
    /// Identities claimed and sent in the batch
    pub claimed: usize,
    /// Records decrypted and written to the cache
    pub disclosed: usize,
    /// Records dropped because they failed to decode or decrypt
    pub rejected: usize,
}

impl PassReport {
    fn new(query: &QueryKey, claimed: usize) -> Self {
        Self {
            query: query.clone(),
            claimed,
            disclosed: 0,
            rejected: 0,
        }
    }
}

/// Result of a fetch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Nothing to fetch: every identity was checked or claimed elsewhere
    Skipped,
    /// The batch call succeeded
    Completed(PassReport),
    /// The batch call failed; claimed identities were marked checked
    Failed(PassReport),
}

impl PassOutcome {
    pub fn report(&self) -> Option<&PassReport> {
        match self {
            PassOutcome::Skipped => None,
            PassOutcome::Completed(report) | PassOutcome::Failed(report) => Some(report),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, PassOutcome::Skipped)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PassOutcome::Failed(_))
    }
}

#[derive(Default)]
struct OpenedBatch {
    disclosed: HashMap<Identity, PrivateAttributes>,
    rejected: usize,
}

/// Drives fetch passes against a shared [`DisclosureCache`].
pub struct FetchCoordinator {
    cache: Arc<DisclosureCache>,
    api: Arc<dyn DisclosureApi>,
    keys: Arc<dyn SessionKeyProvider>,
    telemetry: Arc<dyn TelemetrySink>,
    service_notices: NoticeThrottle,
}

impl FetchCoordinator {
    pub fn new(
        cache: Arc<DisclosureCache>,
        api: Arc<dyn DisclosureApi>,
        keys: Arc<dyn SessionKeyProvider>,
        telemetry: Arc<dyn TelemetrySink>,
        config: &DisclosureConfig,
    ) -> Self {
        Self {
            cache,
            api,
            keys,
            telemetry,
            service_notices: NoticeThrottle::new(config.service_notice_window()),
        }
    }

    pub fn cache(&self) -> &Arc<DisclosureCache> {
        &self.cache
    }

    /// Run a pass over the records currently loaded for `query`.
    ///
    /// `extractor` maps the loaded pages to the identities they reference.
    /// The pass only fetches identities the cache has never checked.
    pub async fn run_fetch_pass<P, F>(&self, query: &QueryKey, pages: &[P], extractor: F) -> PassOutcome
    where
        F: FnOnce(&[P]) -> HashSet<Identity>,
    {
        debug!(query = %query, phase = %PassPhase::Extracting, pages = pages.len(), "Extracting identities");
        let candidates = extractor(pages);
        self.fetch_identities(query, candidates, PassMode::Unchecked)
            .await
    }

    /// Run a pass over an already extracted identity set.
    pub async fn fetch_identities(
        &self,
        query: &QueryKey,
        candidates: HashSet<Identity>,
        mode: PassMode,
    ) -> PassOutcome {
        let span = info_span!("fetch_pass", query = %query, mode = ?mode);
        self.execute(query, candidates, mode).instrument(span).await
    }

    async fn execute(&self, query: &QueryKey, candidates: HashSet<Identity>, mode: PassMode) -> PassOutcome {
        let wanted: Vec<Identity> = match mode {
            PassMode::Unchecked => candidates
                .into_iter()
                .filter(|identity| !self.cache.is_checked(identity))
                .collect(),
            PassMode::Revalidate => candidates.into_iter().collect(),
        };
        if wanted.is_empty() {
            debug!(phase = %PassPhase::Idle, "No unchecked identities");
            return PassOutcome::Skipped;
        }

        // Keys are pinned before the claim and confirmed after it. A session
        // switch installs keys before clearing the cache, so unchanged keys
        // mean any clear_all that beat this claim already ran under them.
        let keys = match self.keys.session_keys() {
            Ok(keys) => keys,
            Err(e) => {
                debug!(phase = %PassPhase::Idle, error = %e, "No session keys");
                return PassOutcome::Skipped;
            }
        };

        debug!(phase = %PassPhase::Claiming, candidates = wanted.len(), "Claiming identities");
        let mut claim = self.cache.claim(wanted);

        // Another pass may have written between the filter and the claim.
        if mode == PassMode::Unchecked {
            let cache = &self.cache;
            claim.retain(|identity| !cache.is_checked(identity));
        }
        if claim.is_empty() {
            debug!(phase = %PassPhase::Idle, "All identities checked or inflight elsewhere");
            return PassOutcome::Skipped;
        }
        let unchanged = self.keys.session_keys().map_or(false, |current| Arc::ptr_eq(&keys, &current));
        if !unchanged {
            debug!(phase = %PassPhase::Idle, "Session changed while claiming");
            self.cache.release(claim);
            return PassOutcome::Skipped;
        }

        let mut requested: Vec<Identity> = claim.identities().iter().cloned().collect();
        requested.sort();
        let mut report = PassReport::new(query, requested.len());

        debug!(phase = %PassPhase::Fetching, claimed = requested.len(), "Fetching batch");
        let outcome = match self.fetch_batch(&requested, &keys).await {
            Ok(batch) => {
                debug!(phase = %PassPhase::Writing, disclosed = batch.disclosed.len(), "Writing results");
                report.disclosed = batch.disclosed.len();
                report.rejected = batch.rejected;
                self.cache.commit(&claim, batch.disclosed, &requested);
                info!(
                    claimed = report.claimed,
                    disclosed = report.disclosed,
                    rejected = report.rejected,
                    "Fetch pass complete"
                );
                PassOutcome::Completed(report)
            }
            Err(e) => {
                warn!(error = %e, claimed = report.claimed, "Fetch pass failed");
                self.cache.commit(&claim, HashMap::new(), &requested);
                self.report_service_failure(&e);
                PassOutcome::Failed(report)
            }
        };

        self.cache.release(claim);
        outcome
    }

    /// One service call plus decryption of whatever comes back.
    async fn fetch_batch(&self, requested: &[Identity], keys: &SessionKeys) -> DisclosureResult<OpenedBatch> {
        let requester = Requester {
            identity: keys.identity().clone(),
            public_key: keys.keypair().public_key(),
        };

        let records = self.api.batch_fetch(requested, &requester).await?;

        let expected: HashSet<&Identity> = requested.iter().collect();
        let mut batch = OpenedBatch::default();
        for record in records {
            if !expected.contains(&record.identity) {
                debug!(identity = %record.identity, "Ignoring record for unrequested identity");
                continue;
            }
            match open_record(&record, keys.keypair()) {
                Ok(attrs) => {
                    batch.disclosed.insert(record.identity, attrs);
                }
                Err(e) => {
                    batch.rejected += 1;
                    warn!(identity = %record.identity, error = %e, "Skipping undecryptable record");
                    self.telemetry.notify(Notice::RecordRejected {
                        identity: record.identity,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(batch)
    }

    fn report_service_failure(&self, error: &DisclosureError) {
        if self.service_notices.try_acquire() {
            self.telemetry.notify(Notice::ServiceDegraded {
                reason: error.to_string(),
            });
        } else {
            debug!(error = %error, "Service notice suppressed");
        }
    }
}

/// Decode, decrypt and parse a single record.
fn open_record(record: &DisclosureRecord, keypair: &RecipientKeyPair) -> DisclosureResult<PrivateAttributes> {
    let envelope = Envelope::from_base64(&record.encrypted_payload)?;
    let plaintext = envelope.open(keypair)?;
    PrivateAttributes::from_json(&plaintext)
}

//! End-to-end fetch pipeline scenarios
//!
//! Each test wires a real cache, coordinator and envelope path to the
//! in-memory disclosure service.
//!
//! ## What These Tests Verify
//!
//! - Partial responses: undisclosed identities become checked NONE entries
//! - Deduplication: concurrent passes over the same identities make one call
//! - Service failures: identities are marked checked, notices are throttled
//! - Teardown: `clear_all` leaves no stale entries or claims behind
//! - Cancellation: an abandoned pass releases its claim

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use disclosure_core::{
    profile_identities, DisclosureCache, DisclosureConfig, FetchCoordinator, Identity,
    InMemoryDisclosureApi, MemoryTelemetry, PassMode, PassOutcome, PrivateAttributes,
    ProfileView, QueryKey, RecipientKeyPair, RecipientPublicKey, SessionKeySlot, SessionKeys,
};

// ============================================================================
// Test Utilities
// ============================================================================

struct Harness {
    cache: Arc<DisclosureCache>,
    api: Arc<InMemoryDisclosureApi>,
    telemetry: Arc<MemoryTelemetry>,
    coordinator: Arc<FetchCoordinator>,
    viewer: Identity,
    viewer_key: RecipientPublicKey,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(DisclosureConfig::default())
    }

    fn with_config(config: DisclosureConfig) -> Self {
        let keypair = RecipientKeyPair::generate();
        let viewer = Identity::parse("did:plc:viewer").unwrap();
        let viewer_key = keypair.public_key();

        let cache = Arc::new(DisclosureCache::with_capacity(config.event_channel_capacity));
        let api = Arc::new(InMemoryDisclosureApi::new());
        let telemetry = Arc::new(MemoryTelemetry::new());
        let coordinator = Arc::new(FetchCoordinator::new(
            cache.clone(),
            api.clone(),
            Arc::new(SessionKeySlot::with_keys(SessionKeys::new(viewer.clone(), keypair))),
            telemetry.clone(),
            &config,
        ));

        Self {
            cache,
            api,
            telemetry,
            coordinator,
            viewer,
            viewer_key,
        }
    }

    /// `owner` discloses `name` to the viewer.
    fn disclose(&self, owner: &Identity, name: &str) {
        self.api
            .publish(owner, &named(name), &[(self.viewer.clone(), self.viewer_key.clone())])
            .unwrap();
    }

    async fn fetch(&self, ids: &[&Identity]) -> PassOutcome {
        self.coordinator
            .fetch_identities(
                &QueryKey::new("test"),
                ids.iter().map(|id| (*id).clone()).collect(),
                PassMode::Unchecked,
            )
            .await
    }
}

fn id(s: &str) -> Identity {
    Identity::parse(s).unwrap()
}

fn named(name: &str) -> PrivateAttributes {
    PrivateAttributes {
        display_name: Some(name.to_string()),
        ..Default::default()
    }
}

// ============================================================================
// Scenario A: partial response
// ============================================================================

#[tokio::test]
async fn test_partial_response_marks_missing_as_none() {
    let h = Harness::new();
    let x = id("did:plc:x");
    let y = id("did:plc:y");
    h.disclose(&x, "Xavier (private)");

    let pages = vec![vec![
        ProfileView::new(x.clone(), "x.example").with_display_name("Xavier"),
        ProfileView::new(y.clone(), "y.example").with_display_name("Yolanda"),
    ]];
    let outcome = h
        .coordinator
        .run_fetch_pass(&QueryKey::new("followers"), &pages, profile_identities)
        .await;

    assert!(matches!(outcome, PassOutcome::Completed(_)));
    assert_eq!(h.cache.get(&x), Some(named("Xavier (private)")));
    assert_eq!(h.cache.get(&y), None);
    assert!(h.cache.is_checked(&y));
    assert_eq!(h.api.call_count(), 1);

    // A second pass over the same pages is a no-op
    let again = h
        .coordinator
        .run_fetch_pass(&QueryKey::new("followers"), &pages, profile_identities)
        .await;
    assert!(again.is_skipped());
    assert_eq!(h.api.call_count(), 1);
}

// ============================================================================
// Scenario B: concurrent consumers, one batch call
// ============================================================================

#[tokio::test]
async fn test_concurrent_passes_make_one_call() {
    let _ = tracing_subscriber::fmt::try_init();
    let h = Harness::new();
    let x = id("did:plc:x");
    h.disclose(&x, "Shared");
    h.api.set_latency(Duration::from_millis(50));

    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    h.cache.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let feed_key = QueryKey::new("feed:home");
    let notifications_key = QueryKey::new("notifications");
    let (feed, notifications) = tokio::join!(
        h.coordinator
            .fetch_identities(&feed_key, HashSet::from([x.clone()]), PassMode::Unchecked),
        h.coordinator.fetch_identities(
            &notifications_key,
            HashSet::from([x.clone()]),
            PassMode::Unchecked
        ),
    );

    assert_eq!(h.api.call_count(), 1);
    let skipped = [&feed, &notifications].iter().filter(|o| o.is_skipped()).count();
    assert_eq!(skipped, 1);

    // Both consumers see the result through the shared cache
    assert_eq!(h.cache.get(&x), Some(named("Shared")));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_parallel_passes_one_call() {
    let h = Harness::new();
    let ids: Vec<Identity> = (0..20).map(|i| id(&format!("did:plc:{}", i))).collect();
    for identity in ids.iter().step_by(3) {
        h.disclose(identity, "someone");
    }
    h.api.set_latency(Duration::from_millis(30));

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let coordinator = h.coordinator.clone();
            let set: HashSet<Identity> = ids.iter().cloned().collect();
            tokio::spawn(async move {
                coordinator
                    .fetch_identities(&QueryKey::new(format!("consumer:{}", n)), set, PassMode::Unchecked)
                    .await
            })
        })
        .collect();

    let outcomes = futures::future::join_all(handles).await;
    let claimed: usize = outcomes
        .into_iter()
        .map(|o| o.unwrap())
        .filter_map(|o| o.report().map(|r| r.claimed))
        .sum();

    // Every identity was requested exactly once across all passes
    assert_eq!(claimed, ids.len());
    let requested: Vec<Identity> = h.api.requests().into_iter().flatten().collect();
    assert_eq!(requested.len(), ids.len());
    assert_eq!(requested.iter().collect::<HashSet<_>>().len(), ids.len());
    assert_eq!(h.cache.snapshot().len(), 7);
    assert_eq!(h.cache.inflight_len(), 0);
}

// ============================================================================
// Scenario C: transport failure
// ============================================================================

#[tokio::test]
async fn test_transport_failure_marks_checked() {
    let h = Harness::new();
    let z = id("did:plc:z");
    h.api.fail_with("connection reset");

    let outcome = h.fetch(&[&z]).await;

    assert!(outcome.is_failed());
    assert!(h.cache.is_checked(&z));
    assert_eq!(h.cache.get(&z), None);
    assert!(!h.cache.is_inflight(&z));
    assert_eq!(h.telemetry.service_degraded_count(), 1);
}

#[tokio::test]
async fn test_fifty_failures_one_notice() {
    let _ = tracing_subscriber::fmt::try_init();
    let h = Harness::new();
    h.api.fail_with("503 Service Unavailable");

    for i in 0..50 {
        let z = id(&format!("did:plc:z{}", i));
        assert!(h.fetch(&[&z]).await.is_failed());
    }

    assert_eq!(h.api.call_count(), 50);
    assert_eq!(h.telemetry.service_degraded_count(), 1);
}

#[tokio::test]
async fn test_notice_window_reopens() {
    let h = Harness::with_config(DisclosureConfig {
        service_notice_window_secs: 1,
        ..Default::default()
    });
    h.api.fail_with("timeout");

    h.fetch(&[&id("did:plc:a")]).await;
    h.fetch(&[&id("did:plc:b")]).await;
    assert_eq!(h.telemetry.service_degraded_count(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.fetch(&[&id("did:plc:c")]).await;
    assert_eq!(h.telemetry.service_degraded_count(), 2);
}

#[tokio::test]
async fn test_failed_identity_not_retried_until_revalidated() {
    let h = Harness::new();
    let z = id("did:plc:z");
    h.disclose(&z, "Zed");
    h.api.fail_with("503");

    h.fetch(&[&z]).await;
    h.api.recover();
    assert!(h.fetch(&[&z]).await.is_skipped());
    assert_eq!(h.cache.get(&z), None);

    let outcome = h
        .coordinator
        .fetch_identities(&QueryKey::new("test"), HashSet::from([z.clone()]), PassMode::Revalidate)
        .await;
    assert!(matches!(outcome, PassOutcome::Completed(_)));
    assert_eq!(h.cache.get(&z), Some(named("Zed")));
}

// ============================================================================
// Scenario D: teardown
// ============================================================================

#[tokio::test]
async fn test_clear_all_with_cached_and_inflight() {
    let h = Harness::new();
    let x = id("did:plc:x");
    let w = id("did:plc:w");
    h.disclose(&x, "X");
    h.fetch(&[&x]).await;
    assert!(h.cache.get(&x).is_some());

    let held = h.cache.claim([w.clone()]);
    assert!(h.cache.is_inflight(&w));

    h.cache.clear_all();

    assert_eq!(h.cache.get(&x), None);
    assert!(!h.cache.is_checked(&x));

    let fresh = h.cache.claim([w.clone()]);
    assert_eq!(fresh.len(), 1);

    // The stale token cannot free the fresh claim
    drop(held);
    assert!(h.cache.is_inflight(&w));
    drop(fresh);
}

#[tokio::test]
async fn test_pass_spanning_clear_all_writes_nothing() {
    let _ = tracing_subscriber::fmt::try_init();
    let h = Harness::new();
    let w = id("did:plc:w");
    h.disclose(&w, "Previous session");
    h.api.set_latency(Duration::from_millis(100));

    let coordinator = h.coordinator.clone();
    let pass = tokio::spawn({
        let w = w.clone();
        async move {
            coordinator
                .fetch_identities(&QueryKey::new("feed"), HashSet::from([w]), PassMode::Unchecked)
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.cache.is_inflight(&w));
    h.cache.clear_all();

    pass.await.unwrap();

    assert_eq!(h.cache.get(&w), None);
    assert!(!h.cache.is_checked(&w));
    assert_eq!(h.cache.inflight_len(), 0);
}

// ============================================================================
// Claims and cancellation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_single_winner() {
    let cache = Arc::new(DisclosureCache::new());
    let target = id("did:plc:contested");

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            let target = target.clone();
            tokio::spawn(async move {
                let claim = cache.claim([target]);
                let won = !claim.is_empty();
                // Hold long enough for every contender to try
                tokio::time::sleep(Duration::from_millis(200)).await;
                drop(claim);
                won
            })
        })
        .collect();

    let winners = futures::future::join_all(handles)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();

    assert_eq!(winners, 1);
    assert_eq!(cache.inflight_len(), 0);
}

#[tokio::test]
async fn test_abandoned_pass_releases_claim() {
    let h = Harness::new();
    let x = id("did:plc:x");
    h.disclose(&x, "X");
    h.api.set_latency(Duration::from_secs(5));

    let abandoned = tokio::time::timeout(Duration::from_millis(50), h.fetch(&[&x])).await;
    assert!(abandoned.is_err());

    assert!(!h.cache.is_inflight(&x));
    assert!(!h.cache.is_checked(&x));

    // A later pass can pick the identity up again
    h.api.set_latency(Duration::ZERO);
    assert!(matches!(h.fetch(&[&x]).await, PassOutcome::Completed(_)));
    assert_eq!(h.cache.get(&x), Some(named("X")));
}

//! End-to-end behaviour of the get-or-fetch flow against a scripted provider.

use std::sync::Arc;

use chrono::Duration;
use proptest::prelude::*;
use tokio::time::Instant;
use tollgate_core::{Clock, ConfigError, ProviderErrorKind, Region, TollgateConfig, TollgateError};
use tollgate_fetch::{FetchOrchestrator, RemoteResponse};
use tollgate_store::{Database, Filter, RecordStore};
use tollgate_test_utils::fixtures::{
    error_envelope, method_quota, shard_payload, summoner_payload, ShardStatus, Summoner,
    SummonerId,
};
use tollgate_test_utils::generators::{arb_region, arb_summoner_identity};
use tollgate_test_utils::{timestamp_from_millis, ManualClock, MockRemote};

fn clock() -> ManualClock {
    ManualClock::new(timestamp_from_millis(1_700_000_000_000).expect("valid timestamp"))
}

fn orchestrator(remote: MockRemote, clock: &ManualClock) -> FetchOrchestrator<MockRemote> {
    let db = Database::open_in_memory().expect("open should succeed");
    FetchOrchestrator::new(TollgateConfig::default(), db, remote)
        .expect("default config is valid")
        .with_clock(Arc::new(clock.clone()))
}

fn summoner_response(id: i64, name: &str) -> RemoteResponse {
    RemoteResponse::new(200, summoner_payload(id, name)).with_quota(method_quota("20:10", None))
}

fn summoner_rows(orchestrator: &FetchOrchestrator<MockRemote>) -> usize {
    RecordStore::<Summoner>::new(orchestrator.database().clone())
        .count(&Filter::new())
        .expect("count should succeed")
}

#[tokio::test]
async fn test_miss_then_hit_without_second_call() {
    let clock = clock();
    let remote = MockRemote::new().with_response(summoner_response(42, "x"));
    let orchestrator = orchestrator(remote, &clock);
    let na1 = Region::new("na1");

    let first = orchestrator
        .get::<Summoner>(&SummonerId(42), &na1)
        .await
        .expect("fetch should succeed");
    assert!(!first.is_cache_hit());
    assert_eq!(first.id, 42);
    assert_eq!(first.name, "x");
    assert_eq!(first.region, na1);
    assert_eq!(first.fetched_at, clock.now());

    // Quotas only take effect after the first response.
    let limiter = orchestrator.limiters().operation("summoner-by-id");
    let windows = limiter.snapshot(&na1).await;
    assert_eq!(windows.len(), 1);
    assert_eq!((windows[0].capacity(), windows[0].count()), (20, 0));

    let second = orchestrator
        .get::<Summoner>(&SummonerId(42), &na1)
        .await
        .expect("cache read should succeed");
    assert!(second.is_cache_hit());
    assert_eq!(second.value(), first.value());
    assert_eq!(orchestrator.remote().calls(), 1);

    // Cache hits never touch the limiter.
    assert_eq!(limiter.snapshot(&na1).await[0].count(), 0);

    let stats = orchestrator.stats();
    assert_eq!((stats.hits, stats.misses, stats.remote_calls), (1, 1, 1));
    assert_eq!(stats.hit_rate(), 0.5);

    let requests = orchestrator.remote().requests();
    assert_eq!(requests[0].path, "/lol/summoner/v3/summoners/42");
    assert_eq!(requests[0].region, na1);
}

#[tokio::test]
async fn test_provider_error_writes_nothing() {
    let clock = clock();
    let remote = MockRemote::new()
        .with_response(RemoteResponse::new(404, error_envelope(404, "Data not found")));
    let orchestrator = orchestrator(remote, &clock);

    let err = orchestrator
        .get::<Summoner>(&SummonerId(7), &Region::new("euw1"))
        .await
        .expect_err("provider error");
    match &err {
        TollgateError::Provider(e) => {
            assert_eq!(e.kind, ProviderErrorKind::DataNotFound);
            assert_eq!(e.message, "Data not found");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(summoner_rows(&orchestrator), 0);
    assert_eq!(orchestrator.stats().provider_failures, 1);
}

#[tokio::test]
async fn test_rate_limit_exceeded_is_not_retried() {
    let clock = clock();
    let remote = MockRemote::new()
        .with_response(RemoteResponse::new(429, error_envelope(429, "Rate limit exceeded")))
        .with_response(summoner_response(1, "never"));
    let orchestrator = orchestrator(remote, &clock);

    let err = orchestrator
        .get::<Summoner>(&SummonerId(1), &Region::new("kr"))
        .await
        .expect_err("rate limited");
    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::RateLimitExceeded));
    assert_eq!(orchestrator.remote().calls(), 1);
    assert_eq!(orchestrator.remote().remaining(), 1);
}

#[tokio::test]
async fn test_ttl_boundary() {
    let clock = clock();
    let remote = MockRemote::new()
        .with_response(summoner_response(42, "old"))
        .with_response(summoner_response(42, "new"));
    let orchestrator = orchestrator(remote, &clock);
    let na1 = Region::new("na1");
    let ttl = orchestrator.ttl_for::<Summoner>();

    orchestrator
        .get::<Summoner>(&SummonerId(42), &na1)
        .await
        .expect("initial fetch");

    clock.advance(ttl - Duration::seconds(1));
    let fresh = orchestrator
        .get::<Summoner>(&SummonerId(42), &na1)
        .await
        .expect("fresh read");
    assert!(fresh.is_cache_hit());
    assert_eq!(fresh.name, "old");
    assert_eq!(orchestrator.remote().calls(), 1);

    clock.advance(Duration::seconds(2));
    let refetched = orchestrator
        .get::<Summoner>(&SummonerId(42), &na1)
        .await
        .expect("stale row is refetched");
    assert!(!refetched.is_cache_hit());
    assert_eq!(refetched.name, "new");
    assert_eq!(orchestrator.remote().calls(), 2);
    assert_eq!(orchestrator.stats().evictions, 1);
    assert_eq!(summoner_rows(&orchestrator), 1);
}

#[tokio::test]
async fn test_ttl_override_per_operation() {
    let clock = clock();
    let remote = MockRemote::new()
        .with_response(summoner_response(3, "a"))
        .with_response(summoner_response(3, "b"));
    let orchestrator = orchestrator(remote, &clock).with_ttl("summoner-by-id", Duration::zero());
    let region = Region::new("br1");

    for _ in 0..2 {
        let read = orchestrator
            .get::<Summoner>(&SummonerId(3), &region)
            .await
            .expect("fetch");
        assert!(!read.is_cache_hit());
    }
    assert_eq!(orchestrator.remote().calls(), 2);
}

#[tokio::test]
async fn test_unknown_region_fails_before_io() {
    let clock = clock();
    let orchestrator = orchestrator(MockRemote::new(), &clock);

    let err = orchestrator
        .get::<Summoner>(&SummonerId(1), &Region::new("atlantis1"))
        .await
        .expect_err("unknown region");
    assert!(matches!(
        err,
        TollgateError::Config(ConfigError::UnknownRegion { .. })
    ));
    assert_eq!(orchestrator.remote().calls(), 0);
}

#[tokio::test]
async fn test_transport_failure_writes_nothing() {
    let clock = clock();
    let remote = MockRemote::new();
    remote.push_error(TollgateError::transport("connection reset"));
    let orchestrator = orchestrator(remote, &clock);

    let err = orchestrator
        .get::<Summoner>(&SummonerId(5), &Region::new("oc1"))
        .await
        .expect_err("transport failure");
    assert!(matches!(err, TollgateError::Transport { .. }));
    assert_eq!(summoner_rows(&orchestrator), 0);
    assert_eq!(orchestrator.stats().remote_calls, 0);
}

#[tokio::test]
async fn test_undecodable_payload_is_decode_error() {
    let clock = clock();
    let remote = MockRemote::new().with_response(RemoteResponse::new(200, r#"{"id":"nope"}"#));
    let orchestrator = orchestrator(remote, &clock);

    let err = orchestrator
        .get::<Summoner>(&SummonerId(5), &Region::new("tr1"))
        .await
        .expect_err("bad payload");
    assert!(matches!(err, TollgateError::Decode { .. }));
    assert_eq!(summoner_rows(&orchestrator), 0);
}

#[tokio::test]
async fn test_nested_entity_served_from_cache() {
    let clock = clock();
    let remote = MockRemote::new().with_response(RemoteResponse::new(200, shard_payload("euw1")));
    let orchestrator = orchestrator(remote, &clock);
    let euw1 = Region::new("euw1");

    let fetched = orchestrator
        .get::<ShardStatus>(&(), &euw1)
        .await
        .expect("fetch");
    let service = &fetched.services[0];
    assert_eq!(service.incidents[0].updates[0].translations[0].locale, "fr_FR");

    let cached = orchestrator
        .get::<ShardStatus>(&(), &euw1)
        .await
        .expect("cache read");
    assert!(cached.is_cache_hit());
    assert_eq!(cached.into_value(), fetched.into_value());
}

#[tokio::test(start_paused = true)]
async fn test_saturated_operation_quota_delays_next_fetch() {
    let clock = clock();
    let remote = MockRemote::new()
        .with_response(
            RemoteResponse::new(200, summoner_payload(9, "a"))
                .with_quota(method_quota("1:10", Some("1:10"))),
        )
        .with_response(summoner_response(9, "b"));
    let orchestrator = orchestrator(remote, &clock).with_ttl("summoner-by-id", Duration::zero());
    let la1 = Region::new("la1");

    orchestrator
        .get::<Summoner>(&SummonerId(9), &la1)
        .await
        .expect("first fetch");

    let start = Instant::now();
    let second = orchestrator
        .get::<Summoner>(&SummonerId(9), &la1)
        .await
        .expect("second fetch");
    assert_eq!(second.name, "b");
    assert!(start.elapsed() >= std::time::Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_uncounted_operation_leaves_credential_usage_alone() {
    let clock = clock();
    let credential_quota = tollgate_test_utils::QuotaHeaders {
        app_limit: Some("5:10".to_string()),
        app_count: Some("1:10".to_string()),
        ..Default::default()
    };
    let remote = MockRemote::new()
        .with_response(summoner_response(4, "a").with_quota(credential_quota))
        .with_response(RemoteResponse::new(200, shard_payload("jp1")));
    let orchestrator = orchestrator(remote, &clock);
    let jp1 = Region::new("jp1");

    orchestrator
        .get::<Summoner>(&SummonerId(4), &jp1)
        .await
        .expect("summoner fetch");
    orchestrator
        .get::<ShardStatus>(&(), &jp1)
        .await
        .expect("status fetch");

    // Status pages do not count against the credential quota.
    let credential = orchestrator.limiters().credential();
    assert_eq!(credential.snapshot(&jp1).await[0].count(), 1);
}

#[tokio::test]
async fn test_cache_survives_restart() {
    let dir = tempfile::TempDir::new().expect("TempDir creation should succeed");
    let config = TollgateConfig::default().with_database_path(dir.path().join("tollgate.db"));
    let clock = clock();

    {
        let db = Database::open(&config.database_path).expect("open");
        let remote = MockRemote::new().with_response(summoner_response(11, "persisted"));
        let orchestrator = FetchOrchestrator::new(config.clone(), db, remote)
            .expect("valid config")
            .with_clock(Arc::new(clock.clone()));
        orchestrator
            .get::<Summoner>(&SummonerId(11), &Region::new("ru"))
            .await
            .expect("fetch");
    }

    let db = Database::open(&config.database_path).expect("reopen");
    let orchestrator = FetchOrchestrator::new(config, db, MockRemote::new())
        .expect("valid config")
        .with_clock(Arc::new(clock.clone()));
    let read = orchestrator
        .get::<Summoner>(&SummonerId(11), &Region::new("RU"))
        .await
        .expect("served from disk");
    assert!(read.is_cache_hit());
    assert_eq!(read.name, "persisted");
    assert_eq!(orchestrator.remote().calls(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever the identity, a fetched entity is served unchanged from the
    /// store on the next request.
    #[test]
    fn prop_fetched_entity_is_served_from_cache(
        (id, name) in arb_summoner_identity(),
        region in arb_region(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime should build");
        runtime.block_on(async {
            let clock = clock();
            let remote = MockRemote::new().with_response(summoner_response(id, &name));
            let orchestrator = orchestrator(remote, &clock);

            let fetched = orchestrator
                .get::<Summoner>(&SummonerId(id), &region)
                .await
                .expect("fetch");
            let cached = orchestrator
                .get::<Summoner>(&SummonerId(id), &region)
                .await
                .expect("cache read");

            assert!(cached.is_cache_hit());
            assert_eq!(cached.name, name.to_lowercase());
            assert_eq!(cached.into_value(), fetched.into_value());
            assert_eq!(orchestrator.remote().calls(), 1);
        });
    }
}

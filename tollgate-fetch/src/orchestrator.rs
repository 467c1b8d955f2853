//! Get-or-fetch orchestration.
//!
//! Every entity type goes through the same request flow:
//!
//! 1. read the newest stored row for the identity and serve it if fresh
//! 2. otherwise evict the stale rows for the identity
//! 3. wait on the credential and operation limiters for the region
//! 4. call the provider and feed its quota headers back to the limiters
//! 5. fail on a provider error status, or persist the entity and serve it

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use dashmap::DashSet;
use tollgate_core::{Clock, Region, SystemClock, TollgateConfig, TollgateError, TollgateResult};
use tollgate_limiter::{LimiterSettings, Limiters};
use tollgate_store::{Database, RecordStore};

use crate::fetchable::Fetchable;
use crate::fetched::Fetched;
use crate::remote::{RemoteCall, RemoteRequest};
use crate::stats::{FetchStats, StatsCounters};

/// Serves entities from the record store, falling back to rate-limited
/// remote calls.
///
/// # Example
///
/// ```ignore
/// let config = TollgateConfig::from_env();
/// let db = Database::open(&config.database_path)?;
/// let remote = HttpRemote::new(&config)?;
/// let orchestrator = FetchOrchestrator::new(config, db, remote)?;
///
/// let summoner = orchestrator
///     .get::<Summoner>(&SummonerId(42), &Region::new("na1"))
///     .await?;
/// if summoner.is_cache_hit() { ... }
/// ```
pub struct FetchOrchestrator<R: RemoteCall> {
    config: TollgateConfig,
    db: Database,
    remote: R,
    limiters: Arc<Limiters>,
    clock: Arc<dyn Clock>,
    ttl_overrides: HashMap<&'static str, Duration>,
    prepared: DashSet<&'static str>,
    stats: StatsCounters,
}

impl<R: RemoteCall> FetchOrchestrator<R> {
    /// Create an orchestrator with its own limiters and the system clock.
    ///
    /// # Errors
    ///
    /// Returns a config error if `config` does not validate.
    pub fn new(config: TollgateConfig, db: Database, remote: R) -> TollgateResult<Self> {
        config.validate()?;
        let limiters = Arc::new(Limiters::new(LimiterSettings::from_config(&config)));
        Ok(Self {
            config,
            db,
            remote,
            limiters,
            clock: Arc::new(SystemClock),
            ttl_overrides: HashMap::new(),
            prepared: DashSet::new(),
            stats: StatsCounters::default(),
        })
    }

    /// Use `clock` for fetch timestamps and freshness.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share limiters with other orchestrators using the same credential.
    pub fn with_limiters(mut self, limiters: Arc<Limiters>) -> Self {
        self.limiters = limiters;
        self
    }

    /// Override the freshness window of one operation.
    pub fn with_ttl(mut self, operation: &'static str, ttl: Duration) -> Self {
        self.ttl_overrides.insert(operation, ttl);
        self
    }

    pub fn config(&self) -> &TollgateConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn limiters(&self) -> &Arc<Limiters> {
        &self.limiters
    }

    pub fn stats(&self) -> FetchStats {
        self.stats.snapshot()
    }

    /// Freshness window in effect for `E`.
    pub fn ttl_for<E: Fetchable>(&self) -> Duration {
        self.ttl_overrides
            .get(E::operation())
            .copied()
            .unwrap_or_else(E::default_ttl)
    }

    /// Store for `E`, creating its table on first use.
    pub fn store<E: Fetchable>(&self) -> TollgateResult<RecordStore<E>> {
        let store = RecordStore::<E>::new(self.db.clone());
        let table = E::schema().table;
        if !self.prepared.contains(table) {
            store.ensure_schema()?;
            self.prepared.insert(table);
        }
        Ok(store)
    }

    /// Serve `identity` in `region`, from the store while fresh and from the
    /// provider otherwise.
    ///
    /// # Errors
    ///
    /// - `Config(UnknownRegion)` before any I/O for a region outside the
    ///   configured list
    /// - `InvalidQuery` if the identity filter names undeclared fields
    /// - `Provider` when the provider answers with an error status; nothing
    ///   is written in that case
    /// - `Transport`, `Decode` and `Storage` for the respective failures
    ///
    /// No error is retried.
    pub async fn get<E: Fetchable>(
        &self,
        identity: &E::Identity,
        region: &Region,
    ) -> TollgateResult<Fetched<E>> {
        self.config.check_region(region)?;
        let store = self.store::<E>()?;
        let filter = E::identity_filter(identity, region);
        let newest_first = store.desc(E::fetched_at_field())?;

        if let Some(cached) = store.read_many(&filter, &[newest_first], Some(1))?.pop() {
            let now = self.clock.now();
            let fetched_at = cached.fetched_at();
            if now.signed_duration_since(fetched_at) < self.ttl_for::<E>() {
                tracing::debug!(
                    table = E::schema().table,
                    region = %region,
                    identity = ?identity,
                    "Cache hit"
                );
                self.stats.hit();
                return Ok(Fetched::from_cache(cached, fetched_at));
            }

            let evicted = store.delete_where(&filter)?;
            self.stats.evicted(evicted);
            tracing::debug!(
                table = E::schema().table,
                region = %region,
                identity = ?identity,
                evicted,
                "Evicted stale rows"
            );
        }

        self.stats.miss();
        tracing::debug!(
            table = E::schema().table,
            region = %region,
            identity = ?identity,
            "Cache miss, fetching"
        );

        let operation = E::operation();
        self.limiters
            .acquire(operation, region, E::counts_against_credential())
            .await;

        let request = RemoteRequest {
            region: region.clone(),
            path: E::request_path(identity),
        };
        let response = self.remote.call(&request).await?;
        self.stats.remote_call();
        self.limiters
            .observe(operation, region, &response.quota)
            .await;

        let payload = match response.into_payload() {
            Ok(payload) => payload,
            Err(err) => {
                if let TollgateError::Provider(provider) = &err {
                    self.stats.provider_failure();
                    tracing::warn!(
                        operation,
                        region = %region,
                        identity = ?identity,
                        status = provider.kind.status_code(),
                        message = %provider.message,
                        "Provider returned an error"
                    );
                }
                return Err(err);
            }
        };

        let fetched_at = self.clock.now();
        let entity = E::from_payload(payload, identity, region, fetched_at)?;
        store.upsert(&entity)?;
        Ok(Fetched::from_remote(entity, fetched_at))
    }
}

impl<R: RemoteCall + std::fmt::Debug> std::fmt::Debug for FetchOrchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("db", &self.db)
            .field("remote", &self.remote)
            .field("ttl_overrides", &self.ttl_overrides)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

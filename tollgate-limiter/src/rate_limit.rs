//! Region-partitioned rate limiters.
//!
//! A [`RateLimiter`] owns one region scope per region, created on first
//! reference. Each scope holds the region's windows behind an async mutex;
//! callers in different regions never contend.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tollgate_core::{Region, TollgateConfig};

use crate::quota::{QuotaHeaders, QuotaRule};
use crate::window::{admit_all, restart_rolled, BatchAdmission, Window};

/// Mutable state of one region under one limiter.
#[derive(Debug, Default)]
struct ScopeState {
    windows: Vec<Window>,
    /// Bumped on every reconfigure so a stale batch cannot restart windows
    /// it did not evaluate.
    generation: u64,
    last_reconfigured: Option<Instant>,
}

impl ScopeState {
    fn admit(&mut self, now: Instant, count_call: bool) -> (BatchAdmission, u64) {
        (admit_all(&mut self.windows, now, count_call), self.generation)
    }

    fn commit(&mut self, batch: &BatchAdmission, generation: u64, now: Instant) {
        if generation == self.generation {
            restart_rolled(&mut self.windows, &batch.rolled, now);
        }
    }
}

/// Windows and lock for one region.
#[derive(Debug, Default)]
struct RegionScope {
    state: Mutex<ScopeState>,
}

/// Settings shared by every limiter of one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    /// Added to every wait to absorb clock skew.
    pub margin_of_error: Duration,
    pub credential_refresh_cooldown: Duration,
    pub operation_refresh_cooldown: Duration,
    /// Hold the region lock across the wait.
    pub serialize: bool,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            margin_of_error: Duration::from_millis(50),
            credential_refresh_cooldown: Duration::ZERO,
            operation_refresh_cooldown: Duration::from_secs(3600),
            serialize: true,
        }
    }
}

impl LimiterSettings {
    pub fn from_config(config: &TollgateConfig) -> Self {
        Self {
            margin_of_error: config.margin_of_error,
            credential_refresh_cooldown: config.credential_refresh_cooldown,
            operation_refresh_cooldown: config.operation_refresh_cooldown,
            serialize: config.serialize_regions,
        }
    }
}

/// One named limiter, partitioned by region.
///
/// # Example
///
/// ```ignore
/// let limiter = RateLimiter::new("summoner-by-name", Duration::from_millis(50), Duration::from_secs(3600), true);
///
/// limiter.acquire(&region, true).await;
/// let response = remote.call(...).await?;
/// if let Some(rules) = response.quota.operation_rules() {
///     limiter.reconfigure(&region, rules).await;
/// }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    margin_of_error: Duration,
    refresh_cooldown: Duration,
    serialize: bool,
    regions: DashMap<Region, Arc<RegionScope>>,
}

impl RateLimiter {
    pub fn new(
        name: impl Into<String>,
        margin_of_error: Duration,
        refresh_cooldown: Duration,
        serialize: bool,
    ) -> Self {
        Self {
            name: name.into(),
            margin_of_error,
            refresh_cooldown,
            serialize,
            regions: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refresh_cooldown(&self) -> Duration {
        self.refresh_cooldown
    }

    /// Number of regions this limiter has seen.
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Get or register the scope for `region`.
    fn scope(&self, region: &Region) -> Arc<RegionScope> {
        if let Some(scope) = self.regions.get(region) {
            return Arc::clone(&scope);
        }
        let scope = self.regions.entry(region.clone()).or_insert_with(|| {
            tracing::info!(limiter = %self.name, region = %region, "Registered region scope");
            Arc::new(RegionScope::default())
        });
        Arc::clone(&scope)
    }

    /// Wait until one call in `region` is legal under every window, then
    /// account for it.
    ///
    /// A region with no windows admits immediately. Returns the time spent
    /// waiting. The wait is never cancelled once started.
    pub async fn acquire(&self, region: &Region, count_call: bool) -> Duration {
        let scope = self.scope(region);

        if self.serialize {
            let mut state = scope.state.lock().await;
            let (batch, generation) = state.admit(Instant::now(), count_call);
            let waited = self.wait(region, batch.wait).await;
            state.commit(&batch, generation, Instant::now());
            waited
        } else {
            let (batch, generation) = {
                let mut state = scope.state.lock().await;
                state.admit(Instant::now(), count_call)
            };
            let waited = self.wait(region, batch.wait).await;
            scope
                .state
                .lock()
                .await
                .commit(&batch, generation, Instant::now());
            waited
        }
    }

    async fn wait(&self, region: &Region, wait: Duration) -> Duration {
        if wait.is_zero() {
            return Duration::ZERO;
        }
        let delay = wait + self.margin_of_error;
        tracing::warn!(
            limiter = %self.name,
            region = %region,
            wait_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Rate limit reached, waiting for window"
        );
        tokio::time::sleep(delay).await;
        delay
    }

    /// Replace the windows of `region` with `rules`, seeding each window's
    /// count from the rule's starting usage.
    ///
    /// Applies only if the refresh cooldown has passed since the last
    /// reconfigure of this region; the first reconfigure always applies and
    /// a zero cooldown applies every time. An empty rule set is ignored.
    /// Returns whether the windows were replaced.
    pub async fn reconfigure(&self, region: &Region, rules: Vec<QuotaRule>) -> bool {
        if rules.is_empty() {
            return false;
        }
        let scope = self.scope(region);
        let mut state = scope.state.lock().await;
        let now = Instant::now();

        if let Some(last) = state.last_reconfigured {
            if !self.refresh_cooldown.is_zero()
                && now.saturating_duration_since(last) <= self.refresh_cooldown
            {
                return false;
            }
        }

        state.windows = rules.iter().map(|rule| Window::seeded(rule, now)).collect();
        state.generation += 1;
        state.last_reconfigured = Some(now);

        for rule in &rules {
            tracing::debug!(
                limiter = %self.name,
                region = %region,
                capacity = rule.capacity,
                period_secs = rule.period.as_secs(),
                count = rule.starting_count,
                "Installed quota window"
            );
        }
        true
    }

    /// Copy of the current windows of `region`, empty if unseen.
    pub async fn snapshot(&self, region: &Region) -> Vec<Window> {
        let scope = match self.regions.get(region) {
            Some(scope) => Arc::clone(&scope),
            None => return Vec::new(),
        };
        let state = scope.state.lock().await;
        state.windows.clone()
    }
}

/// The limiters of one credential: a credential-level limiter shared by
/// every operation and one operation-level limiter per operation name.
#[derive(Debug)]
pub struct Limiters {
    settings: LimiterSettings,
    credential: Arc<RateLimiter>,
    operations: DashMap<String, Arc<RateLimiter>>,
}

impl Limiters {
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            credential: Arc::new(RateLimiter::new(
                "credential",
                settings.margin_of_error,
                settings.credential_refresh_cooldown,
                settings.serialize,
            )),
            operations: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &LimiterSettings {
        &self.settings
    }

    pub fn credential(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.credential)
    }

    /// Operation-level limiter for `name`, created on first use.
    pub fn operation(&self, name: &str) -> Arc<RateLimiter> {
        if let Some(limiter) = self.operations.get(name) {
            return Arc::clone(&limiter);
        }
        let limiter = self.operations.entry(name.to_string()).or_insert_with(|| {
            Arc::new(RateLimiter::new(
                name,
                self.settings.margin_of_error,
                self.settings.operation_refresh_cooldown,
                self.settings.serialize,
            ))
        });
        Arc::clone(&limiter)
    }

    /// Clear one call for `operation` in `region`: the credential limiter
    /// first (when the operation counts against it), then the operation's
    /// own limiter. Returns the total time waited.
    pub async fn acquire(&self, operation: &str, region: &Region, count_credential: bool) -> Duration {
        let credential = self.credential.acquire(region, count_credential).await;
        let op = self.operation(operation).acquire(region, true).await;
        credential + op
    }

    /// Feed response quota headers back into both tiers.
    pub async fn observe(&self, operation: &str, region: &Region, quota: &QuotaHeaders) {
        if let Some(rules) = quota.credential_rules() {
            self.credential.reconfigure(region, rules).await;
        }
        if let Some(rules) = quota.operation_rules() {
            self.operation(operation).reconfigure(region, rules).await;
        }
    }
}

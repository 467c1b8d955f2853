//! Quota rules and the provider headers that announce them.
//!
//! The provider reports limits as `"cap:period,cap:period"` and current
//! usage as `"count:period,count:period"`, periods in seconds. Entries are
//! paired by period.

use std::time::Duration;

/// Credential-level limits.
pub const APP_RATE_LIMIT: &str = "X-App-Rate-Limit";
/// Credential-level usage.
pub const APP_RATE_LIMIT_COUNT: &str = "X-App-Rate-Limit-Count";
/// Per-operation limits.
pub const METHOD_RATE_LIMIT: &str = "X-Method-Rate-Limit";
/// Per-operation usage.
pub const METHOD_RATE_LIMIT_COUNT: &str = "X-Method-Rate-Limit-Count";

/// One server-imposed `(capacity, period)` rule plus the usage already
/// counted against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRule {
    pub capacity: u32,
    pub period: Duration,
    pub starting_count: u32,
}

impl QuotaRule {
    pub fn new(capacity: u32, period: Duration) -> Self {
        Self {
            capacity,
            period,
            starting_count: 0,
        }
    }

    pub fn with_starting_count(mut self, count: u32) -> Self {
        self.starting_count = count;
        self
    }
}

/// Parse `"value:period,..."` into `(value, period_secs)` pairs, skipping
/// malformed entries.
fn parse_pairs(header: &str, source: &'static str) -> Vec<(u32, u64)> {
    header
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = entry.split_once(':').and_then(|(value, period)| {
                Some((value.trim().parse().ok()?, period.trim().parse().ok()?))
            });
            if parsed.is_none() {
                tracing::warn!(header = source, entry, "Skipping malformed quota entry");
            }
            parsed
        })
        .collect()
}

/// Build rules from a limit header and its optional usage header.
///
/// A period absent from `counts` starts at zero usage. Zero-length periods
/// are dropped.
pub fn parse_rules(limits: &str, counts: Option<&str>) -> Vec<QuotaRule> {
    let usage = counts
        .map(|c| parse_pairs(c, "count"))
        .unwrap_or_default();

    parse_pairs(limits, "limit")
        .into_iter()
        .filter(|&(_, period)| period > 0)
        .map(|(capacity, period)| {
            let starting_count = usage
                .iter()
                .find(|&&(_, p)| p == period)
                .map_or(0, |&(count, _)| count);
            QuotaRule::new(capacity, Duration::from_secs(period))
                .with_starting_count(starting_count)
        })
        .collect()
}

/// Quota metadata captured from one provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaHeaders {
    pub app_limit: Option<String>,
    pub app_count: Option<String>,
    pub method_limit: Option<String>,
    pub method_count: Option<String>,
}

impl QuotaHeaders {
    /// Collect the four quota headers through a case-insensitive lookup.
    pub fn from_lookup<'a>(lookup: impl Fn(&str) -> Option<&'a str>) -> Self {
        let get = |name: &str| lookup(name).map(str::to_string);
        Self {
            app_limit: get(APP_RATE_LIMIT),
            app_count: get(APP_RATE_LIMIT_COUNT),
            method_limit: get(METHOD_RATE_LIMIT),
            method_count: get(METHOD_RATE_LIMIT_COUNT),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.app_limit.is_none() && self.method_limit.is_none()
    }

    /// Rules for the credential-level limiter, if the response carried any.
    pub fn credential_rules(&self) -> Option<Vec<QuotaRule>> {
        Self::rules(self.app_limit.as_deref(), self.app_count.as_deref())
    }

    /// Rules for the operation-level limiter, if the response carried any.
    pub fn operation_rules(&self) -> Option<Vec<QuotaRule>> {
        Self::rules(self.method_limit.as_deref(), self.method_count.as_deref())
    }

    fn rules(limit: Option<&str>, count: Option<&str>) -> Option<Vec<QuotaRule>> {
        let rules = parse_rules(limit?, count);
        (!rules.is_empty()).then_some(rules)
    }
}

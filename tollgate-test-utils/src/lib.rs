//! Tollgate Test Utilities
//!
//! Shared test infrastructure for the Tollgate workspace:
//! - Fixture entities (a flat summoner profile and a nested shard status)
//! - A scripted mock provider
//! - Proptest generators

pub use tollgate_core::{
    timestamp_from_millis, timestamp_to_millis, Clock, ManualClock, ProviderErrorKind, Region,
    Timestamp, TollgateConfig, TollgateError, TollgateResult,
};
pub use tollgate_fetch::{Fetchable, RemoteCall, RemoteRequest, RemoteResponse};
pub use tollgate_limiter::{QuotaHeaders, QuotaRule};
pub use tollgate_store::{Database, Entity, FieldDef, Filter, Record, Schema};

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

/// Drop sub-millisecond precision, matching what the store keeps.
pub fn truncate_to_millis(ts: Timestamp) -> Timestamp {
    timestamp_from_millis(timestamp_to_millis(ts)).unwrap_or(ts)
}

// ============================================================================
// FIXTURE ENTITIES
// ============================================================================

pub mod fixtures {
    use chrono::Duration;
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use super::*;

    /// Identity of a summoner lookup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SummonerId(pub i64);

    /// A player profile: flat scalar fields keyed by id and region.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Summoner {
        pub id: i64,
        pub region: Region,
        pub name: String,
        pub account_id: i64,
        pub profile_icon_id: i64,
        pub summoner_level: i64,
        pub revision_date: i64,
        pub fetched_at: Timestamp,
    }

    pub static SUMMONER: Schema = Schema::new(
        "summoner",
        &[FieldDef::integer("id"), FieldDef::text("region")],
        &[
            FieldDef::text("name"),
            FieldDef::integer("account_id"),
            FieldDef::integer("profile_icon_id"),
            FieldDef::integer("summoner_level"),
            FieldDef::integer("revision_date"),
            FieldDef::integer("fetched_at"),
        ],
    );

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct SummonerPayload {
        id: i64,
        name: String,
        #[serde(default)]
        account_id: i64,
        #[serde(default)]
        profile_icon_id: i64,
        #[serde(default)]
        summoner_level: i64,
        #[serde(default)]
        revision_date: i64,
    }

    impl Entity for Summoner {
        fn schema() -> &'static Schema {
            &SUMMONER
        }

        fn to_record(&self) -> TollgateResult<Record> {
            Ok(Record::new()
                .with("id", self.id)
                .with("region", &self.region)
                .with("name", self.name.as_str())
                .with("account_id", self.account_id)
                .with("profile_icon_id", self.profile_icon_id)
                .with("summoner_level", self.summoner_level)
                .with("revision_date", self.revision_date)
                .with("fetched_at", self.fetched_at))
        }

        fn from_record(record: Record) -> TollgateResult<Self> {
            Ok(Self {
                id: record.integer("id")?,
                region: Region::new(record.text("region")?),
                name: record.text("name")?,
                account_id: record.opt_integer("account_id")?.unwrap_or_default(),
                profile_icon_id: record.opt_integer("profile_icon_id")?.unwrap_or_default(),
                summoner_level: record.opt_integer("summoner_level")?.unwrap_or_default(),
                revision_date: record.opt_integer("revision_date")?.unwrap_or_default(),
                fetched_at: record.timestamp("fetched_at")?,
            })
        }
    }

    impl Fetchable for Summoner {
        type Identity = SummonerId;

        fn operation() -> &'static str {
            "summoner-by-id"
        }

        fn default_ttl() -> Duration {
            Duration::minutes(10)
        }

        fn identity_filter(identity: &SummonerId, region: &Region) -> Filter {
            Filter::new().eq("id", identity.0).eq("region", region)
        }

        fn request_path(identity: &SummonerId) -> String {
            format!("/lol/summoner/v3/summoners/{}", identity.0)
        }

        fn fetched_at(&self) -> Timestamp {
            self.fetched_at
        }

        fn from_payload(
            payload: Value,
            _identity: &SummonerId,
            region: &Region,
            fetched_at: Timestamp,
        ) -> TollgateResult<Self> {
            let p: SummonerPayload = serde_json::from_value(payload)
                .map_err(|e| TollgateError::decode(format!("summoner payload: {}", e)))?;
            Ok(Self {
                id: p.id,
                region: region.clone(),
                name: p.name.to_lowercase(),
                account_id: p.account_id,
                profile_icon_id: p.profile_icon_id,
                summoner_level: p.summoner_level,
                revision_date: p.revision_date,
                fetched_at: truncate_to_millis(fetched_at),
            })
        }
    }

    /// A localized status message.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Translation {
        pub locale: String,
        pub content: String,
        #[serde(default)]
        pub updated_at: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Message {
        pub id: String,
        pub severity: String,
        #[serde(default)]
        pub author: String,
        pub content: String,
        pub created_at: String,
        #[serde(default)]
        pub updated_at: Option<String>,
        #[serde(default)]
        pub translations: Vec<Translation>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Incident {
        pub id: i64,
        pub active: bool,
        pub created_at: String,
        #[serde(default)]
        pub updates: Vec<Message>,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Service {
        pub name: String,
        pub slug: String,
        pub status: String,
        #[serde(default)]
        pub incidents: Vec<Incident>,
    }

    /// Service status of one region: nested services, incidents, messages
    /// and translations stored as structured fields.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ShardStatus {
        pub region: Region,
        pub name: String,
        pub hostname: String,
        pub slug: String,
        pub locales: Vec<String>,
        pub services: Vec<Service>,
        pub fetched_at: Timestamp,
    }

    pub static SHARD_STATUS: Schema = Schema::new(
        "shard_status",
        &[FieldDef::text("region")],
        &[
            FieldDef::text("name"),
            FieldDef::text("hostname"),
            FieldDef::text("slug"),
            FieldDef::structured("locales"),
            FieldDef::structured("services"),
            FieldDef::integer("fetched_at"),
        ],
    );

    #[derive(Debug, Deserialize)]
    struct ShardPayload {
        name: String,
        #[serde(default)]
        hostname: String,
        slug: String,
        #[serde(default)]
        locales: Vec<String>,
        #[serde(default)]
        services: Vec<Service>,
    }

    impl Entity for ShardStatus {
        fn schema() -> &'static Schema {
            &SHARD_STATUS
        }

        fn to_record(&self) -> TollgateResult<Record> {
            Ok(Record::new()
                .with("region", &self.region)
                .with("name", self.name.as_str())
                .with("hostname", self.hostname.as_str())
                .with("slug", self.slug.as_str())
                .with_structured("locales", &self.locales)?
                .with_structured("services", &self.services)?
                .with("fetched_at", self.fetched_at))
        }

        fn from_record(record: Record) -> TollgateResult<Self> {
            Ok(Self {
                region: Region::new(record.text("region")?),
                name: record.text("name")?,
                hostname: record.opt_text("hostname")?.unwrap_or_default(),
                slug: record.text("slug")?,
                locales: record.opt_structured("locales")?.unwrap_or_default(),
                services: record.opt_structured("services")?.unwrap_or_default(),
                fetched_at: record.timestamp("fetched_at")?,
            })
        }
    }

    impl Fetchable for ShardStatus {
        type Identity = ();

        fn operation() -> &'static str {
            "shard-data"
        }

        fn counts_against_credential() -> bool {
            false
        }

        fn default_ttl() -> Duration {
            Duration::minutes(1)
        }

        fn identity_filter(_identity: &(), region: &Region) -> Filter {
            Filter::new().eq("region", region)
        }

        fn request_path(_identity: &()) -> String {
            "/lol/status/v3/shard-data".to_string()
        }

        fn fetched_at(&self) -> Timestamp {
            self.fetched_at
        }

        fn from_payload(
            payload: Value,
            _identity: &(),
            region: &Region,
            fetched_at: Timestamp,
        ) -> TollgateResult<Self> {
            let p: ShardPayload = serde_json::from_value(payload)
                .map_err(|e| TollgateError::decode(format!("shard payload: {}", e)))?;
            Ok(Self {
                region: region.clone(),
                name: p.name,
                hostname: p.hostname,
                slug: p.slug,
                locales: p.locales,
                services: p.services,
                fetched_at: truncate_to_millis(fetched_at),
            })
        }
    }

    /// Provider payload for a summoner.
    pub fn summoner_payload(id: i64, name: &str) -> String {
        serde_json::json!({
            "id": id,
            "accountId": id * 10,
            "name": name,
            "profileIconId": 7,
            "summonerLevel": 30,
            "revisionDate": 1_500_000_000_000i64,
        })
        .to_string()
    }

    /// Provider payload for a shard with one active incident.
    pub fn shard_payload(region: &str) -> String {
        serde_json::json!({
            "name": region.to_uppercase(),
            "hostname": format!("prod.{}.lol.riotgames.com", region),
            "slug": region,
            "locales": ["en_US", "fr_FR"],
            "services": [{
                "name": "Game",
                "slug": "game",
                "status": "online",
                "incidents": [{
                    "id": 1,
                    "active": true,
                    "created_at": "2018-01-01T00:00:00Z",
                    "updates": [{
                        "id": "m1",
                        "severity": "info",
                        "author": "",
                        "content": "Queues delayed",
                        "created_at": "2018-01-01T00:00:00Z",
                        "translations": [
                            {"locale": "fr_FR", "content": "Files retardees"}
                        ]
                    }]
                }]
            }]
        })
        .to_string()
    }

    /// Provider error envelope.
    pub fn error_envelope(status_code: u16, message: &str) -> String {
        serde_json::json!({
            "status": {"status_code": status_code, "message": message}
        })
        .to_string()
    }

    /// Quota headers announcing `limit` for the operation tier only.
    pub fn method_quota(limit: &str, count: Option<&str>) -> QuotaHeaders {
        QuotaHeaders {
            method_limit: Some(limit.to_string()),
            method_count: count.map(str::to_string),
            ..Default::default()
        }
    }
}

// ============================================================================
// MOCK PROVIDER
// ============================================================================

/// Provider double answering from a script.
///
/// Responses are returned in push order; an exhausted script fails the call
/// with a transport error. Every request is recorded.
#[derive(Debug, Default)]
pub struct MockRemote {
    script: Mutex<VecDeque<TollgateResult<RemoteResponse>>>,
    requests: Mutex<Vec<RemoteRequest>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    pub fn with_response(self, response: RemoteResponse) -> Self {
        self.push(response);
        self
    }

    pub fn push(&self, response: RemoteResponse) {
        lock(&self.script).push_back(Ok(response));
    }

    /// Queue a transport-level failure.
    pub fn push_error(&self, error: TollgateError) {
        lock(&self.script).push_back(Err(error));
    }

    /// Number of calls made so far.
    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        lock(&self.requests).clone()
    }

    /// Scripted responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl RemoteCall for MockRemote {
    async fn call(&self, request: &RemoteRequest) -> TollgateResult<RemoteResponse> {
        lock(&self.requests).push(request.clone());
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(TollgateError::transport("mock script exhausted")))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::prelude::*;

    use super::*;

    /// Generate a region from the default platform list.
    pub fn arb_region() -> impl Strategy<Value = Region> {
        prop::sample::select(tollgate_core::DEFAULT_REGIONS.to_vec()).prop_map(Region::new)
    }

    /// Generate a summoner payload `(id, name)`.
    pub fn arb_summoner_identity() -> impl Strategy<Value = (i64, String)> {
        (1i64..1_000_000, "[A-Za-z][A-Za-z0-9 ]{2,15}")
    }
}

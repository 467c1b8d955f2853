//! The per-entity half of the get-or-fetch contract.

use std::fmt;

use chrono::Duration;
use serde_json::Value;
use tollgate_core::{Region, Timestamp, TollgateResult};
use tollgate_store::{Entity, Filter};

/// An entity the orchestrator can serve from the store or fetch remotely.
///
/// Implementors only describe their identity, endpoint and payload shape;
/// the caching, pacing and persistence workflow is shared.
///
/// # Example
///
/// ```ignore
/// impl Fetchable for Summoner {
///     type Identity = SummonerId;
///
///     fn operation() -> &'static str { "summoner-by-id" }
///     fn default_ttl() -> Duration { Duration::minutes(10) }
///     fn identity_filter(id: &SummonerId, region: &Region) -> Filter {
///         Filter::new().eq("id", id.0).eq("region", region)
///     }
///     fn request_path(id: &SummonerId) -> String {
///         format!("/lol/summoner/v3/summoners/{}", id.0)
///     }
///     fn fetched_at(&self) -> Timestamp { self.fetched_at }
///     fn from_payload(payload: Value, _: &SummonerId, region: &Region, at: Timestamp) -> TollgateResult<Self> { ... }
/// }
/// ```
pub trait Fetchable: Entity {
    /// What the caller asks for (a summoner id, a name, a match id).
    type Identity: fmt::Debug + Send + Sync;

    /// Name of the operation-level limiter for this endpoint.
    fn operation() -> &'static str;

    /// Whether calls count against the credential-level quota.
    fn counts_against_credential() -> bool {
        true
    }

    /// How long a stored copy stays fresh. Zero means always refetch.
    fn default_ttl() -> Duration;

    /// Equality filter locating stored rows for `identity` in `region`.
    fn identity_filter(identity: &Self::Identity, region: &Region) -> Filter;

    /// Request path appended to the region's base URL.
    fn request_path(identity: &Self::Identity) -> String;

    /// Schema field holding the fetch timestamp.
    fn fetched_at_field() -> &'static str {
        "fetched_at"
    }

    fn fetched_at(&self) -> Timestamp;

    /// Build the entity from a decoded provider payload, attaching the
    /// identity, region and fetch time.
    fn from_payload(
        payload: Value,
        identity: &Self::Identity,
        region: &Region,
        fetched_at: Timestamp,
    ) -> TollgateResult<Self>;
}

//! Process configuration
//!
//! Configuration is loaded from environment variables with defaults that
//! match the provider's documented platform routing.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::{ConfigError, Region, TollgateError, TollgateResult};

/// Platform routing values accepted by the provider.
pub const DEFAULT_REGIONS: &[&str] = &[
    "BR1", "EUN1", "EUW1", "JP1", "KR", "LA1", "LA2", "NA1", "OC1", "TR1", "RU", "PBE1",
];

/// Placeholder substituted with the region in `base_url`.
pub const REGION_PLACEHOLDER: &str = "{region}";

// ============================================================================
// API KEY
// ============================================================================

/// Remote credential, never printed.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    /// Wrap a credential.
    ///
    /// # Errors
    /// Returns error if the key is empty.
    pub fn new(key: String) -> TollgateResult<Self> {
        if key.is_empty() {
            return Err(TollgateError::Config(ConfigError::MissingRequired {
                field: "api_key".to_string(),
            }));
        }
        Ok(Self(SecretString::new(key.into())))
    }

    /// Expose the key value (only when building a request).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

// ============================================================================
// TOLLGATE CONFIGURATION
// ============================================================================

/// Configuration for the store, limiters and remote calls.
#[derive(Debug, Clone)]
pub struct TollgateConfig {
    /// Path of the SQLite database file.
    pub database_path: PathBuf,

    /// Credential sent with every remote call.
    pub api_key: Option<ApiKey>,

    /// Remote base URL; `{region}` is replaced with the lowercase region.
    pub base_url: String,

    /// Header carrying the credential.
    pub credential_header: String,

    /// Per-call timeout for remote requests.
    pub request_timeout: Duration,

    /// Buffer added to every limiter wait to absorb clock skew.
    pub margin_of_error: Duration,

    /// Minimum time between credential-level quota refreshes. Zero refreshes
    /// on every response.
    pub credential_refresh_cooldown: Duration,

    /// Minimum time between operation-level quota refreshes.
    pub operation_refresh_cooldown: Duration,

    /// Whether a region's window evaluation and wait hold the region lock.
    pub serialize_regions: bool,

    /// Regions a caller may target. Empty accepts any region.
    pub known_regions: Vec<Region>,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("tollgate.db"),
            api_key: None,
            base_url: "https://{region}.api.riotgames.com".to_string(),
            credential_header: "X-Riot-Token".to_string(),
            request_timeout: Duration::from_secs(10),
            margin_of_error: Duration::from_millis(50),
            credential_refresh_cooldown: Duration::ZERO,
            operation_refresh_cooldown: Duration::from_secs(3600),
            serialize_regions: true,
            known_regions: DEFAULT_REGIONS.iter().map(|r| Region::new(*r)).collect(),
        }
    }
}

impl TollgateConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create TollgateConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TOLLGATE_DATABASE_PATH`: SQLite file (default: tollgate.db)
    /// - `TOLLGATE_API_KEY`: remote credential
    /// - `TOLLGATE_BASE_URL`: base URL containing `{region}`
    /// - `TOLLGATE_CREDENTIAL_HEADER`: credential header name (default: X-Riot-Token)
    /// - `TOLLGATE_REQUEST_TIMEOUT_SECS`: per-call timeout (default: 10)
    /// - `TOLLGATE_MARGIN_OF_ERROR_MS`: extra limiter wait (default: 50)
    /// - `TOLLGATE_CREDENTIAL_REFRESH_SECS`: credential quota refresh cooldown (default: 0)
    /// - `TOLLGATE_OPERATION_REFRESH_SECS`: operation quota refresh cooldown (default: 3600)
    /// - `TOLLGATE_SERIALIZE_REGIONS`: "true" or "false" (default: true)
    /// - `TOLLGATE_REGIONS`: comma-separated region allow-list
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let database_path = std::env::var("TOLLGATE_DATABASE_PATH")
            .ok()
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let api_key = std::env::var("TOLLGATE_API_KEY")
            .ok()
            .and_then(|key| ApiKey::new(key).ok());

        let base_url = std::env::var("TOLLGATE_BASE_URL").unwrap_or(defaults.base_url);

        let credential_header =
            std::env::var("TOLLGATE_CREDENTIAL_HEADER").unwrap_or(defaults.credential_header);

        let request_timeout = env_u64("TOLLGATE_REQUEST_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        let margin_of_error = env_u64("TOLLGATE_MARGIN_OF_ERROR_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.margin_of_error);

        let credential_refresh_cooldown = env_u64("TOLLGATE_CREDENTIAL_REFRESH_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.credential_refresh_cooldown);

        let operation_refresh_cooldown = env_u64("TOLLGATE_OPERATION_REFRESH_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.operation_refresh_cooldown);

        let serialize_regions = std::env::var("TOLLGATE_SERIALIZE_REGIONS")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let known_regions = std::env::var("TOLLGATE_REGIONS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(Region::new)
                    .collect()
            })
            .unwrap_or(defaults.known_regions);

        Self {
            database_path,
            api_key,
            base_url,
            credential_header,
            request_timeout,
            margin_of_error,
            credential_refresh_cooldown,
            operation_refresh_cooldown,
            serialize_regions,
            known_regions,
        }
    }

    pub fn with_api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_margin_of_error(mut self, margin: Duration) -> Self {
        self.margin_of_error = margin;
        self
    }

    pub fn with_refresh_cooldowns(mut self, credential: Duration, operation: Duration) -> Self {
        self.credential_refresh_cooldown = credential;
        self.operation_refresh_cooldown = operation;
        self
    }

    /// Accept any region.
    pub fn with_any_region(mut self) -> Self {
        self.known_regions.clear();
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - request_timeout is positive
    /// - base_url contains the `{region}` placeholder and an http(s) scheme
    /// - credential_header is not empty
    pub fn validate(&self) -> TollgateResult<()> {
        if self.request_timeout.is_zero() {
            return Err(TollgateError::Config(ConfigError::InvalidValue {
                field: "request_timeout".to_string(),
                value: format!("{:?}", self.request_timeout),
                reason: "request_timeout must be positive".to_string(),
            }));
        }

        if !self.base_url.contains(REGION_PLACEHOLDER) {
            return Err(TollgateError::Config(ConfigError::InvalidValue {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
                reason: format!("base_url must contain {}", REGION_PLACEHOLDER),
            }));
        }

        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            return Err(TollgateError::Config(ConfigError::InvalidValue {
                field: "base_url".to_string(),
                value: self.base_url.clone(),
                reason: "base_url must be an http(s) url".to_string(),
            }));
        }

        if self.credential_header.trim().is_empty() {
            return Err(TollgateError::Config(ConfigError::InvalidValue {
                field: "credential_header".to_string(),
                value: self.credential_header.clone(),
                reason: "credential_header must not be empty".to_string(),
            }));
        }

        Ok(())
    }

    /// Check that `region` may be targeted.
    pub fn check_region(&self, region: &Region) -> TollgateResult<()> {
        if self.known_regions.is_empty() || self.known_regions.contains(region) {
            return Ok(());
        }
        Err(TollgateError::Config(ConfigError::UnknownRegion {
            region: region.to_string(),
        }))
    }

    /// Base URL for `region`.
    pub fn region_url(&self, region: &Region) -> String {
        self.base_url.replace(REGION_PLACEHOLDER, region.as_str())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

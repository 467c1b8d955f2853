//! Error types for Tollgate operations

use std::fmt;
use thiserror::Error;

/// Failures reported by the remote provider.
///
/// Each kind maps 1:1 onto a provider status code. `Other` carries any
/// status the table does not name so the request still fails with the
/// raw code instead of being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    DataNotFound,
    MethodNotAllowed,
    UnsupportedMediaType,
    RateLimitExceeded,
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    Other(u16),
}

impl ProviderErrorKind {
    /// Map a provider status code onto its error kind.
    ///
    /// Returns `None` for success codes (2xx), which are not errors.
    pub fn from_status(status: u16) -> Option<Self> {
        let kind = match status {
            200..=299 => return None,
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::DataNotFound,
            405 => Self::MethodNotAllowed,
            415 => Self::UnsupportedMediaType,
            429 => Self::RateLimitExceeded,
            500 => Self::InternalServerError,
            502 => Self::BadGateway,
            503 => Self::ServiceUnavailable,
            504 => Self::GatewayTimeout,
            other => Self::Other(other),
        };
        Some(kind)
    }

    /// The provider status code for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::DataNotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::UnsupportedMediaType => 415,
            Self::RateLimitExceeded => 429,
            Self::InternalServerError => 500,
            Self::BadGateway => 502,
            Self::ServiceUnavailable => 503,
            Self::GatewayTimeout => 504,
            Self::Other(code) => *code,
        }
    }

    /// Human readable description of the status.
    pub fn description(&self) -> &'static str {
        match self {
            Self::BadRequest => "Bad request",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden => "Forbidden",
            Self::DataNotFound => "Data not found",
            Self::MethodNotAllowed => "Method not allowed",
            Self::UnsupportedMediaType => "Unsupported media type",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::InternalServerError => "Internal server error",
            Self::BadGateway => "Bad gateway",
            Self::ServiceUnavailable => "Service unavailable",
            Self::GatewayTimeout => "Gateway timeout",
            Self::Other(_) => "Unexpected status",
        }
    }

    /// True for 5xx statuses, where the provider rather than the caller failed.
    pub fn is_server_side(&self) -> bool {
        self.status_code() >= 500
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.status_code())
    }
}

/// A provider-side error together with the message the server sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("SQLite operation failed on {table}: {reason}")]
    Sqlite { table: String, reason: String },

    #[error("Failed to open database at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Failed to serialize field {field}: {reason}")]
    Serialization { field: String, reason: String },

    #[error("Failed to deserialize field {field}: {reason}")]
    Deserialization { field: String, reason: String },

    #[error("Field {field} missing from record")]
    MissingField { field: String },

    #[error("Type mismatch on {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Caller errors in a store query, rejected before any I/O.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown field {field} on {table}")]
    UnknownField { table: String, field: String },

    #[error("Key field {field} not supplied for {table}")]
    MissingKey { table: String, field: String },

    #[error("Malformed query: {reason}")]
    Malformed { reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unknown region: {region}")]
    UnknownRegion { region: String },
}

/// Master error type for all Tollgate errors.
#[derive(Debug, Clone, Error)]
pub enum TollgateError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Decode error: {reason}")]
    Decode { reason: String },
}

impl TollgateError {
    /// The provider error kind, if this failure came from the provider.
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider(err) => Some(err.kind),
            _ => None,
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}

/// Result type alias for Tollgate operations.
pub type TollgateResult<T> = Result<T, TollgateError>;

// =============================================================================
// TESTS
// =============================================================================

//! Tollgate Limiter - Windowed Rate Limiting
//!
//! Two tiers of limiters pace calls to the remote provider: one
//! credential-level limiter shared by every operation, and one limiter per
//! operation. Each is partitioned by region with its own lock, and adapts
//! its windows from the quota headers the provider returns.

pub mod quota;
pub mod rate_limit;
pub mod window;

pub use quota::{
    parse_rules, QuotaHeaders, QuotaRule, APP_RATE_LIMIT, APP_RATE_LIMIT_COUNT,
    METHOD_RATE_LIMIT, METHOD_RATE_LIMIT_COUNT,
};
pub use rate_limit::{LimiterSettings, Limiters, RateLimiter};
pub use window::{Admission, BatchAdmission, Window};

//! Tollgate Fetch - Get-or-Fetch Orchestration
//!
//! Combines the record store and the rate limiters into one request flow
//! shared by every entity type: serve a fresh stored copy, otherwise wait
//! for quota, call the provider, persist and serve.

pub mod fetchable;
pub mod fetched;
pub mod orchestrator;
pub mod remote;
pub mod stats;
pub mod telemetry;

pub use fetchable::Fetchable;
pub use fetched::Fetched;
pub use orchestrator::FetchOrchestrator;
pub use remote::{HttpRemote, RemoteCall, RemoteRequest, RemoteResponse};
pub use stats::FetchStats;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};

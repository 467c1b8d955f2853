//! Remote call contract and the reqwest-backed provider client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tollgate_core::{
    ApiKey, ProviderError, ProviderErrorKind, Region, TollgateConfig, TollgateError,
    TollgateResult,
};
use tollgate_limiter::QuotaHeaders;

/// One outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub region: Region,
    /// Path below the region's base URL, starting with `/`.
    pub path: String,
}

/// Raw provider response plus its quota metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub quota: QuotaHeaders,
}

impl RemoteResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            quota: QuotaHeaders::default(),
        }
    }

    pub fn with_quota(mut self, quota: QuotaHeaders) -> Self {
        self.quota = quota;
        self
    }

    /// Decode the body, failing on provider error envelopes and error
    /// statuses.
    ///
    /// A body of the form `{"status": {"status_code": 404, "message": ...}}`
    /// is a provider error whatever the HTTP status, unless the envelope's
    /// own code is 2xx; such a body is payload. A non-2xx status with any
    /// other body maps through the same status table.
    pub fn into_payload(self) -> TollgateResult<serde_json::Value> {
        let parsed = serde_json::from_slice::<serde_json::Value>(&self.body);

        if let Ok(value) = &parsed {
            if let Some(envelope) = ErrorEnvelope::extract(value).filter(ErrorEnvelope::is_error) {
                let kind = ProviderErrorKind::from_status(envelope.status_code)
                    .unwrap_or(ProviderErrorKind::Other(envelope.status_code));
                return Err(ProviderError::new(kind, envelope.message).into());
            }
        }

        if let Some(kind) = ProviderErrorKind::from_status(self.status) {
            let message = String::from_utf8_lossy(&self.body).trim().to_string();
            return Err(ProviderError::new(kind, message).into());
        }

        parsed.map_err(|e| TollgateError::decode(format!("payload is not JSON: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    status_code: u16,
    #[serde(default)]
    message: String,
}

impl ErrorEnvelope {
    fn extract(value: &serde_json::Value) -> Option<Self> {
        let status = value.get("status")?;
        status.get("status_code")?;
        serde_json::from_value(status.clone()).ok()
    }

    fn is_error(&self) -> bool {
        !(200..300).contains(&self.status_code)
    }
}

/// Performs the remote request for the orchestrator.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    async fn call(&self, request: &RemoteRequest) -> TollgateResult<RemoteResponse>;
}

/// Provider client over HTTP.
pub struct HttpRemote {
    client: Client,
    base_url: String,
    credential_header: String,
    api_key: Option<ApiKey>,
}

impl HttpRemote {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error if the configuration is invalid, or a
    /// transport error if the HTTP client cannot be built.
    pub fn new(config: &TollgateConfig) -> TollgateResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TollgateError::transport(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            credential_header: config.credential_header.clone(),
            api_key: config.api_key.clone(),
        })
    }

    /// Full URL for a request.
    pub fn url(&self, request: &RemoteRequest) -> String {
        format!(
            "{}{}",
            self.base_url
                .replace(tollgate_core::REGION_PLACEHOLDER, request.region.as_str()),
            request.path
        )
    }
}

#[async_trait]
impl RemoteCall for HttpRemote {
    async fn call(&self, request: &RemoteRequest) -> TollgateResult<RemoteResponse> {
        let url = self.url(request);
        tracing::debug!(region = %request.region, url = %url, "-> REQUEST");

        let mut builder = self.client.get(&url);
        if let Some(key) = &self.api_key {
            builder = builder.header(self.credential_header.as_str(), key.expose());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TollgateError::transport(format!("HTTP request failed: {}", e)))?;

        let status = response.status().as_u16();
        let quota = QuotaHeaders::from_lookup(|name| {
            response
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
        });
        let body = response
            .bytes()
            .await
            .map_err(|e| TollgateError::transport(format!("Failed to read response: {}", e)))?
            .to_vec();

        tracing::debug!(region = %request.region, status, bytes = body.len(), "<- RESPONSE");
        Ok(RemoteResponse {
            status,
            body,
            quota,
        })
    }
}

impl std::fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .field("credential_header", &self.credential_header)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_passes_through() {
        let payload = RemoteResponse::new(200, r#"{"id":42,"name":"x"}"#)
            .into_payload()
            .expect("valid payload");
        assert_eq!(payload["id"], 42);
    }

    #[test]
    fn test_envelope_maps_to_provider_error() {
        let body = r#"{"status":{"status_code":404,"message":"Data not found"}}"#;
        let err = RemoteResponse::new(200, body)
            .into_payload()
            .expect_err("envelope is an error");
        match err {
            TollgateError::Provider(e) => {
                assert_eq!(e.kind, ProviderErrorKind::DataNotFound);
                assert_eq!(e.message, "Data not found");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_envelope_code_is_kept() {
        let body = r#"{"status":{"status_code":418,"message":"teapot"}}"#;
        let err = RemoteResponse::new(418, body).into_payload().expect_err("error");
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Other(418)));
    }

    #[test]
    fn test_success_envelope_is_payload() {
        let body = r#"{"status":{"status_code":200,"message":"OK"}}"#;
        let payload = RemoteResponse::new(200, body)
            .into_payload()
            .expect("2xx envelope is not an error");
        assert_eq!(payload["status"]["status_code"], 200);
    }

    #[test]
    fn test_error_status_without_envelope() {
        let err = RemoteResponse::new(503, "upstream down")
            .into_payload()
            .expect_err("error status");
        assert_eq!(err.provider_kind(), Some(ProviderErrorKind::ServiceUnavailable));
    }

    #[test]
    fn test_status_field_without_code_is_payload() {
        // Service-status pages carry a plain "status" string.
        let payload = RemoteResponse::new(200, r#"{"status":"online"}"#)
            .into_payload()
            .expect("not an envelope");
        assert_eq!(payload["status"], "online");
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        let err = RemoteResponse::new(200, "<html>").into_payload().expect_err("bad json");
        assert!(matches!(err, TollgateError::Decode { .. }));
    }

    #[test]
    fn test_url_substitutes_region() {
        let config = TollgateConfig::default();
        let remote = HttpRemote::new(&config).expect("valid config");
        let url = remote.url(&RemoteRequest {
            region: Region::new("EUW1"),
            path: "/lol/status/v3/shard-data".to_string(),
        });
        assert_eq!(url, "https://euw1.api.riotgames.com/lol/status/v3/shard-data");
        assert!(!format!("{:?}", remote).contains("RGAPI"));
    }
}

//! HTTP transport for the upstream REST API.
//!
//! One pooled reqwest client shared by all calls. Each request attaches
//! credentials from the [`Authenticator`], applies the per-request
//! timeout, and retries transient failures with exponential backoff —
//! but only for requests the caller marked idempotent-safe.

use std::time::Duration;

use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::auth::Authenticator;
use super::error::{ApiError, ApiResult};

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Initial backoff duration.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier per attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Backoff duration for a given (zero-based) attempt.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        std::cmp::min(Duration::from_millis(backoff_ms as u64), self.max_backoff)
    }
}

/// Pooled, authenticated HTTP transport against the upstream API root.
pub struct UpstreamTransport {
    client: reqwest::Client,
    api_base: Url,
    auth: Authenticator,
    retry: RetryConfig,
}

impl UpstreamTransport {
    /// `api_base` is the versioned API root, e.g. `https://host/api/v2/`.
    ///
    /// With `verify_ssl` disabled a TLS session is still negotiated; only
    /// peer validation is skipped.
    pub fn new(
        api_base: Url,
        auth: Authenticator,
        retry: RetryConfig,
        request_timeout: Duration,
        verify_ssl: bool,
    ) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(!verify_ssl)
            .build()?;

        Ok(Self {
            client,
            api_base,
            auth,
            retry,
        })
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub fn auth(&self) -> &Authenticator {
        &self.auth
    }

    /// Resolve an endpoint path (e.g. `/firewall/rule`) against the API root.
    ///
    /// Some tools accept caller-supplied endpoint paths; the resolved URL
    /// must stay under the configured API root.
    pub fn endpoint_url(&self, endpoint: &str) -> ApiResult<Url> {
        let relative = endpoint.trim_start_matches('/');
        let url = self.api_base.join(relative)?;
        if url.host_str() != self.api_base.host_str()
            || !url.path().starts_with(self.api_base.path())
        {
            return Err(ApiError::configuration(format!(
                "endpoint {endpoint:?} escapes the API root"
            )));
        }
        Ok(url)
    }

    /// Issue one request. `idempotent` marks the call retry-safe; GETs are
    /// always idempotent, mutations only when the caller says so.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        idempotent: bool,
    ) -> ApiResult<Value> {
        let url = self.endpoint_url(endpoint)?;
        self.request_url(method, url, query, body, idempotent).await
    }

    /// Issue one request against an absolute URL (already validated by the
    /// link checker when it came from a HATEOAS response).
    pub async fn request_url(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Value>,
        idempotent: bool,
    ) -> ApiResult<Value> {
        let mut attempt: u32 = 0;

        loop {
            // Re-ensure per attempt so a token refreshed mid-retry is used.
            let auth_headers = self.auth.ensure_valid(&self.client).await?;

            let mut builder = self.client.request(method.clone(), url.clone());
            if !query.is_empty() {
                builder = builder.query(query);
            }
            for (name, value) in &auth_headers {
                builder = builder.header(*name, value);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            debug!(method = %method, url = %url, attempt, "upstream request");

            match builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        let text = response.text().await.map_err(ApiError::from)?;
                        if text.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return serde_json::from_str(&text).map_err(ApiError::from);
                    }

                    // Credential rejections are final, never retried.
                    if status == 401 || status == 403 {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ApiError::from_response(status, &body));
                    }

                    let retryable = status >= 500 || status == 429;
                    if retryable && idempotent && attempt < self.retry.max_retries {
                        let backoff = self.retry.backoff_for_attempt(attempt);
                        warn!(
                            status,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis(),
                            "upstream request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    if status == 429 {
                        return Err(ApiError::RateLimited {
                            retry_after_secs: None,
                        });
                    }
                    if status >= 500 {
                        return Err(ApiError::UpstreamUnavailable(format!(
                            "upstream returned status {status} after {} attempt(s)",
                            attempt + 1
                        )));
                    }
                    return Err(ApiError::from_response(status, &body));
                }
                Err(e) => {
                    let transient = e.is_timeout() || e.is_connect();
                    if transient && idempotent && attempt < self.retry.max_retries {
                        let backoff = self.retry.backoff_for_attempt(attempt);
                        warn!(
                            error = %e,
                            attempt = attempt + 1,
                            backoff_ms = backoff.as_millis(),
                            "network error, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        continue;
                    }
                    if transient {
                        return Err(ApiError::UpstreamUnavailable(e.to_string()));
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{AuthMethod, Credentials, JwtOptions};
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport(server: &MockServer, retry: RetryConfig) -> UpstreamTransport {
        let api_base = Url::parse(&format!("{}/api/v2/", server.uri())).unwrap();
        let auth = Authenticator::new(
            AuthMethod::ApiKey,
            Credentials {
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            JwtOptions::default(),
            &api_base,
        )
        .unwrap();
        UpstreamTransport::new(api_base, auth, retry, Duration::from_secs(5), true).unwrap()
    }

    #[test]
    fn test_backoff_calculation() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_for_attempt(0), Duration::from_millis(100));
        assert_eq!(retry.backoff_for_attempt(1), Duration::from_millis(200));
        assert_eq!(retry.backoff_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_capped() {
        let retry = RetryConfig {
            max_backoff: Duration::from_millis(500),
            ..Default::default()
        };
        assert_eq!(retry.backoff_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn test_endpoint_url_join() {
        let api_base = Url::parse("https://firewall.local/api/v2/").unwrap();
        let auth = Authenticator::new(
            AuthMethod::ApiKey,
            Credentials {
                api_key: Some("k".to_string()),
                ..Default::default()
            },
            JwtOptions::default(),
            &api_base,
        )
        .unwrap();
        let transport = UpstreamTransport::new(
            api_base,
            auth,
            RetryConfig::no_retry(),
            Duration::from_secs(5),
            true,
        )
        .unwrap();
        assert_eq!(
            transport.endpoint_url("/firewall/rule").unwrap().as_str(),
            "https://firewall.local/api/v2/firewall/rule"
        );
        assert_eq!(
            transport.endpoint_url("status/system").unwrap().as_str(),
            "https://firewall.local/api/v2/status/system"
        );
    }

    #[test]
    fn test_endpoint_url_rejects_escapes() {
        let api_base = Url::parse("https://firewall.local/api/v2/").unwrap();
        let auth = Authenticator::new(
            AuthMethod::ApiKey,
            Credentials {
                api_key: Some("k".to_string()),
                ..Default::default()
            },
            JwtOptions::default(),
            &api_base,
        )
        .unwrap();
        let transport = UpstreamTransport::new(
            api_base,
            auth,
            RetryConfig::no_retry(),
            Duration::from_secs(5),
            true,
        )
        .unwrap();
        assert!(transport.endpoint_url("http://evil.example.net/x").is_err());
        assert!(transport.endpoint_url("../../admin").is_err());
    }

    #[tokio::test]
    async fn test_get_attaches_api_key_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/interface"))
            .and(header("X-API-Key", "test-key"))
            .and(query_param("status", "up"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport(&server, RetryConfig::no_retry());
        let result = transport
            .request(
                Method::GET,
                "/status/interface",
                &[("status".to_string(), "up".to_string())],
                None,
                true,
            )
            .await
            .unwrap();
        assert_eq!(result, json!({"data": []}));
    }

    #[tokio::test]
    async fn test_retries_5xx_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"uptime": 1}})))
            .expect(1)
            .mount(&server)
            .await;

        let retry = RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let transport = transport(&server, retry);
        let result = transport
            .request(Method::GET, "/status/system", &[], None, true)
            .await
            .unwrap();
        assert_eq!(result["data"]["uptime"], json!(1));
    }

    #[tokio::test]
    async fn test_5xx_exhaustion_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let retry = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let transport = transport(&server, retry);
        let err = transport
            .request(Method::GET, "/status/system", &[], None, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn test_non_idempotent_5xx_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/firewall/rule"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;

        let retry = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let transport = transport(&server, retry);
        let err = transport
            .request(
                Method::POST,
                "/firewall/rule",
                &[],
                Some(&json!({"type": "block"})),
                false,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn test_401_fails_immediately_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "bad key"})))
            .expect(1)
            .mount(&server)
            .await;

        let retry = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(1),
            ..Default::default()
        };
        let transport = transport(&server, retry);
        let err = transport
            .request(Method::GET, "/status/system", &[], None, true)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "authentication_error");
    }

    #[tokio::test]
    async fn test_4xx_surfaces_upstream_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/firewall/rule"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "no such object"})),
            )
            .mount(&server)
            .await;

        let transport = transport(&server, RetryConfig::no_retry());
        let err = transport
            .request(Method::GET, "/firewall/rule", &[], None, true)
            .await
            .unwrap_err();
        match err {
            ApiError::Upstream { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such object");
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_body_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v2/firewall/rule/3"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transport = transport(&server, RetryConfig::no_retry());
        let result = transport
            .request(Method::DELETE, "/firewall/rule/3", &[], None, false)
            .await
            .unwrap();
        assert_eq!(result, Value::Null);
    }
}

//! Upstream API client layer.
//!
//! ## Architecture
//!
//! - `query` - filter/sort/pagination/control parameter model
//! - `filter` / `page` - local query engine over JSON records
//! - `auth` - credential schemes and explicit JWT refresh
//! - `transport` - pooled reqwest client with retry/backoff
//! - `envelope` - uniform response envelope and HATEOAS links
//! - `cache` - TTL read-through cache for read endpoints
//! - `error` - error taxonomy with stable kind strings
//!
//! [`FirewallClient`] ties these together: it resolves endpoints against
//! the versioned API root, attaches credentials, pushes queries upstream
//! when the deployment supports server-side filtering and falls back to
//! the local engine when it does not.

pub mod auth;
pub mod cache;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod page;
pub mod query;
pub mod transport;

use std::collections::BTreeMap;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::core::config::UpstreamConfig;

use auth::Authenticator;
use cache::ResponseCache;
use envelope::{extract_links, validate_link};
use error::ApiResult;
use page::QueryResult;
use query::{ControlParameters, QueryFilter, QuerySpec};
use transport::UpstreamTransport;

/// Well-known upstream endpoint paths.
pub mod endpoints {
    pub const STATUS_SYSTEM: &str = "/status/system";
    pub const STATUS_INTERFACE: &str = "/status/interface";
    pub const FIREWALL_RULE: &str = "/firewall/rule";
    pub const FIREWALL_APPLY: &str = "/firewall/apply";
    pub const FIREWALL_ALIAS: &str = "/firewall/alias";
    pub const LOG_FIREWALL: &str = "/diagnostics/log/firewall";
    pub const DHCP_LEASE: &str = "/services/dhcpd/lease";
    pub const RESTAPI_SETTINGS: &str = "/system/restapi/settings";
}

/// Result of a list query: one page of records, the full set size, and
/// any navigation links the upstream attached.
#[derive(Debug, Clone)]
pub struct ListOutcome {
    pub items: Vec<Value>,
    pub total_results: usize,
    pub links: BTreeMap<String, String>,
}

/// High-level client for the firewall's REST API.
pub struct FirewallClient {
    transport: UpstreamTransport,
    cache: ResponseCache,
    base_url: Url,
    enable_hateoas: bool,
    server_side_queries: bool,
}

impl FirewallClient {
    pub fn new(config: &UpstreamConfig) -> ApiResult<Self> {
        let base_url = config.url.clone();
        let api_base = base_url.join("api/v2/")?;
        let auth = Authenticator::new(
            config.auth_method,
            config.credentials.clone(),
            config.jwt.clone(),
            &api_base,
        )?;
        let transport = UpstreamTransport::new(
            api_base,
            auth,
            config.retry.clone(),
            config.request_timeout,
            config.verify_ssl,
        )?;

        Ok(Self {
            transport,
            cache: ResponseCache::new(config.cache_ttl),
            base_url,
            enable_hateoas: config.enable_hateoas,
            server_side_queries: config.server_side_queries,
        })
    }

    /// The upstream host root (no API prefix), used for link validation.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn hateoas_enabled(&self) -> bool {
        self.enable_hateoas
    }

    /// GET an endpoint through the cache, returning the raw payload.
    pub async fn get(&self, endpoint: &str) -> ApiResult<Value> {
        self.get_with_params(endpoint, Vec::new()).await
    }

    async fn get_with_params(
        &self,
        endpoint: &str,
        mut params: Vec<(String, String)>,
    ) -> ApiResult<Value> {
        if self.enable_hateoas {
            params.push(("hateoas".to_string(), "true".to_string()));
        }
        let query_string = serde_urlencoded::to_string(&params).unwrap_or_default();
        let key = ResponseCache::key(endpoint, &query_string);

        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let payload = self
            .transport
            .request(Method::GET, endpoint, &params, None, true)
            .await?;
        self.cache.insert(key, payload.clone()).await;
        Ok(payload)
    }

    /// Run a list query against an endpoint.
    ///
    /// When the upstream supports server-side queries the spec is pushed
    /// down as query parameters and the returned page is used as-is.
    /// Otherwise the full collection is fetched (read-through cached) and
    /// the local engine filters, sorts, and slices it, which also yields
    /// an exact `total_results`.
    pub async fn query(&self, endpoint: &str, spec: &QuerySpec) -> ApiResult<ListOutcome> {
        if self.server_side_queries {
            let payload = self
                .get_with_params(endpoint, spec.to_query_params())
                .await?;
            let items = data_array(&payload);
            let total_results = items.len();
            return Ok(ListOutcome {
                items,
                total_results,
                links: extract_links(&payload),
            });
        }

        debug!(endpoint, "evaluating query locally");
        let payload = self.get(endpoint).await?;
        let records = data_array(&payload);
        let QueryResult {
            items,
            total_results,
        } = page::apply(
            &records,
            &spec.filters,
            spec.sort.as_ref(),
            spec.pagination.as_ref(),
        )?;
        Ok(ListOutcome {
            items,
            total_results,
            links: extract_links(&payload),
        })
    }

    /// Re-query an endpoint bypassing the cache; object IDs are dynamic
    /// upstream, so this is how callers resync after mutations.
    pub async fn refresh(&self, endpoint: &str) -> ApiResult<Value> {
        self.cache.invalidate_endpoint(endpoint).await;
        self.get(endpoint).await
    }

    /// Find a single object by field value, the ID-drift-safe lookup.
    pub async fn find_object_by_field(
        &self,
        endpoint: &str,
        field: &str,
        value: impl Into<Value>,
    ) -> ApiResult<Option<Value>> {
        let spec = QuerySpec::new().filter(QueryFilter::exact(field, value));
        let outcome = self.query(endpoint, &spec).await?;
        Ok(outcome.items.into_iter().next())
    }

    /// Issue a mutation. Mutations bypass the cache and are never retried
    /// unless `idempotent_safe` is set by the caller.
    pub async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        control: &ControlParameters,
        idempotent_safe: bool,
    ) -> ApiResult<Value> {
        control.validate()?;
        let mut params = control.to_params();
        if self.enable_hateoas {
            params.push(("hateoas".to_string(), "true".to_string()));
        }
        self.transport
            .request(method, endpoint, &params, body, idempotent_safe)
            .await
    }

    pub async fn create(
        &self,
        endpoint: &str,
        body: &Value,
        control: &ControlParameters,
    ) -> ApiResult<Value> {
        self.mutate(Method::POST, endpoint, Some(body), control, false)
            .await
    }

    pub async fn update(
        &self,
        endpoint: &str,
        id: u64,
        body: &Value,
        control: &ControlParameters,
    ) -> ApiResult<Value> {
        let path = format!("{endpoint}/{id}");
        self.mutate(Method::PATCH, &path, Some(body), control, false)
            .await
    }

    pub async fn delete(
        &self,
        endpoint: &str,
        id: u64,
        control: &ControlParameters,
    ) -> ApiResult<Value> {
        let path = format!("{endpoint}/{id}");
        self.mutate(Method::DELETE, &path, None, control, false)
            .await
    }

    /// Apply staged firewall changes.
    pub async fn apply_changes(&self) -> ApiResult<Value> {
        self.mutate(
            Method::POST,
            endpoints::FIREWALL_APPLY,
            None,
            &ControlParameters::default(),
            false,
        )
        .await
    }

    /// Follow a previously emitted navigation link. The link must resolve
    /// to the configured upstream origin; anything else is refused before
    /// a request is issued.
    pub async fn follow_link(&self, link: &str) -> ApiResult<Value> {
        let url = validate_link(&self.base_url, link)?;
        self.transport
            .request_url(Method::GET, url, &[], None, true)
            .await
    }
}

/// Unwrap the upstream's `{"data": ...}` wrapper into a record list.
pub fn data_array(payload: &Value) -> Vec<Value> {
    match payload.get("data") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single.clone()],
    }
}

/// The upstream's payload body: the `data` member when present, the whole
/// payload otherwise.
pub fn extract_data(payload: &Value) -> Value {
    payload.get("data").cloned().unwrap_or_else(|| payload.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{AuthMethod, Credentials, JwtOptions};
    use crate::api::query::{PaginationOptions, SortOptions};
    use crate::api::transport::RetryConfig;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method as http_method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, server_side: bool, cache_ttl: Duration) -> FirewallClient {
        let config = UpstreamConfig {
            url: Url::parse(&server.uri()).unwrap(),
            auth_method: AuthMethod::ApiKey,
            credentials: Credentials {
                api_key: Some("test-key".to_string()),
                ..Default::default()
            },
            verify_ssl: true,
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig::no_retry(),
            jwt: JwtOptions::default(),
            enable_hateoas: false,
            server_side_queries: server_side,
            cache_ttl,
        };
        FirewallClient::new(&config).unwrap()
    }

    fn rule_fixture() -> Value {
        json!({
            "data": [
                {"id": 0, "interface": "wan", "type": "pass", "sequence": 20},
                {"id": 1, "interface": "lan", "type": "block", "sequence": 10},
                {"id": 2, "interface": "wan", "type": "block", "sequence": 30},
            ]
        })
    }

    #[tokio::test]
    async fn test_server_side_query_pushes_params() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/firewall/rule"))
            .and(query_param("interface", "wan"))
            .and(query_param("sort_by", "sequence"))
            .and(query_param("limit", "10"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rule_fixture()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, true, Duration::ZERO);
        let spec = QuerySpec::new()
            .filter(QueryFilter::exact("interface", "wan"))
            .sort(SortOptions::asc("sequence"))
            .paginate(PaginationOptions::new(10, 0));
        let outcome = client.query(endpoints::FIREWALL_RULE, &spec).await.unwrap();
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.total_results, 3);
    }

    #[tokio::test]
    async fn test_local_query_filters_sorts_and_counts() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/firewall/rule"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rule_fixture()))
            .mount(&server)
            .await;

        let client = client(&server, false, Duration::ZERO);
        let spec = QuerySpec::new()
            .filter(QueryFilter::exact("interface", "wan"))
            .sort(SortOptions::asc("sequence"))
            .paginate(PaginationOptions::new(1, 0));
        let outcome = client.query(endpoints::FIREWALL_RULE, &spec).await.unwrap();
        assert_eq!(outcome.total_results, 2);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0]["id"], json!(0));
    }

    #[tokio::test]
    async fn test_get_is_cached_within_ttl() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"cpu": 5}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, true, Duration::from_secs(60));
        let first = client.get(endpoints::STATUS_SYSTEM).await.unwrap();
        let second = client.get(endpoints::STATUS_SYSTEM).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/firewall/rule"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rule_fixture()))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server, true, Duration::from_secs(60));
        client.get(endpoints::FIREWALL_RULE).await.unwrap();
        client.refresh(endpoints::FIREWALL_RULE).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_object_by_field() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/firewall/alias"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": 4, "name": "blocklist", "type": "host"}]
            })))
            .mount(&server)
            .await;

        let client = client(&server, true, Duration::ZERO);
        let found = client
            .find_object_by_field(endpoints::FIREWALL_ALIAS, "name", "blocklist")
            .await
            .unwrap();
        assert_eq!(found.unwrap()["id"], json!(4));
    }

    #[tokio::test]
    async fn test_mutation_sends_control_params() {
        let server = MockServer::start().await;
        Mock::given(http_method("POST"))
            .and(path("/api/v2/firewall/rule"))
            .and(query_param("apply", "true"))
            .and(query_param("placement", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 9}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, true, Duration::ZERO);
        let control = ControlParameters {
            apply: true,
            placement: Some(0),
            ..Default::default()
        };
        let created = client
            .create(endpoints::FIREWALL_RULE, &json!({"type": "block"}), &control)
            .await
            .unwrap();
        assert_eq!(created["data"]["id"], json!(9));
    }

    #[tokio::test]
    async fn test_follow_link_rejects_foreign_host_without_request() {
        let server = MockServer::start().await;
        // Nothing mounted: any request would 404 and the expect below
        // asserts none arrive at all.
        Mock::given(http_method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server, true, Duration::ZERO);
        let err = client
            .follow_link("https://evil.example.net/api/v2/firewall/rule")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_link");
    }

    #[tokio::test]
    async fn test_follow_relative_link() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/firewall/rule"))
            .respond_with(ResponseTemplate::new(200).set_body_json(rule_fixture()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, true, Duration::ZERO);
        let payload = client.follow_link("/api/v2/firewall/rule").await.unwrap();
        assert_eq!(data_array(&payload).len(), 3);
    }

    #[test]
    fn test_data_array_shapes() {
        assert_eq!(data_array(&json!({"data": [1, 2]})).len(), 2);
        assert_eq!(data_array(&json!({"data": {"id": 1}})).len(), 1);
        assert!(data_array(&json!({"data": null})).is_empty());
        assert!(data_array(&json!({"message": "ok"})).is_empty());
    }
}

//! Tool dispatch: the guard path every invocation passes through.
//!
//! Order matters here. The permission check runs before anything that
//! could touch the network, so an underprivileged caller never causes an
//! upstream request. The rate limiter runs next for the same reason.
//! Whatever happens, exactly one audit event is emitted per dispatch.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use tracing::{info, warn};

use super::registry::{ToolContext, ToolRegistry};
use crate::api::envelope::Envelope;
use crate::api::error::{ApiError, ApiResult};
use crate::core::audit::{AuditEvent, AuditSink};
use crate::core::config::DispatchConfig;
use crate::core::security::SecurityContext;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Dispatches tool invocations against the registry.
pub struct Dispatcher {
    registry: ToolRegistry,
    ctx: ToolContext,
    security: SecurityContext,
    audit: Arc<dyn AuditSink>,
    limiter: Option<DirectRateLimiter>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        registry: ToolRegistry,
        ctx: ToolContext,
        security: SecurityContext,
        audit: Arc<dyn AuditSink>,
        config: DispatchConfig,
    ) -> Self {
        let limiter = NonZeroU32::new(config.rate_limit_per_minute)
            .map(|per_minute| RateLimiter::direct(Quota::per_minute(per_minute)));

        Self {
            registry,
            ctx,
            security,
            audit,
            limiter,
            config,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    /// Run one tool invocation and return its envelope. Never panics,
    /// never skips the audit record.
    pub async fn dispatch(&self, name: &str, args: Value) -> Envelope {
        let started = Instant::now();

        let envelope = match self.guarded_run(name, &args).await {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(tool = name, error = %error, "tool invocation failed");
                Envelope::fail(&error)
            }
        };

        let event = AuditEvent {
            timestamp: Utc::now(),
            user_id: self.security.user_id.clone(),
            access_level: self.security.access_level,
            tool: name.to_string(),
            parameters: args,
            result_summary: envelope.message.clone(),
            success: envelope.success,
            error: envelope.error.as_ref().map(|e| e.message.clone()),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.audit.record(event).await;

        envelope
    }

    async fn guarded_run(&self, name: &str, args: &Value) -> ApiResult<Envelope> {
        let tool = self
            .registry
            .get(name)
            .map_err(|e| ApiError::configuration(e.to_string()))?;

        let required = tool.min_access();
        if !self.security.access_level.permits(required) {
            return Err(ApiError::Permission {
                required,
                actual: self.security.access_level,
            });
        }

        if let Some(limiter) = &self.limiter {
            if let Err(not_until) = limiter.check() {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                return Err(ApiError::RateLimited {
                    retry_after_secs: Some(wait.as_secs().max(1)),
                });
            }
        }

        info!(tool = name, user = %self.security.user_id, "dispatching tool");

        tokio::time::timeout(self.config.invocation_timeout, tool.execute(&self.ctx, args.clone()))
            .await
            .map_err(|_| {
                ApiError::timeout(format!(
                    "invocation of {name:?} exceeded {}s",
                    self.config.invocation_timeout.as_secs()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::FirewallClient;
    use crate::api::auth::{AuthMethod, Credentials, JwtOptions};
    use crate::api::transport::RetryConfig;
    use crate::core::audit::MemoryAuditSink;
    use crate::core::config::{QueryConfig, UpstreamConfig};
    use crate::core::security::AccessLevel;
    use crate::domains::tools::registry::build_registry;
    use serde_json::json;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        dispatcher: Dispatcher,
        audit: Arc<MemoryAuditSink>,
    }

    fn harness(server: &MockServer, level: AccessLevel, dispatch: DispatchConfig) -> Harness {
        let upstream = UpstreamConfig {
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
            server_side_queries: true,
            cache_ttl: Duration::ZERO,
        };
        let client = Arc::new(FirewallClient::new(&upstream).unwrap());
        let audit = Arc::new(MemoryAuditSink::new());
        let dispatcher = Dispatcher::new(
            build_registry(),
            ToolContext {
                client,
                query: QueryConfig {
                    default_page_size: 20,
                    max_page_size: 100,
                },
            },
            SecurityContext::new("tester", level),
            audit.clone(),
            dispatch,
        );
        Harness { dispatcher, audit }
    }

    fn dispatch_config() -> DispatchConfig {
        DispatchConfig {
            user_id: "tester".to_string(),
            access_level: AccessLevel::ReadOnly,
            rate_limit_per_minute: 0,
            invocation_timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_permission_denied_makes_no_upstream_call() {
        let server = MockServer::start().await;
        // Any HTTP traffic at all fails the test.
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(&server, AccessLevel::ReadOnly, dispatch_config());
        let envelope = h
            .dispatcher
            .dispatch(
                "create_firewall_rule",
                json!({
                    "interface": "wan", "rule_type": "block", "protocol": "tcp",
                    "source": "10.0.0.1", "destination": "any"
                }),
            )
            .await;

        assert!(!envelope.success);
        assert_eq!(envelope.error.as_ref().unwrap().kind, "permission_error");

        // Exactly one failed audit event.
        let events = h.audit.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].tool, "create_firewall_rule");
    }

    #[tokio::test]
    async fn test_sufficient_access_reaches_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"uptime": 5}})))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server, AccessLevel::ReadOnly, dispatch_config());
        let envelope = h.dispatcher.dispatch("system_status", json!({})).await;
        assert!(envelope.success, "unexpected failure: {}", envelope.message);

        let events = h.audit.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_audited_failure() {
        let server = MockServer::start().await;
        let h = harness(&server, AccessLevel::EmergencyWrite, dispatch_config());
        let envelope = h.dispatcher.dispatch("reboot_appliance", json!({})).await;
        assert!(!envelope.success);
        assert_eq!(
            envelope.error.as_ref().unwrap().kind,
            "configuration_error"
        );
        assert_eq!(h.audit.events().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_before_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = dispatch_config();
        config.rate_limit_per_minute = 1;
        let h = harness(&server, AccessLevel::ReadOnly, config);

        let first = h.dispatcher.dispatch("system_status", json!({})).await;
        assert!(first.success);

        let second = h.dispatcher.dispatch("system_status", json!({})).await;
        assert!(!second.success);
        assert_eq!(second.error.as_ref().unwrap().kind, "rate_limited");
        assert_eq!(h.audit.events().len(), 2);
    }

    #[tokio::test]
    async fn test_invocation_timeout_surfaces_timeout_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/status/system"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {}}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut config = dispatch_config();
        config.invocation_timeout = Duration::from_millis(50);
        let h = harness(&server, AccessLevel::ReadOnly, config);

        let envelope = h.dispatcher.dispatch("system_status", json!({})).await;
        assert!(!envelope.success);
        assert_eq!(envelope.error.as_ref().unwrap().kind, "timeout");
    }

    #[tokio::test]
    async fn test_compliance_level_gates_log_tools() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(0)
            .mount(&server)
            .await;

        let h = harness(&server, AccessLevel::ReadOnly, dispatch_config());
        let envelope = h
            .dispatcher
            .dispatch("search_firewall_logs", json!({}))
            .await;
        assert_eq!(envelope.error.as_ref().unwrap().kind, "permission_error");
    }
}

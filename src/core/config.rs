//! Configuration management for the MCP server.
//!
//! One `Config` is built from environment variables at startup, validated,
//! and passed down explicitly; there are no ambient globals. Missing or
//! invalid required values abort startup with a descriptive error.

use std::time::Duration;

use tracing::{info, warn};
use url::Url;

use super::error::{Error, Result};
use super::security::AccessLevel;
use super::transport::TransportConfig;
use crate::api::auth::{AuthMethod, Credentials, JwtOptions};
use crate::api::transport::RetryConfig;

/// Main configuration for the server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Upstream firewall API connection.
    pub upstream: UpstreamConfig,

    /// Query bounds applied to every list tool.
    pub query: QueryConfig,

    /// Dispatch-level guards: caller identity, rate limit, time bound.
    pub dispatch: DispatchConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The name of the server as reported to clients.
    pub name: String,

    /// The version of the server.
    pub version: String,
}

/// Connection settings for the upstream firewall REST API.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Host root, e.g. `https://firewall.local`. The versioned API prefix
    /// is appended by the client.
    pub url: Url,

    pub auth_method: AuthMethod,
    pub credentials: Credentials,

    /// Verify the upstream TLS certificate. Disabling skips peer
    /// validation only; a TLS session is still negotiated.
    pub verify_ssl: bool,

    /// Per-request timeout.
    pub request_timeout: Duration,

    pub retry: RetryConfig,
    pub jwt: JwtOptions,

    /// Ask the upstream to attach navigation links, and attach our own.
    pub enable_hateoas: bool,

    /// Whether the upstream can evaluate filter/sort/pagination query
    /// parameters itself. Off for older API generations; queries are then
    /// evaluated locally over the full collection.
    pub server_side_queries: bool,

    /// TTL for the read-through response cache. Zero disables caching.
    pub cache_ttl: Duration,
}

/// Pagination bounds for list tools.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

/// Dispatch guards.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Identity reported in audit events.
    pub user_id: String,

    /// The deployment's access level; every invocation is checked
    /// against the tool's requirement.
    pub access_level: AccessLevel,

    /// Invocations allowed per minute. Zero disables rate limiting.
    pub rate_limit_per_minute: u32,

    /// Bound on a whole invocation including retries.
    pub invocation_timeout: Duration,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "firewall-mcp-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            upstream: UpstreamConfig::default(),
            query: QueryConfig {
                default_page_size: 20,
                max_page_size: 100,
            },
            dispatch: DispatchConfig {
                user_id: "mcp-client".to_string(),
                access_level: AccessLevel::ReadOnly,
                rate_limit_per_minute: 120,
                invocation_timeout: Duration::from_secs(60),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            transport: TransportConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: Url::parse("https://firewall.local").expect("static URL"),
            auth_method: AuthMethod::ApiKey,
            credentials: Credentials::default(),
            verify_ssl: true,
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            jwt: JwtOptions::default(),
            enable_hateoas: false,
            server_side_queries: true,
            cache_ttl: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and validate it.
    ///
    /// Firewall settings use the `FIREWALL_` prefix; server/transport
    /// settings keep the `MCP_` prefix.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("MCP_SERVER_NAME") {
            config.server.name = name;
        }
        if let Ok(level) = std::env::var("MCP_LOG_LEVEL") {
            config.logging.level = level;
        }
        config.transport = TransportConfig::from_env();

        let url = std::env::var("FIREWALL_URL")
            .map_err(|_| Error::config("FIREWALL_URL is required (e.g. https://firewall.local)"))?;
        config.upstream.url = Url::parse(&url)
            .map_err(|e| Error::config(format!("FIREWALL_URL {url:?} is not a valid URL: {e}")))?;

        if let Ok(method) = std::env::var("FIREWALL_AUTH_METHOD") {
            config.upstream.auth_method = method
                .parse()
                .map_err(|e| Error::config(format!("FIREWALL_AUTH_METHOD: {e}")))?;
        }
        config.upstream.credentials = Credentials {
            api_key: std::env::var("FIREWALL_API_KEY").ok(),
            username: std::env::var("FIREWALL_USERNAME").ok(),
            password: std::env::var("FIREWALL_PASSWORD").ok(),
        };

        if let Some(verify) = env_bool("FIREWALL_VERIFY_SSL") {
            config.upstream.verify_ssl = verify;
        }
        if let Some(secs) = env_u64("FIREWALL_REQUEST_TIMEOUT")? {
            config.upstream.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_u64("FIREWALL_MAX_RETRIES")? {
            config.upstream.retry.max_retries = retries as u32;
        }
        if let Some(secs) = env_u64("FIREWALL_JWT_LIFETIME")? {
            config.upstream.jwt.token_lifetime = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FIREWALL_JWT_SAFETY_MARGIN")? {
            config.upstream.jwt.safety_margin = Duration::from_secs(secs);
        }
        if let Some(enabled) = env_bool("FIREWALL_ENABLE_HATEOAS") {
            config.upstream.enable_hateoas = enabled;
        }
        if let Some(enabled) = env_bool("FIREWALL_SERVER_SIDE_QUERIES") {
            config.upstream.server_side_queries = enabled;
        }
        if let Some(secs) = env_u64("FIREWALL_CACHE_TTL")? {
            config.upstream.cache_ttl = Duration::from_secs(secs);
        }

        if let Some(size) = env_u64("FIREWALL_DEFAULT_PAGE_SIZE")? {
            config.query.default_page_size = size as usize;
        }
        if let Some(size) = env_u64("FIREWALL_MAX_PAGE_SIZE")? {
            config.query.max_page_size = size as usize;
        }

        if let Ok(user) = std::env::var("FIREWALL_USER_ID") {
            config.dispatch.user_id = user;
        }
        if let Ok(level) = std::env::var("FIREWALL_ACCESS_LEVEL") {
            config.dispatch.access_level = level
                .parse()
                .map_err(|e: String| Error::config(format!("FIREWALL_ACCESS_LEVEL: {e}")))?;
        }
        if let Some(limit) = env_u64("FIREWALL_RATE_LIMIT_PER_MINUTE")? {
            config.dispatch.rate_limit_per_minute = limit as u32;
        }
        if let Some(secs) = env_u64("FIREWALL_INVOCATION_TIMEOUT")? {
            config.dispatch.invocation_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation, run once at startup.
    pub fn validate(&self) -> Result<()> {
        let scheme = self.upstream.url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(Error::config(format!(
                "FIREWALL_URL must be http(s), got {scheme:?}"
            )));
        }
        if !self.upstream.verify_ssl {
            warn!("TLS peer validation is DISABLED for the upstream connection");
        }

        match self.upstream.auth_method {
            AuthMethod::ApiKey if self.upstream.credentials.api_key.is_none() => {
                return Err(Error::config("FIREWALL_API_KEY is required for api_key auth"));
            }
            AuthMethod::Basic | AuthMethod::Jwt
                if self.upstream.credentials.username.is_none()
                    || self.upstream.credentials.password.is_none() =>
            {
                return Err(Error::config(format!(
                    "FIREWALL_USERNAME and FIREWALL_PASSWORD are required for {} auth",
                    self.upstream.auth_method
                )));
            }
            _ => {}
        }

        if self.query.default_page_size == 0 || self.query.max_page_size == 0 {
            return Err(Error::config("page sizes must be positive"));
        }
        if self.query.default_page_size > self.query.max_page_size {
            return Err(Error::config(format!(
                "default page size {} exceeds maximum {}",
                self.query.default_page_size, self.query.max_page_size
            )));
        }
        if self.dispatch.invocation_timeout.is_zero() {
            return Err(Error::config("invocation timeout must be positive"));
        }

        info!(
            upstream = %self.upstream.url,
            auth = %self.upstream.auth_method,
            access_level = %self.dispatch.access_level,
            "configuration validated"
        );
        Ok(())
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{name} must be an integer, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.upstream.credentials.api_key = Some("key".to_string());
        config
    }

    #[test]
    fn test_default_config_missing_credentials_fails() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("FIREWALL_API_KEY"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_jwt_requires_username_password() {
        let mut config = Config::default();
        config.upstream.auth_method = AuthMethod::Jwt;
        config.upstream.credentials.username = Some("admin".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("FIREWALL_PASSWORD"));
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = valid_config();
        config.query.default_page_size = 500;
        config.query.max_page_size = 100;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.query.max_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let mut config = valid_config();
        config.upstream.url = Url::parse("ftp://firewall.local").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_invocation_timeout_rejected() {
        let mut config = valid_config();
        config.dispatch.invocation_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}

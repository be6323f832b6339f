//! Credential handling for the upstream API.
//!
//! Three schemes: API key header, HTTP basic, and JWT bearer. JWT tokens
//! are refreshed by an explicit `ensure_valid` step that runs before each
//! request, with its own timeout and failure path, rather than implicitly
//! inside the request itself.

use std::str::FromStr;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use super::error::{ApiError, ApiResult};

/// Supported upstream authentication schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMethod {
    #[default]
    ApiKey,
    Basic,
    Jwt,
}

impl FromStr for AuthMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "api_key" => Ok(Self::ApiKey),
            "basic" => Ok(Self::Basic),
            "jwt" => Ok(Self::Jwt),
            other => Err(ApiError::configuration(format!(
                "unknown auth method: {other:?} (expected api_key, basic, or jwt)"
            ))),
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey => f.write_str("api_key"),
            Self::Basic => f.write_str("basic"),
            Self::Jwt => f.write_str("jwt"),
        }
    }
}

/// Upstream credentials. Which fields are required depends on the method.
#[derive(Clone, Default)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Redact secrets from log output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// JWT refresh behavior.
#[derive(Debug, Clone)]
pub struct JwtOptions {
    /// Assumed token validity from issuance; the upstream does not report
    /// an expiry in its token response.
    pub token_lifetime: Duration,
    /// Refresh when the token expires within this margin of now.
    pub safety_margin: Duration,
    /// Timeout for the refresh call itself, independent of request timeout.
    pub refresh_timeout: Duration,
}

impl Default for JwtOptions {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(3600),
            safety_margin: Duration::from_secs(60),
            refresh_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct TokenState {
    token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    data: TokenData,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
}

/// Produces request headers for the configured scheme, refreshing JWT
/// state as needed.
#[derive(Debug)]
pub struct Authenticator {
    method: AuthMethod,
    credentials: Credentials,
    jwt: JwtOptions,
    auth_url: Url,
    token: RwLock<Option<TokenState>>,
}

impl Authenticator {
    /// `api_base` is the versioned API root, e.g. `https://host/api/v2/`.
    pub fn new(
        method: AuthMethod,
        credentials: Credentials,
        jwt: JwtOptions,
        api_base: &Url,
    ) -> ApiResult<Self> {
        let auth_url = api_base.join("auth/jwt")?;
        let authenticator = Self {
            method,
            credentials,
            jwt,
            auth_url,
            token: RwLock::new(None),
        };
        authenticator.validate()?;
        Ok(authenticator)
    }

    /// Check that the credentials required by the method are present.
    /// Run at startup so misconfiguration aborts before any request.
    pub fn validate(&self) -> ApiResult<()> {
        match self.method {
            AuthMethod::ApiKey => {
                if self.credentials.api_key.is_none() {
                    return Err(ApiError::configuration(
                        "api_key auth requires FIREWALL_API_KEY",
                    ));
                }
            }
            AuthMethod::Basic | AuthMethod::Jwt => {
                if self.credentials.username.is_none() || self.credentials.password.is_none() {
                    return Err(ApiError::configuration(format!(
                        "{} auth requires FIREWALL_USERNAME and FIREWALL_PASSWORD",
                        self.method
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }

    /// Ensure a usable credential exists and return the auth headers for
    /// the next request. For JWT this may perform the refresh call.
    pub async fn ensure_valid(
        &self,
        http: &reqwest::Client,
    ) -> ApiResult<Vec<(&'static str, String)>> {
        match self.method {
            AuthMethod::ApiKey => {
                let key = self.credentials.api_key.as_ref().ok_or_else(|| {
                    ApiError::configuration("api_key auth requires an API key")
                })?;
                Ok(vec![("X-API-Key", key.clone())])
            }
            AuthMethod::Basic => {
                let (user, pass) = self.username_password()?;
                let encoded = BASE64.encode(format!("{user}:{pass}"));
                Ok(vec![("Authorization", format!("Basic {encoded}"))])
            }
            AuthMethod::Jwt => {
                let token = self.current_or_refreshed_token(http).await?;
                Ok(vec![("Authorization", format!("Bearer {token}"))])
            }
        }
    }

    async fn current_or_refreshed_token(&self, http: &reqwest::Client) -> ApiResult<String> {
        if let Some(state) = self.token.read().await.as_ref() {
            if !self.expiring(state) {
                return Ok(state.token.clone());
            }
        }
        self.refresh(http).await
    }

    fn expiring(&self, state: &TokenState) -> bool {
        let margin = chrono::Duration::from_std(self.jwt.safety_margin)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        Utc::now() + margin >= state.expires_at
    }

    /// Fetch a fresh token. Holds the write lock across the call so
    /// concurrent requests do not stampede the auth endpoint.
    async fn refresh(&self, http: &reqwest::Client) -> ApiResult<String> {
        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(state) = guard.as_ref() {
            if !self.expiring(state) {
                return Ok(state.token.clone());
            }
        }

        let (user, pass) = self.username_password()?;
        debug!(url = %self.auth_url, "refreshing JWT");

        let response = http
            .post(self.auth_url.clone())
            .timeout(self.jwt.refresh_timeout)
            .json(&serde_json::json!({"username": user, "password": pass}))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ApiError::authentication("token refresh timed out")
                } else {
                    ApiError::authentication(format!("token refresh failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::authentication(format!(
                "token refresh rejected (status {}): {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::authentication(format!("malformed token response: {e}")))?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.jwt.token_lifetime)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let token = parsed.data.token;
        info!("JWT refreshed, valid until {}", expires_at);
        *guard = Some(TokenState {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    fn username_password(&self) -> ApiResult<(&str, &str)> {
        match (&self.credentials.username, &self.credentials.password) {
            (Some(u), Some(p)) => Ok((u.as_str(), p.as_str())),
            _ => Err(ApiError::configuration(
                "username and password are required for this auth method",
            )),
        }
    }

    #[cfg(test)]
    pub(crate) async fn seed_token(&self, token: &str, expires_in: Duration) {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).unwrap_or_else(|_| chrono::Duration::zero());
        *self.token.write().await = Some(TokenState {
            token: token.to_string(),
            expires_at,
        });
    }
}

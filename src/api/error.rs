//! Error taxonomy for the upstream API client layer.
//!
//! Every variant carries a stable `kind()` string that ends up in the
//! response envelope's `error` field, so callers can branch on the kind
//! without parsing messages.

use thiserror::Error;

use crate::core::security::AccessLevel;

/// A specialized Result type for API client operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors raised by the query engine, HTTP transport, and tool dispatch.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad filter/operator, invalid pagination bounds, missing required
    /// setting. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credentials rejected by the upstream (401/403). Never retried.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Upstream returned a non-success status that is not an auth failure.
    #[error("Upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    /// Network failure or 5xx after the retry budget was exhausted.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Caller's access level is below the tool's requirement.
    #[error("Permission denied: requires {required}, caller has {actual}")]
    Permission {
        required: AccessLevel,
        actual: AccessLevel,
    },

    /// A sort or lookup referenced a field no record carries.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// A filter value could not be coerced for an ordered comparison.
    #[error("Cannot convert value {value:?} for field {field:?}")]
    TypeConversion { field: String, value: String },

    /// A regex filter pattern failed to compile.
    #[error("Invalid filter pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The invocation exceeded its overall time bound.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A navigation link pointed outside the configured upstream host.
    #[error("Refusing to follow link: {0}")]
    InvalidLink(String),

    /// The dispatch-level rate limit was exceeded.
    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Transport-level HTTP error from reqwest.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid-link error.
    pub fn invalid_link(msg: impl Into<String>) -> Self {
        Self::InvalidLink(msg.into())
    }

    /// Stable machine-readable error kind for the envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Authentication(_) => "authentication_error",
            Self::Upstream { .. } => "upstream_error",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Permission { .. } => "permission_error",
            Self::FieldNotFound(_) => "field_not_found",
            Self::TypeConversion { .. } => "type_conversion_error",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::Timeout(_) => "timeout",
            Self::InvalidLink(_) => "invalid_link",
            Self::RateLimited { .. } => "rate_limited",
            Self::Http(_) => "http_error",
            Self::Json(_) => "json_error",
            Self::Url(_) => "invalid_url",
        }
    }

    /// Whether the transport may retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamUnavailable(_) | Self::RateLimited { .. } => true,
            Self::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Build an error from an upstream response status and body.
    ///
    /// The upstream wraps errors as `{"message": "...", ...}`; fall back to
    /// the raw body when that shape is absent.
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == 401 || status == 403 {
            let message = extract_message(body)
                .unwrap_or_else(|| "credentials rejected by upstream".to_string());
            return Self::Authentication(message);
        }

        let message = extract_message(body).unwrap_or_else(|| body.trim().to_string());
        Self::Upstream { status, message }
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_parses_message() {
        let err = ApiError::from_response(500, r#"{"message": "database locked"}"#);
        match err {
            ApiError::Upstream { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "database locked");
            }
            other => panic!("expected Upstream, got {:?}", other),
        }
    }

    #[test]
    fn test_from_response_auth_status() {
        let err = ApiError::from_response(401, "nope");
        assert!(matches!(err, ApiError::Authentication(_)));
        assert_eq!(err.kind(), "authentication_error");

        let err = ApiError::from_response(403, r#"{"message": "forbidden"}"#);
        assert!(matches!(err, ApiError::Authentication(_)));
    }

    #[test]
    fn test_retryable() {
        assert!(ApiError::UpstreamUnavailable("boom".into()).is_retryable());
        assert!(
            ApiError::Upstream {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!ApiError::Authentication("denied".into()).is_retryable());
        assert!(!ApiError::Configuration("bad".into()).is_retryable());
    }

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(ApiError::configuration("x").kind(), "configuration_error");
        assert_eq!(ApiError::timeout("x").kind(), "timeout");
        assert_eq!(ApiError::invalid_link("x").kind(), "invalid_link");
        assert_eq!(
            ApiError::FieldNotFound("seq".into()).kind(),
            "field_not_found"
        );
    }
}

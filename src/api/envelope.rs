//! Uniform response envelope and HATEOAS navigation links.
//!
//! Every tool invocation returns this envelope, success or failure. Link
//! generation is optional per deployment; when disabled the `links` field
//! is omitted from the serialized envelope entirely.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::error::{ApiError, ApiResult};

/// Machine-readable failure detail carried inside a failed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
}

/// The uniform wrapper returned for every tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<BTreeMap<String, String>>,

    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl Envelope {
    /// Successful envelope with a human-readable message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            count: None,
            page: None,
            page_size: None,
            links: None,
            timestamp: Utc::now(),
            error: None,
        }
    }

    /// Failed envelope derived from an error; the kind string is stable.
    pub fn fail(error: &ApiError) -> Self {
        Self::failure(error.kind(), error.to_string())
    }

    /// Failed envelope with an explicit kind, for non-API failures.
    pub fn failure(kind: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            message: message.clone(),
            data: None,
            count: None,
            page: None,
            page_size: None,
            links: None,
            timestamp: Utc::now(),
            error: Some(ErrorDetail {
                kind: kind.into(),
                message,
            }),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_page(mut self, page: u32, page_size: usize) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self
    }

    pub fn with_links(mut self, links: BTreeMap<String, String>) -> Self {
        if !links.is_empty() {
            self.links = Some(links);
        }
        self
    }
}

/// Build navigation links for a paginated collection endpoint.
///
/// `self` always points at the current window; `next`/`prev` are present
/// only when that page exists given `total_results`.
pub fn collection_links(
    base: &Url,
    endpoint: &str,
    page: u32,
    page_size: usize,
    total_results: usize,
) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    let page_link = |p: u32| format!("{}?page={}&page_size={}", endpoint, p, page_size);

    links.insert("self".to_string(), absolutize(base, &page_link(page)));
    if page > 1 {
        links.insert("prev".to_string(), absolutize(base, &page_link(page - 1)));
    }
    let shown = (page as usize) * page_size;
    if shown < total_results {
        links.insert("next".to_string(), absolutize(base, &page_link(page + 1)));
    }
    links
}

/// Pull relation links out of a raw upstream payload's `_links` object.
///
/// Entries may be plain strings or `{"href": ...}` objects; anything else
/// is skipped.
pub fn extract_links(payload: &Value) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    let Some(raw) = payload.get("_links").and_then(|l| l.as_object()) else {
        return links;
    };
    for (rel, entry) in raw {
        let href = match entry {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("href").and_then(|h| h.as_str()).map(String::from),
            _ => None,
        };
        if let Some(href) = href {
            links.insert(rel.clone(), href);
        }
    }
    links
}

/// Resolve a previously emitted link against the configured upstream,
/// refusing anything that points at a different origin.
pub fn validate_link(base: &Url, link: &str) -> ApiResult<Url> {
    if link.starts_with('/') {
        return base.join(link).map_err(ApiError::from);
    }

    let url = Url::parse(link)
        .map_err(|_| ApiError::invalid_link(format!("{link:?} is not a valid URL")))?;

    let same_origin = url.scheme() == base.scheme()
        && url.host_str() == base.host_str()
        && url.port_or_known_default() == base.port_or_known_default();
    if !same_origin {
        return Err(ApiError::invalid_link(format!(
            "{link:?} does not match the configured upstream {base}"
        )));
    }
    Ok(url)
}

fn absolutize(base: &Url, path: &str) -> String {
    base.join(path)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> Url {
        Url::parse("https://firewall.example.com").unwrap()
    }

    #[test]
    fn test_links_omitted_when_absent() {
        let envelope = Envelope::ok("done").with_data(json!([]));
        let serialized = serde_json::to_value(&envelope).unwrap();
        assert!(serialized.get("links").is_none());
        assert!(serialized.get("error").is_none());
        assert_eq!(serialized["success"], json!(true));
    }

    #[test]
    fn test_fail_envelope_carries_kind() {
        let envelope = Envelope::fail(&ApiError::FieldNotFound("sequence".into()));
        assert!(!envelope.success);
        let error = envelope.error.unwrap();
        assert_eq!(error.kind, "field_not_found");
        assert!(error.message.contains("sequence"));
    }

    #[test]
    fn test_collection_links_first_page() {
        let links = collection_links(&base(), "/api/v2/firewall/rule", 1, 10, 25);
        assert!(links["self"].contains("page=1"));
        assert!(links["next"].contains("page=2"));
        assert!(!links.contains_key("prev"));
    }

    #[test]
    fn test_collection_links_middle_and_last_page() {
        let links = collection_links(&base(), "/api/v2/firewall/rule", 2, 10, 25);
        assert!(links.contains_key("prev"));
        assert!(links.contains_key("next"));

        let links = collection_links(&base(), "/api/v2/firewall/rule", 3, 10, 25);
        assert!(links.contains_key("prev"));
        assert!(!links.contains_key("next"));
    }

    #[test]
    fn test_extract_links_href_objects_and_strings() {
        let payload = json!({
            "data": [],
            "_links": {
                "self": {"href": "/api/v2/firewall/rule?id=3"},
                "next": "/api/v2/firewall/rule?offset=20",
                "broken": 42
            }
        });
        let links = extract_links(&payload);
        assert_eq!(links.len(), 2);
        assert_eq!(links["self"], "/api/v2/firewall/rule?id=3");
        assert_eq!(links["next"], "/api/v2/firewall/rule?offset=20");
    }

    #[test]
    fn test_validate_link_relative_and_same_origin() {
        let url = validate_link(&base(), "/api/v2/status/system").unwrap();
        assert_eq!(url.as_str(), "https://firewall.example.com/api/v2/status/system");

        let url =
            validate_link(&base(), "https://firewall.example.com/api/v2/firewall/alias").unwrap();
        assert_eq!(url.path(), "/api/v2/firewall/alias");
    }

    #[test]
    fn test_validate_link_rejects_foreign_host() {
        let err = validate_link(&base(), "https://attacker.example.net/api/v2/x").unwrap_err();
        assert_eq!(err.kind(), "invalid_link");

        // Same host, different scheme is also refused.
        let err = validate_link(&base(), "http://firewall.example.com/api/v2/x").unwrap_err();
        assert_eq!(err.kind(), "invalid_link");
    }
}

//! Common utilities shared across tool definitions.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::envelope::{Envelope, collection_links, extract_links};
use crate::api::error::{ApiError, ApiResult};
use crate::api::query::PaginationOptions;
use crate::api::{ListOutcome, extract_data};
use crate::domains::tools::registry::ToolContext;

/// Default page number for search tools.
pub fn default_page() -> u32 {
    1
}

/// Parse tool arguments into a typed params struct.
pub fn parse_params<P: DeserializeOwned>(args: Value) -> ApiResult<P> {
    serde_json::from_value(args)
        .map_err(|e| ApiError::configuration(format!("invalid arguments: {e}")))
}

/// Resolve the page window for a search tool, applying the configured
/// default and maximum page sizes.
pub fn page_window(
    ctx: &ToolContext,
    page: u32,
    page_size: Option<usize>,
) -> ApiResult<(PaginationOptions, usize)> {
    let size = page_size.unwrap_or(ctx.query.default_page_size);
    let pagination = PaginationOptions::from_page(page, size);
    pagination.validate(ctx.query.max_page_size)?;
    Ok((pagination, size))
}

/// Build the envelope for a list query result.
///
/// `count` is the size of the full filtered set, not the page. Navigation
/// links are attached only when the deployment enables them.
pub fn list_envelope(
    ctx: &ToolContext,
    endpoint: &str,
    noun: &str,
    outcome: ListOutcome,
    page: u32,
    page_size: usize,
) -> Envelope {
    let total = outcome.total_results;
    let shown = outcome.items.len();
    let mut envelope = Envelope::ok(format!("Found {shown} {noun} ({total} total)"))
        .with_data(Value::Array(outcome.items))
        .with_count(total)
        .with_page(page, page_size);

    if ctx.client.hateoas_enabled() {
        let mut links = outcome.links;
        links.extend(collection_links(
            ctx.client.base_url(),
            &format!("/api/v2{endpoint}"),
            page,
            page_size,
            total,
        ));
        envelope = envelope.with_links(links);
    }
    envelope
}

/// Build the envelope for a mutation response.
pub fn mutation_envelope(ctx: &ToolContext, message: impl Into<String>, payload: &Value) -> Envelope {
    let mut envelope = Envelope::ok(message).with_data(extract_data(payload));
    if ctx.client.hateoas_enabled() {
        envelope = envelope.with_links(extract_links(payload));
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct DemoParams {
        name: String,
        #[serde(default = "default_page")]
        page: u32,
    }

    #[test]
    fn test_parse_params_defaults() {
        let params: DemoParams = parse_params(json!({"name": "wan"})).unwrap();
        assert_eq!(params.name, "wan");
        assert_eq!(params.page, 1);
    }

    #[test]
    fn test_parse_params_bad_input_is_configuration_error() {
        let err = parse_params::<DemoParams>(json!({"page": 2})).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }
}

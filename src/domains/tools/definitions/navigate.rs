//! Navigation and object-identity tools.
//!
//! Upstream object IDs are positional and shift after deletions, so
//! callers either follow the links a response carried, re-query an
//! endpoint fresh, or look an object up by a stable field value.

use async_trait::async_trait;
use rmcp::handler::server::tool::cached_schema_for_type;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use super::common::{mutation_envelope, parse_params};
use crate::api::data_array;
use crate::api::envelope::{Envelope, extract_links};
use crate::api::error::ApiResult;
use crate::core::security::AccessLevel;
use crate::domains::tools::registry::{ToolContext, ToolDefinition};

/// Parameters for `follow_api_link`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FollowApiLinkParams {
    #[schemars(description = "A link value from a previous response's links object")]
    pub link: String,
}

/// Follow a previously emitted navigation link.
#[derive(Debug, Clone)]
pub struct FollowApiLinkTool;

impl FollowApiLinkTool {
    pub const NAME: &'static str = "follow_api_link";
    pub const DESCRIPTION: &'static str = "Follow a navigation link from a previous response. \
        Links pointing outside the configured upstream are refused.";
}

#[async_trait]
impl ToolDefinition for FollowApiLinkTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<FollowApiLinkParams>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }

    fn min_access(&self) -> AccessLevel {
        AccessLevel::ReadOnly
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope> {
        let params: FollowApiLinkParams = parse_params(args)?;
        let payload = ctx.client.follow_link(&params.link).await?;
        Ok(mutation_envelope(ctx, format!("Followed link {}", params.link), &payload))
    }
}

/// Parameters for `refresh_object_ids`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RefreshObjectIdsParams {
    #[schemars(description = "Endpoint path to re-query, e.g. /firewall/rule")]
    pub endpoint: String,
}

/// Cache-bypassing re-query of an endpoint.
#[derive(Debug, Clone)]
pub struct RefreshObjectIdsTool;

impl RefreshObjectIdsTool {
    pub const NAME: &'static str = "refresh_object_ids";
    pub const DESCRIPTION: &'static str = "Re-query an endpoint bypassing the response cache. \
        Use after mutations: object IDs are positional and shift when entries are removed.";
}

#[async_trait]
impl ToolDefinition for RefreshObjectIdsTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<RefreshObjectIdsParams>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }

    fn min_access(&self) -> AccessLevel {
        AccessLevel::ReadOnly
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope> {
        let params: RefreshObjectIdsParams = parse_params(args)?;
        let payload = ctx.client.refresh(&params.endpoint).await?;
        let items = data_array(&payload);
        let count = items.len();

        let ids: Vec<Value> = items
            .iter()
            .filter_map(|item| item.get("id").cloned())
            .collect();

        let mut envelope =
            Envelope::ok(format!("Refreshed {count} object(s) from {}", params.endpoint))
                .with_data(json!({
                    "endpoint": params.endpoint,
                    "current_ids": ids,
                    "objects": items,
                }))
                .with_count(count);
        if ctx.client.hateoas_enabled() {
            envelope = envelope.with_links(extract_links(&payload));
        }
        Ok(envelope)
    }
}

/// Parameters for `find_object_by_field`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindObjectByFieldParams {
    #[schemars(description = "Endpoint path to search, e.g. /firewall/alias")]
    pub endpoint: String,

    #[schemars(description = "Field name to match (dotted paths allowed)")]
    pub field: String,

    #[schemars(description = "Value the field must equal")]
    pub value: Value,
}

/// Single-object lookup by field value, immune to ID drift.
#[derive(Debug, Clone)]
pub struct FindObjectByFieldTool;

impl FindObjectByFieldTool {
    pub const NAME: &'static str = "find_object_by_field";
    pub const DESCRIPTION: &'static str = "Find one object on an endpoint by field value \
        instead of by its (unstable) numeric ID.";
}

#[async_trait]
impl ToolDefinition for FindObjectByFieldTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<FindObjectByFieldParams>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }

    fn min_access(&self) -> AccessLevel {
        AccessLevel::ReadOnly
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope> {
        let params: FindObjectByFieldParams = parse_params(args)?;
        let found = ctx
            .client
            .find_object_by_field(&params.endpoint, &params.field, params.value.clone())
            .await?;

        Ok(match found {
            Some(object) => Envelope::ok(format!(
                "Found object with {} = {} on {}",
                params.field, params.value, params.endpoint
            ))
            .with_data(object)
            .with_count(1),
            None => Envelope::ok(format!(
                "No object with {} = {} on {}",
                params.field, params.value, params.endpoint
            ))
            .with_count(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_find_params_accept_any_value_type() {
        let params: FindObjectByFieldParams = serde_json::from_value(json!({
            "endpoint": "/firewall/alias",
            "field": "name",
            "value": "blocklist"
        }))
        .unwrap();
        assert_eq!(params.value, json!("blocklist"));

        let params: FindObjectByFieldParams = serde_json::from_value(json!({
            "endpoint": "/firewall/rule",
            "field": "destination_port",
            "value": 8443
        }))
        .unwrap();
        assert_eq!(params.value, json!(8443));
    }

    #[test]
    fn test_link_param_required() {
        assert!(serde_json::from_value::<FollowApiLinkParams>(json!({})).is_err());
    }

    #[test]
    fn test_tool_access_levels() {
        assert_eq!(FollowApiLinkTool.min_access(), AccessLevel::ReadOnly);
        assert_eq!(RefreshObjectIdsTool.min_access(), AccessLevel::ReadOnly);
        assert_eq!(FindObjectByFieldTool.min_access(), AccessLevel::ReadOnly);
    }
}

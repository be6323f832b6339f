//! System status and API capability tools.

use async_trait::async_trait;
use rmcp::handler::server::tool::cached_schema_for_type;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;

use super::common::{mutation_envelope, parse_params};
use crate::api::endpoints;
use crate::api::envelope::{Envelope, extract_links};
use crate::api::error::ApiResult;
use crate::api::extract_data;
use crate::core::security::AccessLevel;
use crate::domains::tools::registry::{ToolContext, ToolDefinition};

/// Parameters for `system_status` (none).
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SystemStatusParams {}

/// Current system status: CPU, memory, disk, version.
#[derive(Debug, Clone)]
pub struct SystemStatusTool;

impl SystemStatusTool {
    pub const NAME: &'static str = "system_status";
    pub const DESCRIPTION: &'static str =
        "Get current firewall system status including CPU, memory, disk usage, and version info.";
}

#[async_trait]
impl ToolDefinition for SystemStatusTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<SystemStatusParams>(),
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
        let _params: SystemStatusParams = parse_params(args)?;
        let payload = ctx.client.get(endpoints::STATUS_SYSTEM).await?;
        Ok(mutation_envelope(ctx, "System status retrieved", &payload))
    }
}

/// Parameters for `api_capabilities` (none).
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ApiCapabilitiesParams {}

/// Upstream REST API settings plus a summary of supported features.
#[derive(Debug, Clone)]
pub struct ApiCapabilitiesTool;

impl ApiCapabilitiesTool {
    pub const NAME: &'static str = "api_capabilities";
    pub const DESCRIPTION: &'static str =
        "Get the upstream REST API settings and a summary of supported query features.";
}

#[async_trait]
impl ToolDefinition for ApiCapabilitiesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<ApiCapabilitiesParams>(),
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
        let _params: ApiCapabilitiesParams = parse_params(args)?;
        let payload = ctx.client.get(endpoints::RESTAPI_SETTINGS).await?;

        let data = json!({
            "settings": extract_data(&payload),
            "features": {
                "object_ids": "dynamic, non-persistent",
                "filters": "exact, contains, startswith, endswith, lt, lte, gt, gte, regex",
                "sorting": "single-field, asc/desc",
                "pagination": "limit/offset",
                "hateoas": ctx.client.hateoas_enabled(),
                "control_parameters": "apply, async, placement, append, remove",
            }
        });

        let mut envelope = Envelope::ok("API capabilities retrieved").with_data(data);
        if ctx.client.hateoas_enabled() {
            envelope = envelope.with_links(extract_links(&payload));
        }
        Ok(envelope)
    }
}

/// Parameters for `test_connection` (none).
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TestConnectionParams {}

/// Probe the upstream by fetching system status.
#[derive(Debug, Clone)]
pub struct TestConnectionTool;

impl TestConnectionTool {
    pub const NAME: &'static str = "test_connection";
    pub const DESCRIPTION: &'static str =
        "Verify that the upstream firewall API is reachable with the configured credentials.";
}

#[async_trait]
impl ToolDefinition for TestConnectionTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<TestConnectionParams>(),
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
        let _params: TestConnectionParams = parse_params(args)?;
        ctx.client.get(endpoints::STATUS_SYSTEM).await?;
        Ok(Envelope::ok("Connection to upstream verified").with_data(json!({"connected": true})))
    }
}

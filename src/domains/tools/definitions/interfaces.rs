//! Network interface search tool.

use async_trait::async_trait;
use rmcp::handler::server::tool::cached_schema_for_type;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::common::{default_page, list_envelope, page_window, parse_params};
use crate::api::endpoints;
use crate::api::envelope::Envelope;
use crate::api::error::ApiResult;
use crate::api::query::{QueryFilter, QuerySpec, SortOptions};
use crate::core::security::AccessLevel;
use crate::domains::tools::registry::{ToolContext, ToolDefinition};

fn default_sort_field() -> String {
    "name".to_string()
}

/// Parameters for interface search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchInterfacesParams {
    /// Substring to match against interface names.
    #[schemars(description = "Search in interface names (substring match)")]
    pub search_term: Option<String>,

    /// Exact interface status to filter by.
    #[schemars(description = "Filter by status (up, down, ...)")]
    pub status: Option<String>,

    #[schemars(description = "Page number (1-based)")]
    #[serde(default = "default_page")]
    pub page: u32,

    #[schemars(description = "Results per page (bounded by the configured maximum)")]
    #[serde(default)]
    pub page_size: Option<usize>,

    #[schemars(description = "Field to sort by")]
    #[serde(default = "default_sort_field")]
    pub sort_by: String,
}

/// Search and filter network interfaces.
#[derive(Debug, Clone)]
pub struct SearchInterfacesTool;

impl SearchInterfacesTool {
    pub const NAME: &'static str = "search_interfaces";
    pub const DESCRIPTION: &'static str = "Search and filter network interfaces by name or \
        status, with sorting and pagination.";
}

#[async_trait]
impl ToolDefinition for SearchInterfacesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<SearchInterfacesParams>(),
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
        let params: SearchInterfacesParams = parse_params(args)?;
        let (pagination, page_size) = page_window(ctx, params.page, params.page_size)?;

        let mut spec = QuerySpec::new();
        if let Some(term) = &params.search_term {
            spec = spec.filter(QueryFilter::contains("name", term.as_str()));
        }
        if let Some(status) = &params.status {
            spec = spec.filter(QueryFilter::exact("status", status.as_str()));
        }
        spec = spec
            .sort(SortOptions::asc(&params.sort_by))
            .paginate(pagination);

        let outcome = ctx.client.query(endpoints::STATUS_INTERFACE, &spec).await?;
        Ok(list_envelope(
            ctx,
            endpoints::STATUS_INTERFACE,
            "interface(s)",
            outcome,
            params.page,
            page_size,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_params_defaults() {
        let params: SearchInterfacesParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.page, 1);
        assert!(params.page_size.is_none());
        assert_eq!(params.sort_by, "name");
        assert!(params.search_term.is_none());
    }

    #[test]
    fn test_params_full() {
        let params: SearchInterfacesParams = serde_json::from_value(json!({
            "search_term": "wan", "status": "up", "page": 2, "page_size": 5, "sort_by": "status"
        }))
        .unwrap();
        assert_eq!(params.search_term.as_deref(), Some("wan"));
        assert_eq!(params.page, 2);
        assert_eq!(params.page_size, Some(5));
    }
}

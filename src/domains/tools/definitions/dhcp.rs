//! DHCP lease search tool.

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

fn default_sort_start() -> String {
    "start".to_string()
}

/// Parameters for DHCP lease search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchDhcpLeasesParams {
    #[schemars(description = "Search in lease hostnames (substring match)")]
    pub search_term: Option<String>,

    #[schemars(description = "Filter by interface")]
    pub interface: Option<String>,

    #[schemars(description = "Filter by MAC address (exact)")]
    pub mac_address: Option<String>,

    #[schemars(description = "Filter by lease state (active, expired, ...)")]
    pub state: Option<String>,

    #[schemars(description = "Page number (1-based)")]
    #[serde(default = "default_page")]
    pub page: u32,

    #[schemars(description = "Results per page (bounded by the configured maximum)")]
    #[serde(default)]
    pub page_size: Option<usize>,

    #[schemars(description = "Field to sort by (descending)")]
    #[serde(default = "default_sort_start")]
    pub sort_by: String,
}

/// Search DHCP leases across interfaces.
#[derive(Debug, Clone)]
pub struct SearchDhcpLeasesTool;

impl SearchDhcpLeasesTool {
    pub const NAME: &'static str = "search_dhcp_leases";
    pub const DESCRIPTION: &'static str = "Search DHCP leases by hostname, interface, MAC \
        address, or state, newest first.";
}

#[async_trait]
impl ToolDefinition for SearchDhcpLeasesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<SearchDhcpLeasesParams>(),
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
        let params: SearchDhcpLeasesParams = parse_params(args)?;
        let (pagination, page_size) = page_window(ctx, params.page, params.page_size)?;

        let mut spec = QuerySpec::new();
        if let Some(term) = &params.search_term {
            spec = spec.filter(QueryFilter::contains("hostname", term.as_str()));
        }
        if let Some(interface) = &params.interface {
            spec = spec.filter(QueryFilter::exact("interface", interface.as_str()));
        }
        if let Some(mac) = &params.mac_address {
            spec = spec.filter(QueryFilter::exact("mac", mac.as_str()));
        }
        if let Some(state) = &params.state {
            spec = spec.filter(QueryFilter::exact("state", state.as_str()));
        }
        spec = spec
            .sort(SortOptions::desc(&params.sort_by))
            .paginate(pagination);

        let outcome = ctx.client.query(endpoints::DHCP_LEASE, &spec).await?;
        Ok(list_envelope(
            ctx,
            endpoints::DHCP_LEASE,
            "lease(s)",
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
        let params: SearchDhcpLeasesParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.sort_by, "start");
        assert!(params.state.is_none());
        assert_eq!(params.page, 1);
    }

    #[test]
    fn test_params_mac_filter() {
        let params: SearchDhcpLeasesParams =
            serde_json::from_value(json!({"mac_address": "aa:bb:cc:dd:ee:ff"})).unwrap();
        assert_eq!(params.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
    }
}

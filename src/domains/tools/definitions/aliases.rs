//! Alias tools: search, create, and address list management.

use async_trait::async_trait;
use rmcp::handler::server::tool::cached_schema_for_type;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use super::common::{default_page, list_envelope, mutation_envelope, page_window, parse_params};
use crate::api::endpoints;
use crate::api::envelope::Envelope;
use crate::api::error::{ApiError, ApiResult};
use crate::api::query::{ControlParameters, QueryFilter, QuerySpec, SortOptions};
use crate::core::security::AccessLevel;
use crate::domains::tools::registry::{ToolContext, ToolDefinition};

fn default_sort_name() -> String {
    "name".to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// search_aliases
// ============================================================================

/// Parameters for alias search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchAliasesParams {
    #[schemars(description = "Search in alias names (substring match)")]
    pub search_term: Option<String>,

    #[schemars(description = "Filter by alias type (host, network, port, url)")]
    pub alias_type: Option<String>,

    #[schemars(description = "Find aliases whose address list contains this entry")]
    pub containing_address: Option<String>,

    #[schemars(description = "Page number (1-based)")]
    #[serde(default = "default_page")]
    pub page: u32,

    #[schemars(description = "Results per page (bounded by the configured maximum)")]
    #[serde(default)]
    pub page_size: Option<usize>,

    #[schemars(description = "Field to sort by")]
    #[serde(default = "default_sort_name")]
    pub sort_by: String,
}

/// Search aliases by name, type, or member address.
#[derive(Debug, Clone)]
pub struct SearchAliasesTool;

impl SearchAliasesTool {
    pub const NAME: &'static str = "search_aliases";
    pub const DESCRIPTION: &'static str = "Search firewall aliases by name, type, or a \
        contained address, with sorting and pagination.";
}

#[async_trait]
impl ToolDefinition for SearchAliasesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<SearchAliasesParams>(),
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
        let params: SearchAliasesParams = parse_params(args)?;
        let (pagination, page_size) = page_window(ctx, params.page, params.page_size)?;

        let mut spec = QuerySpec::new();
        if let Some(term) = &params.search_term {
            spec = spec.filter(QueryFilter::contains("name", term.as_str()));
        }
        if let Some(alias_type) = &params.alias_type {
            spec = spec.filter(QueryFilter::exact("type", alias_type.as_str()));
        }
        if let Some(address) = &params.containing_address {
            spec = spec.filter(QueryFilter::contains("address", address.as_str()));
        }
        spec = spec
            .sort(SortOptions::asc(&params.sort_by))
            .paginate(pagination);

        let outcome = ctx.client.query(endpoints::FIREWALL_ALIAS, &spec).await?;
        Ok(list_envelope(
            ctx,
            endpoints::FIREWALL_ALIAS,
            "alias(es)",
            outcome,
            params.page,
            page_size,
        ))
    }
}

// ============================================================================
// create_alias
// ============================================================================

/// Parameters for alias creation.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateAliasParams {
    #[schemars(description = "Alias name")]
    pub name: String,

    #[schemars(description = "Alias type (host, network, port, url)")]
    pub alias_type: String,

    #[schemars(description = "Initial address list")]
    pub addresses: Vec<String>,

    #[schemars(description = "Optional description")]
    pub description: Option<String>,

    #[schemars(description = "Apply the change immediately")]
    #[serde(default = "default_true")]
    pub apply_immediately: bool,
}

/// Create a new alias.
#[derive(Debug, Clone)]
pub struct CreateAliasTool;

impl CreateAliasTool {
    pub const NAME: &'static str = "create_alias";
    pub const DESCRIPTION: &'static str =
        "Create a firewall alias (a named list of IPs, networks, or ports).";
}

#[async_trait]
impl ToolDefinition for CreateAliasTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<CreateAliasParams>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }

    fn min_access(&self) -> AccessLevel {
        AccessLevel::SecurityWrite
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope> {
        let params: CreateAliasParams = parse_params(args)?;

        let alias = json!({
            "name": params.name,
            "type": params.alias_type,
            "address": params.addresses,
            "descr": params.description.unwrap_or_default(),
        });
        let control = ControlParameters {
            apply: params.apply_immediately,
            ..Default::default()
        };

        let payload = ctx
            .client
            .create(endpoints::FIREWALL_ALIAS, &alias, &control)
            .await?;
        Ok(mutation_envelope(
            ctx,
            format!("Alias {:?} created", params.name),
            &payload,
        ))
    }
}

// ============================================================================
// manage_alias_addresses
// ============================================================================

/// Parameters for alias membership changes.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ManageAliasAddressesParams {
    #[schemars(description = "ID of the alias to modify (as last observed)")]
    pub alias_id: u64,

    #[schemars(description = "Action to perform: add or remove")]
    pub action: String,

    #[schemars(description = "Addresses to add or remove")]
    pub addresses: Vec<String>,
}

/// Add or remove addresses on an existing alias.
#[derive(Debug, Clone)]
pub struct ManageAliasAddressesTool;

impl ManageAliasAddressesTool {
    pub const NAME: &'static str = "manage_alias_addresses";
    pub const DESCRIPTION: &'static str =
        "Add addresses to or remove addresses from an existing alias.";
}

#[async_trait]
impl ToolDefinition for ManageAliasAddressesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<ManageAliasAddressesParams>(),
            annotations: None,
            output_schema: None,
            icons: None,
            meta: None,
            title: None,
        }
    }

    fn min_access(&self) -> AccessLevel {
        AccessLevel::SecurityWrite
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope> {
        let params: ManageAliasAddressesParams = parse_params(args)?;
        if params.addresses.is_empty() {
            return Err(ApiError::configuration("addresses must not be empty"));
        }

        let control = match params.action.to_ascii_lowercase().as_str() {
            "add" => ControlParameters {
                append: true,
                apply: true,
                ..Default::default()
            },
            "remove" => ControlParameters {
                remove: true,
                apply: true,
                ..Default::default()
            },
            other => {
                return Err(ApiError::configuration(format!(
                    "action must be \"add\" or \"remove\", got {other:?}"
                )));
            }
        };

        let body = json!({"address": params.addresses});
        let payload = ctx
            .client
            .update(endpoints::FIREWALL_ALIAS, params.alias_id, &body, &control)
            .await?;
        Ok(mutation_envelope(
            ctx,
            format!(
                "{} {} address(es) on alias {}",
                if control.append { "Added" } else { "Removed" },
                params.addresses.len(),
                params.alias_id
            ),
            &payload,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_params_defaults() {
        let params: SearchAliasesParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.sort_by, "name");
        assert_eq!(params.page, 1);
    }

    #[test]
    fn test_create_params() {
        let params: CreateAliasParams = serde_json::from_value(json!({
            "name": "blocklist",
            "alias_type": "host",
            "addresses": ["203.0.113.5", "203.0.113.6"]
        }))
        .unwrap();
        assert_eq!(params.addresses.len(), 2);
        assert!(params.apply_immediately);
    }

    #[test]
    fn test_manage_params() {
        let params: ManageAliasAddressesParams = serde_json::from_value(json!({
            "alias_id": 3, "action": "remove", "addresses": ["203.0.113.5"]
        }))
        .unwrap();
        assert_eq!(params.action, "remove");
    }
}

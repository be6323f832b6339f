//! Firewall rule tools: search, create, update, reposition, delete, and
//! bulk operations.
//!
//! Rule object IDs are dynamic upstream and shift after deletions, so
//! write tools take the ID the caller most recently observed and callers
//! are expected to re-query (`refresh_object_ids`) after mutations.

use async_trait::async_trait;
use rmcp::handler::server::tool::cached_schema_for_type;
use rmcp::model::Tool;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use super::common::{default_page, list_envelope, mutation_envelope, page_window, parse_params};
use crate::api::envelope::Envelope;
use crate::api::error::ApiResult;
use crate::api::query::{
    ControlParameters, FilterOperator, QueryFilter, QuerySpec, SortOptions,
};
use crate::api::{endpoints, extract_data, filter, page};
use crate::core::security::AccessLevel;
use crate::domains::tools::registry::{ToolContext, ToolDefinition};

fn default_sort_sequence() -> String {
    "sequence".to_string()
}

fn default_true() -> bool {
    true
}

fn default_block_interface() -> String {
    "wan".to_string()
}

fn default_block_prefix() -> String {
    "Bulk block".to_string()
}

// ============================================================================
// search_firewall_rules
// ============================================================================

/// Parameters for rule search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SearchFirewallRulesParams {
    #[schemars(description = "Filter by interface (wan, lan, ...)")]
    pub interface: Option<String>,

    #[schemars(description = "Filter by source address (substring match)")]
    pub source_ip: Option<String>,

    #[schemars(description = "Filter by destination port")]
    pub destination_port: Option<u16>,

    #[schemars(description = "Filter by rule type (pass, block, reject)")]
    pub rule_type: Option<String>,

    #[schemars(description = "Search in rule descriptions (substring match)")]
    pub search_description: Option<String>,

    #[schemars(description = "Page number (1-based)")]
    #[serde(default = "default_page")]
    pub page: u32,

    #[schemars(description = "Results per page (bounded by the configured maximum)")]
    #[serde(default)]
    pub page_size: Option<usize>,

    #[schemars(description = "Field to sort by")]
    #[serde(default = "default_sort_sequence")]
    pub sort_by: String,
}

/// Search firewall rules with filtering, sorting, and pagination.
#[derive(Debug, Clone)]
pub struct SearchFirewallRulesTool;

impl SearchFirewallRulesTool {
    pub const NAME: &'static str = "search_firewall_rules";
    pub const DESCRIPTION: &'static str = "Search firewall rules with filters for interface, \
        source, destination port, rule type, and description, plus sorting and pagination.";
}

#[async_trait]
impl ToolDefinition for SearchFirewallRulesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<SearchFirewallRulesParams>(),
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
        let params: SearchFirewallRulesParams = parse_params(args)?;
        let (pagination, page_size) = page_window(ctx, params.page, params.page_size)?;

        let mut spec = QuerySpec::new();
        if let Some(interface) = &params.interface {
            spec = spec.filter(QueryFilter::exact("interface", interface.as_str()));
        }
        if let Some(source) = &params.source_ip {
            spec = spec.filter(QueryFilter::contains("source", source.as_str()));
        }
        if let Some(port) = params.destination_port {
            spec = spec.filter(QueryFilter::exact("destination_port", port));
        }
        if let Some(rule_type) = &params.rule_type {
            spec = spec.filter(QueryFilter::exact("type", rule_type.as_str()));
        }
        if let Some(descr) = &params.search_description {
            spec = spec.filter(QueryFilter::contains("descr", descr.as_str()));
        }
        spec = spec
            .sort(SortOptions::asc(&params.sort_by))
            .paginate(pagination);

        let outcome = ctx.client.query(endpoints::FIREWALL_RULE, &spec).await?;
        Ok(list_envelope(
            ctx,
            endpoints::FIREWALL_RULE,
            "firewall rule(s)",
            outcome,
            params.page,
            page_size,
        ))
    }
}

// ============================================================================
// find_blocked_rules
// ============================================================================

/// Parameters for blocked-rule search.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindBlockedRulesParams {
    #[schemars(description = "Restrict to one interface")]
    pub interface: Option<String>,

    #[schemars(description = "Page number (1-based)")]
    #[serde(default = "default_page")]
    pub page: u32,

    #[schemars(description = "Results per page (bounded by the configured maximum)")]
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Find all rules that block or reject traffic.
#[derive(Debug, Clone)]
pub struct FindBlockedRulesTool;

impl FindBlockedRulesTool {
    pub const NAME: &'static str = "find_blocked_rules";
    pub const DESCRIPTION: &'static str =
        "Find all firewall rules that block or reject traffic, optionally on one interface.";
}

#[async_trait]
impl ToolDefinition for FindBlockedRulesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<FindBlockedRulesParams>(),
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
        let params: FindBlockedRulesParams = parse_params(args)?;
        let (pagination, page_size) = page_window(ctx, params.page, params.page_size)?;

        // Fetch the full block/reject set, then narrow and slice locally:
        // the interface filter composes with the regex upstream only on
        // newer API generations.
        let spec = QuerySpec::new().filter(QueryFilter::new(
            "type",
            json!("block|reject"),
            FilterOperator::Regex,
        ));
        let outcome = ctx.client.query(endpoints::FIREWALL_RULE, &spec).await?;

        let mut rules = outcome.items;
        if let Some(interface) = &params.interface {
            rules =
                filter::apply_filters(&rules, &[QueryFilter::exact("interface", interface.as_str())])?;
        }
        let result = page::paginate(rules, &pagination);

        Ok(list_envelope(
            ctx,
            endpoints::FIREWALL_RULE,
            "blocking rule(s)",
            crate::api::ListOutcome {
                items: result.items,
                total_results: result.total_results,
                links: outcome.links,
            },
            params.page,
            page_size,
        ))
    }
}

// ============================================================================
// create_firewall_rule
// ============================================================================

/// Parameters for rule creation.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateFirewallRuleParams {
    #[schemars(description = "Interface for the rule (wan, lan, ...)")]
    pub interface: String,

    #[schemars(description = "Rule type: pass, block, or reject")]
    pub rule_type: String,

    #[schemars(description = "Protocol: tcp, udp, icmp, or any")]
    pub protocol: String,

    #[schemars(description = "Source address (any, IP, network, or alias)")]
    pub source: String,

    #[schemars(description = "Destination address (any, IP, network, or alias)")]
    pub destination: String,

    #[schemars(description = "Optional rule description")]
    pub description: Option<String>,

    #[schemars(description = "Optional destination port or range")]
    pub destination_port: Option<String>,

    #[schemars(description = "Position to insert the rule at (0 = top)")]
    pub position: Option<u32>,

    #[schemars(description = "Apply the change immediately")]
    #[serde(default = "default_true")]
    pub apply_immediately: bool,

    #[schemars(description = "Log packets matching this rule")]
    #[serde(default = "default_true")]
    pub log_matches: bool,
}

/// Create a firewall rule with placement control.
#[derive(Debug, Clone)]
pub struct CreateFirewallRuleTool;

impl CreateFirewallRuleTool {
    pub const NAME: &'static str = "create_firewall_rule";
    pub const DESCRIPTION: &'static str =
        "Create a firewall rule with optional placement and immediate apply.";
}

#[async_trait]
impl ToolDefinition for CreateFirewallRuleTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<CreateFirewallRuleParams>(),
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
        let params: CreateFirewallRuleParams = parse_params(args)?;

        let mut rule = json!({
            "interface": params.interface,
            "type": params.rule_type,
            "ipprotocol": "inet",
            "protocol": params.protocol,
            "source": params.source,
            "destination": params.destination,
            "descr": params.description.unwrap_or_else(|| "Created via MCP".to_string()),
            "log": params.log_matches,
        });
        if let Some(port) = params.destination_port {
            rule["destination_port"] = json!(port);
        }

        let control = ControlParameters {
            apply: params.apply_immediately,
            placement: params.position,
            ..Default::default()
        };

        let payload = ctx
            .client
            .create(endpoints::FIREWALL_RULE, &rule, &control)
            .await?;
        Ok(mutation_envelope(ctx, "Firewall rule created", &payload))
    }
}

// ============================================================================
// update_firewall_rule
// ============================================================================

/// Parameters for rule update.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateFirewallRuleParams {
    #[schemars(description = "ID of the rule to update (as last observed)")]
    pub rule_id: u64,

    #[schemars(description = "Fields to change, as a partial rule object")]
    pub updates: Value,

    #[schemars(description = "Apply the change immediately")]
    #[serde(default = "default_true")]
    pub apply_immediately: bool,
}

/// Patch fields on an existing rule.
#[derive(Debug, Clone)]
pub struct UpdateFirewallRuleTool;

impl UpdateFirewallRuleTool {
    pub const NAME: &'static str = "update_firewall_rule";
    pub const DESCRIPTION: &'static str = "Update fields on an existing firewall rule by ID. \
        IDs shift after deletions; refresh_object_ids gives current ones.";
}

#[async_trait]
impl ToolDefinition for UpdateFirewallRuleTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<UpdateFirewallRuleParams>(),
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
        let params: UpdateFirewallRuleParams = parse_params(args)?;
        let control = ControlParameters {
            apply: params.apply_immediately,
            ..Default::default()
        };
        let payload = ctx
            .client
            .update(endpoints::FIREWALL_RULE, params.rule_id, &params.updates, &control)
            .await?;
        Ok(mutation_envelope(
            ctx,
            format!("Firewall rule {} updated", params.rule_id),
            &payload,
        ))
    }
}

// ============================================================================
// move_firewall_rule
// ============================================================================

/// Parameters for rule repositioning.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MoveFirewallRuleParams {
    #[schemars(description = "ID of the rule to move (as last observed)")]
    pub rule_id: u64,

    #[schemars(description = "New position (0 = top, higher = lower priority)")]
    pub new_position: u32,

    #[schemars(description = "Apply the change immediately")]
    #[serde(default = "default_true")]
    pub apply_immediately: bool,
}

/// Move a rule to a new position in the evaluation order.
#[derive(Debug, Clone)]
pub struct MoveFirewallRuleTool;

impl MoveFirewallRuleTool {
    pub const NAME: &'static str = "move_firewall_rule";
    pub const DESCRIPTION: &'static str =
        "Move a firewall rule to a new position in the rule order.";
}

#[async_trait]
impl ToolDefinition for MoveFirewallRuleTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<MoveFirewallRuleParams>(),
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
        let params: MoveFirewallRuleParams = parse_params(args)?;
        let control = ControlParameters {
            apply: params.apply_immediately,
            placement: Some(params.new_position),
            ..Default::default()
        };
        let payload = ctx
            .client
            .update(endpoints::FIREWALL_RULE, params.rule_id, &json!({}), &control)
            .await?;
        Ok(mutation_envelope(
            ctx,
            format!(
                "Rule {} moved to position {}",
                params.rule_id, params.new_position
            ),
            &payload,
        ))
    }
}

// ============================================================================
// delete_firewall_rule
// ============================================================================

/// Parameters for rule deletion.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteFirewallRuleParams {
    #[schemars(description = "ID of the rule to delete (as last observed)")]
    pub rule_id: u64,

    #[schemars(description = "Apply the change immediately")]
    #[serde(default = "default_true")]
    pub apply_immediately: bool,
}

/// Delete a rule by ID.
#[derive(Debug, Clone)]
pub struct DeleteFirewallRuleTool;

impl DeleteFirewallRuleTool {
    pub const NAME: &'static str = "delete_firewall_rule";
    pub const DESCRIPTION: &'static str = "Delete a firewall rule by ID. Remaining rule IDs \
        shift afterwards; refresh before further ID-based operations.";
}

#[async_trait]
impl ToolDefinition for DeleteFirewallRuleTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<DeleteFirewallRuleParams>(),
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
        let params: DeleteFirewallRuleParams = parse_params(args)?;
        let control = ControlParameters {
            apply: params.apply_immediately,
            ..Default::default()
        };
        let payload = ctx
            .client
            .delete(endpoints::FIREWALL_RULE, params.rule_id, &control)
            .await?;
        Ok(mutation_envelope(
            ctx,
            format!("Firewall rule {} deleted", params.rule_id),
            &payload,
        ))
    }
}

// ============================================================================
// bulk_block_ips
// ============================================================================

/// Parameters for bulk blocking.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct BulkBlockIpsParams {
    #[schemars(description = "IP addresses to block")]
    pub ip_addresses: Vec<String>,

    #[schemars(description = "Interface to apply the blocks on")]
    #[serde(default = "default_block_interface")]
    pub interface: String,

    #[schemars(description = "Prefix for the generated rule descriptions")]
    #[serde(default = "default_block_prefix")]
    pub description_prefix: String,
}

/// Block a list of IPs, applying once at the end.
#[derive(Debug, Clone)]
pub struct BulkBlockIpsTool;

impl BulkBlockIpsTool {
    pub const NAME: &'static str = "bulk_block_ips";
    pub const DESCRIPTION: &'static str = "Create block rules for multiple IP addresses, \
        staging each and applying all changes once at the end.";
}

#[async_trait]
impl ToolDefinition for BulkBlockIpsTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<BulkBlockIpsParams>(),
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
        let params: BulkBlockIpsParams = parse_params(args)?;
        if params.ip_addresses.is_empty() {
            return Err(crate::api::error::ApiError::configuration(
                "ip_addresses must not be empty",
            ));
        }

        let mut created = Vec::new();
        let mut errors = Vec::new();

        for ip in &params.ip_addresses {
            let rule = json!({
                "interface": params.interface,
                "type": "block",
                "ipprotocol": "inet",
                "protocol": "any",
                "source": ip,
                "destination": "any",
                "descr": format!("{}: {}", params.description_prefix, ip),
                "log": true,
            });
            // Stage without applying; one apply at the end covers the batch.
            match ctx
                .client
                .create(endpoints::FIREWALL_RULE, &rule, &ControlParameters::default())
                .await
            {
                Ok(payload) => created.push(json!({
                    "ip": ip,
                    "rule": extract_data(&payload),
                })),
                Err(e) => {
                    warn!(ip = %ip, error = %e, "failed to stage block rule");
                    errors.push(json!({"ip": ip, "error": e.to_string()}));
                }
            }
        }

        let applied = if created.is_empty() {
            false
        } else {
            match ctx.client.apply_changes().await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "failed to apply staged block rules");
                    false
                }
            }
        };

        let data = json!({
            "total_requested": params.ip_addresses.len(),
            "successful": created.len(),
            "failed": errors.len(),
            "applied": applied,
            "results": created,
            "errors": errors,
        });

        if data["successful"] == json!(0) {
            let mut envelope =
                Envelope::failure("upstream_error", "No block rules could be created");
            envelope.data = Some(data);
            return Ok(envelope);
        }
        Ok(Envelope::ok(format!(
            "Blocked {} of {} address(es)",
            data["successful"], data["total_requested"]
        ))
        .with_data(data))
    }
}

// ============================================================================
// apply_firewall_changes
// ============================================================================

/// Parameters for applying staged changes (none).
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ApplyFirewallChangesParams {}

/// Apply all staged firewall changes.
#[derive(Debug, Clone)]
pub struct ApplyFirewallChangesTool;

impl ApplyFirewallChangesTool {
    pub const NAME: &'static str = "apply_firewall_changes";
    pub const DESCRIPTION: &'static str =
        "Apply all staged firewall changes to the running configuration.";
}

#[async_trait]
impl ToolDefinition for ApplyFirewallChangesTool {
    fn tool(&self) -> Tool {
        Tool {
            name: Self::NAME.into(),
            description: Some(Self::DESCRIPTION.into()),
            input_schema: cached_schema_for_type::<ApplyFirewallChangesParams>(),
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
        let _params: ApplyFirewallChangesParams = parse_params(args)?;
        let payload = ctx.client.apply_changes().await?;
        Ok(mutation_envelope(ctx, "Firewall changes applied", &payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_params_defaults() {
        let params: SearchFirewallRulesParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.page, 1);
        assert_eq!(params.sort_by, "sequence");
        assert!(params.interface.is_none());
    }

    #[test]
    fn test_create_params_required_fields() {
        let result: Result<CreateFirewallRuleParams, _> =
            serde_json::from_value(json!({"interface": "wan"}));
        assert!(result.is_err());

        let params: CreateFirewallRuleParams = serde_json::from_value(json!({
            "interface": "wan", "rule_type": "block", "protocol": "tcp",
            "source": "10.0.0.1", "destination": "any"
        }))
        .unwrap();
        assert!(params.apply_immediately);
        assert!(params.log_matches);
        assert!(params.position.is_none());
    }

    #[test]
    fn test_bulk_params_defaults() {
        let params: BulkBlockIpsParams =
            serde_json::from_value(json!({"ip_addresses": ["1.2.3.4"]})).unwrap();
        assert_eq!(params.interface, "wan");
        assert_eq!(params.description_prefix, "Bulk block");
    }

    #[test]
    fn test_move_params() {
        let params: MoveFirewallRuleParams =
            serde_json::from_value(json!({"rule_id": 7, "new_position": 0})).unwrap();
        assert_eq!(params.rule_id, 7);
        assert_eq!(params.new_position, 0);
        assert!(params.apply_immediately);
    }
}

//! Tool Registry - the explicit mapping from tool name to definition.
//!
//! Each definition carries its rmcp `Tool` metadata (name, description,
//! argument schema), its minimum access level, and its handler. The
//! registry is built once at startup and iterated for listing; dispatch
//! looks definitions up by name. Nothing is registered implicitly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::Tool;
use serde_json::Value;

use super::definitions::{
    AnalyzeBlockedTrafficTool, ApiCapabilitiesTool, ApplyFirewallChangesTool, BulkBlockIpsTool,
    CreateAliasTool, CreateFirewallRuleTool, DeleteFirewallRuleTool, FindBlockedRulesTool,
    FindObjectByFieldTool, FollowApiLinkTool, ManageAliasAddressesTool, MoveFirewallRuleTool,
    RefreshObjectIdsTool, SearchAliasesTool, SearchDhcpLeasesTool, SearchFirewallLogsTool,
    SearchFirewallRulesTool, SearchInterfacesTool, SystemStatusTool, TestConnectionTool,
    UpdateFirewallRuleTool,
};
use super::error::ToolError;
use crate::api::FirewallClient;
use crate::api::envelope::Envelope;
use crate::api::error::ApiResult;
use crate::core::config::QueryConfig;
use crate::core::security::AccessLevel;

/// Shared state handed to every tool handler.
pub struct ToolContext {
    pub client: Arc<FirewallClient>,
    pub query: QueryConfig,
}

/// A callable tool: schema, permission requirement, and handler.
#[async_trait]
pub trait ToolDefinition: Send + Sync {
    /// rmcp metadata: name, description, input schema.
    fn tool(&self) -> Tool;

    /// Minimum access level required to invoke this tool.
    fn min_access(&self) -> AccessLevel;

    /// Execute the tool. Argument parsing happens inside so every tool
    /// reports bad input through the same envelope path.
    async fn execute(&self, ctx: &ToolContext, args: Value) -> ApiResult<Envelope>;
}

impl std::fmt::Debug for dyn ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ToolDefinition({})", self.tool().name)
    }
}

/// Name-indexed registry of all available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolDefinition>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool definition under its declared name.
    pub fn register(&mut self, definition: Arc<dyn ToolDefinition>) {
        let name = definition.tool().name.to_string();
        if self.tools.insert(name.clone(), definition).is_none() {
            self.order.push(name);
        }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ToolDefinition>, ToolError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// All tool metadata in registration order, for listing.
    pub fn list_tools(&self) -> Vec<Tool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|d| d.tool())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the registry with every tool this server exposes.
pub fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // System
    registry.register(Arc::new(SystemStatusTool));
    registry.register(Arc::new(ApiCapabilitiesTool));
    registry.register(Arc::new(TestConnectionTool));

    // Interfaces
    registry.register(Arc::new(SearchInterfacesTool));

    // Firewall rules
    registry.register(Arc::new(SearchFirewallRulesTool));
    registry.register(Arc::new(FindBlockedRulesTool));
    registry.register(Arc::new(CreateFirewallRuleTool));
    registry.register(Arc::new(UpdateFirewallRuleTool));
    registry.register(Arc::new(MoveFirewallRuleTool));
    registry.register(Arc::new(DeleteFirewallRuleTool));
    registry.register(Arc::new(BulkBlockIpsTool));
    registry.register(Arc::new(ApplyFirewallChangesTool));

    // Aliases
    registry.register(Arc::new(SearchAliasesTool));
    registry.register(Arc::new(CreateAliasTool));
    registry.register(Arc::new(ManageAliasAddressesTool));

    // Logs
    registry.register(Arc::new(SearchFirewallLogsTool));
    registry.register(Arc::new(AnalyzeBlockedTrafficTool));

    // DHCP
    registry.register(Arc::new(SearchDhcpLeasesTool));

    // Navigation and object identity
    registry.register(Arc::new(FollowApiLinkTool));
    registry.register(Arc::new(RefreshObjectIdsTool));
    registry.register(Arc::new(FindObjectByFieldTool));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_contains_all_tools() {
        let registry = build_registry();
        assert_eq!(registry.len(), 21);
        for name in [
            "system_status",
            "api_capabilities",
            "test_connection",
            "search_interfaces",
            "search_firewall_rules",
            "find_blocked_rules",
            "create_firewall_rule",
            "update_firewall_rule",
            "move_firewall_rule",
            "delete_firewall_rule",
            "bulk_block_ips",
            "apply_firewall_changes",
            "search_aliases",
            "create_alias",
            "manage_alias_addresses",
            "search_firewall_logs",
            "analyze_blocked_traffic",
            "search_dhcp_leases",
            "follow_api_link",
            "refresh_object_ids",
            "find_object_by_field",
        ] {
            assert!(registry.contains(name), "missing tool {name}");
        }
    }

    #[test]
    fn test_unknown_tool_is_not_found() {
        let registry = build_registry();
        let err = registry.get("reboot_firewall").unwrap_err();
        assert_eq!(err.kind(), "tool_not_found");
    }

    #[test]
    fn test_listing_matches_names() {
        let registry = build_registry();
        let listed: Vec<String> = registry
            .list_tools()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        let names: Vec<String> = registry.names().iter().map(|n| n.to_string()).collect();
        assert_eq!(listed, names);
    }

    #[test]
    fn test_every_tool_has_description_and_schema() {
        let registry = build_registry();
        for tool in registry.list_tools() {
            assert!(tool.description.is_some(), "{} lacks description", tool.name);
            assert!(
                !tool.input_schema.is_empty(),
                "{} lacks an input schema",
                tool.name
            );
        }
    }

    #[test]
    fn test_write_tools_require_security_write() {
        let registry = build_registry();
        for name in [
            "create_firewall_rule",
            "update_firewall_rule",
            "move_firewall_rule",
            "delete_firewall_rule",
            "bulk_block_ips",
            "apply_firewall_changes",
            "create_alias",
            "manage_alias_addresses",
        ] {
            let tool = registry.get(name).unwrap();
            assert_eq!(
                tool.min_access(),
                AccessLevel::SecurityWrite,
                "{name} should require SECURITY_WRITE"
            );
        }
    }

    #[test]
    fn test_compliance_tools_require_compliance_read() {
        let registry = build_registry();
        for name in ["search_firewall_logs", "analyze_blocked_traffic"] {
            let tool = registry.get(name).unwrap();
            assert_eq!(tool.min_access(), AccessLevel::ComplianceRead);
        }
    }
}

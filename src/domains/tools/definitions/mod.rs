//! Tool definitions, grouped per upstream domain.
//!
//! Each file holds the tools for one area of the firewall API; `common`
//! carries the parameter and envelope helpers they share.

pub mod aliases;
pub mod common;
pub mod dhcp;
pub mod interfaces;
pub mod logs;
pub mod navigate;
pub mod rules;
pub mod system;

pub use aliases::{CreateAliasTool, ManageAliasAddressesTool, SearchAliasesTool};
pub use dhcp::SearchDhcpLeasesTool;
pub use interfaces::SearchInterfacesTool;
pub use logs::{AnalyzeBlockedTrafficTool, SearchFirewallLogsTool};
pub use navigate::{FindObjectByFieldTool, FollowApiLinkTool, RefreshObjectIdsTool};
pub use rules::{
    ApplyFirewallChangesTool, BulkBlockIpsTool, CreateFirewallRuleTool, DeleteFirewallRuleTool,
    FindBlockedRulesTool, MoveFirewallRuleTool, SearchFirewallRulesTool, UpdateFirewallRuleTool,
};
pub use system::{ApiCapabilitiesTool, SystemStatusTool, TestConnectionTool};

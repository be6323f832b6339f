//! Firewall MCP Server Library
//!
//! This crate exposes a firewall appliance's REST management API as a set
//! of access-controlled MCP tools.
//!
//! # Architecture
//!
//! - **core**: configuration, unified error handling, access control,
//!   audit, the MCP server handler, and the transport layer
//! - **api**: the upstream API client: query model, local filter/sort
//!   engine, multi-scheme authentication, retrying HTTP transport,
//!   response envelope, and TTL cache
//! - **domains::tools**: the explicit tool registry and the dispatcher
//!   that guards every invocation
//!
//! # Example
//!
//! ```rust,no_run
//! use firewall_mcp_server::core::{Config, McpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let server = McpServer::new(config)?;
//!     // Hand the server to a transport...
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, McpServer, Result};

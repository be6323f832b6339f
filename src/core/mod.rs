//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the MCP
//! server: configuration, unified error handling, access control, audit,
//! server lifecycle management, and the transport layer.

pub mod audit;
pub mod config;
pub mod error;
pub mod security;
pub mod server;
pub mod transport;

pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use config::Config;
pub use error::{Error, Result};
pub use security::{AccessLevel, SecurityContext};
pub use server::McpServer;
pub use transport::{TransportConfig, TransportService};

//! MCP server implementation and lifecycle management.
//!
//! The handler exposes exactly one capability, tools, and routes every
//! call through the [`Dispatcher`]: permission check, rate limit,
//! invocation timeout, audit event, then the tool itself. Tool listing
//! comes from the explicit registry built at startup.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, model::*, service::RequestContext,
};
use serde_json::Value;
use tracing::{info, instrument};

use super::audit::{AuditSink, TracingAuditSink};
use super::config::Config;
use super::error::Result;
use super::security::SecurityContext;
use crate::api::FirewallClient;
use crate::domains::tools::{Dispatcher, ToolContext, build_registry};

/// The main MCP server handler.
#[derive(Clone)]
pub struct McpServer {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
}

impl McpServer {
    /// Build the server: upstream client, tool registry, and dispatcher.
    /// Fails when the upstream configuration cannot produce a client.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_audit_sink(config, Arc::new(TracingAuditSink))
    }

    /// Like [`McpServer::new`] with a caller-supplied audit sink.
    pub fn with_audit_sink(config: Config, audit: Arc<dyn AuditSink>) -> Result<Self> {
        let client = Arc::new(FirewallClient::new(&config.upstream)?);
        let security = SecurityContext::new(
            config.dispatch.user_id.clone(),
            config.dispatch.access_level,
        );
        let dispatcher = Dispatcher::new(
            build_registry(),
            ToolContext {
                client,
                query: config.query.clone(),
            },
            security,
            audit,
            config.dispatch.clone(),
        );

        info!(
            tools = dispatcher.registry().len(),
            access_level = %config.dispatch.access_level,
            "server initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    /// The dispatcher behind this server, for transports that route
    /// tool calls outside the rmcp handler.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Firewall management tools backed by the appliance's REST API. Read tools \
                 require READ_ONLY access, log analysis COMPLIANCE_READ, and mutations \
                 SECURITY_WRITE; every response uses a uniform envelope."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    #[instrument(skip(self, _context))]
    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.dispatcher.registry().list_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    #[instrument(skip(self, request, _context), fields(tool = %request.name))]
    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let args = request
            .arguments
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(Default::default()));

        let envelope = self.dispatcher.dispatch(&request.name, args).await;
        let is_error = !envelope.success;
        let summary = envelope.message.clone();
        let structured = serde_json::to_value(&envelope)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult {
            content: vec![Content::text(summary)],
            structured_content: Some(structured),
            is_error: Some(is_error),
            meta: None,
        })
    }
}

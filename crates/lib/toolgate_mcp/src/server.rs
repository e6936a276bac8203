// @zen-component: MCP-Server
//
//! MCP server handler: lists the catalog and routes calls through the
//! execution middleware.

use std::sync::Arc;

use rmcp::{
    RoleServer, ServerHandler,
    model::*,
    service::RequestContext,
};
use tracing::debug;

use toolgate_core::dispatch::ResultEnvelope;
use toolgate_core::execution::{ANONYMOUS_CLIENT, ToolCall, ToolExecutor};

use crate::auth::McpClient;
use crate::schema::tool_definition;

/// Toolgate MCP server handler.
///
/// A new instance is created per MCP session by the `StreamableHttpService`
/// factory; all instances share one [`ToolExecutor`].
#[derive(Clone)]
pub struct ToolgateMcpServer {
    executor: Arc<ToolExecutor>,
}

/// Client id of the authenticated principal, if the HTTP auth middleware
/// put one on the request.
fn client_id(context: &RequestContext<RoleServer>) -> String {
    context
        .extensions
        .get::<http::request::Parts>()
        .and_then(|parts| parts.extensions.get::<McpClient>())
        .map(|client| client.id.clone())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

/// Envelope → tool result; failed envelopes become tool errors.
pub fn envelope_result(envelope: &ResultEnvelope) -> CallToolResult {
    let value = serde_json::to_value(envelope).unwrap_or_else(|e| {
        serde_json::json!({
            "success": false,
            "count": 0,
            "documents": [],
            "error": format!("Failed to encode result: {e}"),
        })
    });
    if envelope.success {
        CallToolResult::structured(value)
    } else {
        CallToolResult::structured_error(value)
    }
}

impl ToolgateMcpServer {
    pub fn new(executor: Arc<ToolExecutor>) -> Self {
        Self { executor }
    }

    /// Tool definitions in catalog order.
    pub fn tools(&self) -> Vec<Tool> {
        self.executor.catalog().iter().map(|spec| tool_definition(spec)).collect()
    }

    /// Run one call as `client_id`.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
        client_id: String,
    ) -> CallToolResult {
        let call = ToolCall::new(name, arguments.unwrap_or_default()).with_client(client_id);
        let invocation = self.executor.execute(call).await;
        envelope_result(&invocation.envelope)
    }
}

impl ServerHandler for ToolgateMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Toolgate MCP server: declarative data-query tools backed by collections and tables"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let client_id = client_id(&context);
        debug!(tool = %request.name, client = %client_id, "MCP tool call");
        Ok(self.call(&request.name, request.arguments, client_id).await)
    }
}

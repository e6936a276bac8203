//! # toolgate_mcp
//!
//! MCP (Model Context Protocol) surface for Toolgate.
//!
//! Serves the loaded catalog as MCP tools, either over Streamable HTTP with
//! bearer token authentication or over stdio. Every call is handed to the
//! [`ToolExecutor`]; the binary crate `toolgate_server` picks the transport.

pub mod auth;
pub mod schema;
pub mod server;

use std::sync::Arc;

use rmcp::ServiceExt;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use toolgate_core::execution::ToolExecutor;

pub use auth::{McpAuth, McpClient};
pub use server::ToolgateMcpServer;

/// Errors raised while serving MCP.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("MCP session failed to initialize: {0}")]
    Initialize(String),

    #[error("MCP session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Build an Axum router that serves the MCP Streamable HTTP endpoint at `/mcp`.
///
/// Requests pass through [`auth::mcp_auth_middleware`] first. `ct` cancels
/// open SSE streams on shutdown.
pub fn mcp_router(executor: Arc<ToolExecutor>, auth: McpAuth, ct: CancellationToken) -> axum::Router {
    let service: StreamableHttpService<ToolgateMcpServer, LocalSessionManager> =
        StreamableHttpService::new(
            move || Ok(ToolgateMcpServer::new(executor.clone())),
            Arc::new(LocalSessionManager::default()),
            StreamableHttpServerConfig {
                stateful_mode: true,
                cancellation_token: ct,
                ..Default::default()
            },
        );

    axum::Router::new()
        .nest_service("/mcp", service)
        .layer(axum::middleware::from_fn_with_state(
            Arc::new(auth),
            auth::mcp_auth_middleware,
        ))
}

/// Serve one MCP session on stdin/stdout until the client disconnects.
pub async fn serve_stdio(executor: Arc<ToolExecutor>) -> Result<(), ServeError> {
    info!("serving MCP over stdio");
    let running = ToolgateMcpServer::new(executor)
        .serve(rmcp::transport::stdio())
        .await
        .map_err(|e| ServeError::Initialize(e.to_string()))?;
    let reason = running.waiting().await?;
    info!(?reason, "stdio session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}

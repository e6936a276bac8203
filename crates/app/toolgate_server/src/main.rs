//! Toolgate MCP server binary.
//!
//! Loads the tool catalog, connects the Data API store, and serves the tools
//! over stdio or Streamable HTTP.

pub use self::error::{Error, Result};
mod error;

mod config;
mod logging;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use toolgate_core::audit::{AuditRecorder, StoreAuditSink};
use toolgate_core::catalog::Catalog;
use toolgate_core::dispatch::Dispatcher;
use toolgate_core::embedding::ProviderEmbedder;
use toolgate_core::execution::ToolExecutor;
use toolgate_core::query::Compiler;
use toolgate_core::store::{DataApiClient, Databases};
use toolgate_mcp::McpAuth;

use config::{Args, EnvOverrides, LogSettings, ServerConfig, Settings, Transport};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        match e {
            Error::Logging(_) => eprintln!("toolgate: {e}"),
            _ => error!("{e}"),
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let overrides = EnvOverrides::parse(&args.env);
    let process_env = |key: &str| std::env::var(key).ok();
    let settings = Settings::new(&overrides, &process_env);

    logging::init(&LogSettings::resolve(&args, &settings))?;
    overrides.report();

    let config = ServerConfig::resolve(args, &settings)?;
    info!(
        transport = ?config.transport,
        database = config.store.database.as_deref().unwrap_or("<from endpoint>"),
        keyspace = %config.store.keyspace,
        "starting toolgate"
    );

    let file_catalog = match &config.catalog_file {
        Some(path) => Some(Catalog::from_file(path).await?),
        None => None,
    };

    let client = DataApiClient::new(config.store.clone()).await?;
    let databases = Arc::new(Databases::new(Arc::new(client)));

    let catalog = match file_catalog {
        Some(catalog) => catalog,
        None => {
            let db = databases.get(None).await?;
            Catalog::from_store(db.as_ref(), &config.catalog_collection, &config.tags).await?
        }
    }
    .ensure_not_empty()?;
    info!(tools = catalog.len(), "catalog ready");

    let recorder = if config.audit {
        AuditRecorder::new(Arc::new(StoreAuditSink::new(
            databases.clone(),
            config.audit_table.clone(),
        )))
        .await
    } else {
        info!("audit trail disabled");
        AuditRecorder::disabled()
    };

    let executor = Arc::new(ToolExecutor::new(
        Arc::new(catalog),
        Compiler::new(Arc::new(ProviderEmbedder::new(config.embedding.clone()))),
        Dispatcher::new(databases),
        recorder,
    ));

    match config.transport {
        Transport::Stdio => toolgate_mcp::serve_stdio(executor).await?,
        Transport::Http => serve_http(&config, executor).await?,
    }
    Ok(())
}

async fn serve_http(config: &ServerConfig, executor: Arc<ToolExecutor>) -> Result<()> {
    let auth = match (&config.server_token, config.auth) {
        (Some(token), true) => McpAuth::bearer(token.clone()),
        _ => McpAuth::disabled(),
    };
    if !auth.is_enabled() {
        info!("HTTP authentication disabled");
    }

    let ct = CancellationToken::new();
    let app = toolgate_mcp::mcp_router(executor, auth, ct.clone());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(addr = %listener.local_addr()?, "MCP server listening on /mcp");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            ct.cancel();
        })
        .await?;
    Ok(())
}

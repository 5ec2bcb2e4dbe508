//! Server wiring for the HTTP and MCP stdio transports.
//!
//! Both entry points open the store and build one [`MedService`]. The HTTP server
//! also runs the notification [`Scheduler`] and stops it on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::ServiceExt;
use tokio::sync::watch;

use crate::api;
use crate::config::DoselogConfig;
use crate::db;
use crate::notify;
use crate::scheduler::Scheduler;
use crate::service::MedService;
use crate::tools::DoselogTools;

/// Shared setup: open the store and build the service.
fn setup_service(config: &DoselogConfig) -> Result<Arc<MedService>> {
    let db_path = config.resolved_db_path();
    let store = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    Ok(Arc::new(MedService::new(
        Arc::new(store),
        config.api.clone(),
        config.scheduler.window_months,
    )))
}

/// Serve the HTTP API, with the scheduler running alongside.
pub async fn serve_http(config: DoselogConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let service = setup_service(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = if config.scheduler.enabled {
        let notifier = notify::create_notifier(&config.notify)?;
        tracing::info!(provider = notifier.name(), "notifier ready");
        let scheduler = Scheduler::new(Arc::clone(&service), notifier, config.scheduler.clone());
        Some(tokio::spawn(scheduler.run(shutdown_rx)))
    } else {
        tracing::info!("scheduler disabled");
        None
    };

    let router = api::router(service);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "doselog listening at http://{bind_addr}/meds");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = scheduler {
        handle.await.context("scheduler task panicked")?;
    }
    Ok(())
}

/// Serve the MCP tools over stdio. The scheduler does not run in this mode.
pub async fn serve_stdio(config: DoselogConfig) -> Result<()> {
    tracing::info!("starting doselog MCP server on stdio");

    let service = setup_service(&config)?;
    let tools = DoselogTools::new(service);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

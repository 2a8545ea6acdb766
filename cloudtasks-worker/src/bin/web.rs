//! CloudTasks Web Server - webhook receiver for Cloud Tasks deliveries.
//!
//! This binary:
//! - Declares the queues listed in `CLOUD_TASKS_QUEUES`
//! - Registers a `log` handler on each of them
//! - Serves the authenticated webhook endpoint plus `/health`

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cloudtasks::web::health_router;
use cloudtasks::{handler_fn, QueueOrchestrator, RestConnector, Settings, TokenInfoVerifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    let settings = Settings::from_env();
    info!(
        port = settings.port,
        project = %settings.tasks.project,
        location = %settings.tasks.location,
        handler_path = %settings.tasks.handler_path,
        service_account_configured = settings.tasks.service_account.is_some(),
        static_access_token = settings.access_token.is_some(),
        queues = ?settings.queues,
        "config_loaded"
    );

    let connector = Arc::new(RestConnector::new(
        settings.tasks_api_url.clone(),
        settings.access_token.clone(),
    ));
    let orchestrator = Arc::new(
        QueueOrchestrator::new(settings.tasks.clone(), connector)
            .context("Invalid Cloud Tasks configuration")?,
    );

    for name in &settings.queues {
        let queue = orchestrator
            .add_queue(name, None)
            .with_context(|| format!("Failed to declare queue '{}'", name))?;
        let queue_name = name.clone();
        queue.add_handler(
            "log",
            handler_fn(move |args| {
                let queue_name = queue_name.clone();
                async move {
                    info!(queue = %queue_name, args = ?args, "log_handler_invoked");
                    Ok(())
                }
            }),
        );
    }

    let verifier = Arc::new(TokenInfoVerifier::new(
        reqwest::Client::new(),
        settings.tokeninfo_url.clone(),
    ));

    // Build the router
    let app = orchestrator
        .router(verifier)
        .context("Failed to build webhook router")?
        .merge(health_router())
        .layer(TraceLayer::new_for_http());

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}

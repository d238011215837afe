mod api;
mod bootstrap;
mod health;

use std::time::Duration;

use anyhow::{Context, Result};
use marketrank_core::config::LoadOptions;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging has to be up before bootstrap emits anything.
    let config = bootstrap::load_config(LoadOptions::default())?;
    bootstrap::init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let server = &app.config.server;
    let address = format!("{}:{}", server.bind_address, server.port);
    let grace = Duration::from_secs(server.graceful_shutdown_secs);

    let router = health::router(app.db_pool.clone())
        .merge(api::router(api::ApiState::from_pool(app.db_pool.clone(), &app.config)));

    let listener =
        TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        "marketrank-server listening"
    );

    let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
    let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
        wait_for_shutdown().await;
        let _ = stopping_tx.send(());
    });
    let serve = tokio::spawn(async move { serve.await });
    let abort = serve.abort_handle();

    tokio::select! {
        result = serve => {
            result.context("server task panicked")??;
        }
        _ = async {
            if stopping_rx.await.is_ok() {
                tracing::info!(
                    event_name = "system.server.stopping",
                    correlation_id = "shutdown",
                    grace_secs = grace.as_secs(),
                    "draining in-flight requests"
                );
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            tracing::warn!(
                event_name = "system.server.shutdown_timeout",
                correlation_id = "shutdown",
                "graceful shutdown window elapsed, aborting open connections"
            );
            abort.abort();
        }
    }

    app.db_pool.close().await;
    tracing::info!(
        event_name = "system.server.stopped",
        correlation_id = "shutdown",
        "marketrank-server stopped"
    );
    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_failed",
            error = %error,
            "failed to listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
}

mod bootstrap;
mod dispatcher;
mod health;
mod orchestrator;
mod replies;
mod webhook;

use std::time::Duration;

use anyhow::Result;

use agendai_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use agendai_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    tokio::spawn(app.dispatcher.clone().run());
    webhook::spawn_limiter_sweep(app.webhook_state.clone(), Duration::from_secs(300));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "server.started",
        bind_address = %address,
        "agendai-server listening for webhook deliveries"
    );

    let router = webhook::router(app.webhook_state.clone());
    tokio::select! {
        served = axum::serve(listener, router) => {
            served?;
        }
        shutdown = wait_for_shutdown() => {
            shutdown?;
        }
    }

    tracing::info!(event_name = "server.stopping", "agendai-server stopping");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

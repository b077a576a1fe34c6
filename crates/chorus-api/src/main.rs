//! Chorus CLI and REST API entry point.
//!
//! Binary name: `chorus`
//!
//! Parses CLI arguments, sets up logging, loads configuration, then
//! dispatches to the requested command.

mod cli;
mod http;
mod state;

use clap::Parser;

use chorus_infra::config::load_config;
use chorus_infra::sqlite::pool::DatabasePool;
use chorus_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut tracing_options = TracingOptions::from_verbosity(cli.verbose, cli.quiet);
    tracing_options.json = cli.log_json;
    tracing_options.otel = cli.otel;
    init_tracing(&tracing_options)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            let addr = format!("{}:{}", config.server.host, config.server.port);

            let state = AppState::init(config).await?;
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "Chorus API listening");

            let router = http::router::build_router(state);
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            tracing::info!("server stopped");
        }

        Commands::Migrate => {
            DatabasePool::new(&config.database.url).await?;
            println!("Database migrations applied ({}).", config.database.url);
        }

        Commands::Providers { check } => {
            cli::provider::list_providers(&config, check).await?;
        }
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

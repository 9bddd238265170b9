//! pondmetrics HTTP server
//!
//! Registers the demo instruments, starts the simulated workload and serves
//! the registry at `GET /metrics` until Ctrl-C or SIGTERM.

use clap::Parser;
use pondmetrics::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    handlers::{self, AppState},
    metrics::Registry,
    telemetry,
    workload,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref().map(Path::new))?;
    if let Some(listen_address) = cli.listen_address {
        config = config.with_listen_address(listen_address)?;
    }

    telemetry::init(&config.observability.log_level);

    let registry = Arc::new(Registry::new());
    let (_demo, workload) = workload::start(&registry, &config.workload)?;

    let app = handlers::router(AppState::new(Arc::clone(&registry)));

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        address = %addr,
        families = registry.len(),
        "Serving metrics at http://{}/metrics",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(workload) = workload {
        workload.shutdown().await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
    tracing::info!("Signal received, starting graceful shutdown");
}

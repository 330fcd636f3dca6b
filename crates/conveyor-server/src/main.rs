//! # Conveyor Server
//!
//! Main entry point: loads configuration, connects to PostgreSQL, starts the
//! worker pool and serves the job administration API until SIGINT/SIGTERM.

use conveyor_config::ConfigLoader;
use conveyor_core::{init_logging, ConveyorResult};
use conveyor_server::{
    install_metrics_recorder,
    startup::{print_banner, print_startup_info},
    AppBuilder,
};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Application error: {}", e);
        eprintln!("conveyor-server: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> ConveyorResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    init_logging(&config.observability.logging())?;
    print_banner();

    info!("Starting Conveyor server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    let mut builder = AppBuilder::new().with_config(config.clone());
    if config.observability.metrics_enabled {
        builder = builder.with_metrics(install_metrics_recorder()?);
    }

    let app = builder.build().await?;
    print_startup_info(&config);

    app.run(shutdown_signal()).await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}

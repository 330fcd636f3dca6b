//! Server startup utilities.

use conveyor_config::AppConfig;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
   ______
  / ____/___  ____ _   _____  __  ______  _____
 / /   / __ \/ __ \ | / / _ \/ / / / __ \/ ___/
/ /___/ /_/ / / / / |/ /  __/ /_/ / /_/ / /
\____/\____/_/ /_/|___/\___/\__, /\____/_/
                           /____/
    "#);
}

/// Prints server startup information.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    let addr = config.server.addr();
    info!("{}", separator);
    info!("Jobs API:  http://{}/jobs", addr);
    info!("Health:    http://{}/health", addr);
    if config.observability.metrics_enabled {
        info!("Metrics:   http://{}{}", addr, config.observability.metrics_path);
    }
    info!(
        "Workers:   {} slots, poll every {} ms",
        config.jobs.worker.max_concurrent, config.jobs.worker.poll_interval_ms
    );
    info!("{}", separator);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_print_startup_info_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_startup_info(&AppConfig::default());
    }

    #[test]
    fn test_print_startup_info_without_metrics() {
        let _ = tracing_subscriber::fmt::try_init();
        let mut config = AppConfig::default();
        config.observability.metrics_enabled = false;
        print_startup_info(&config);
    }
}

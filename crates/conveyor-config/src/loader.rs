//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File};
use conveyor_core::ConveyorError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Environment variable prefix for overrides, e.g. `CONVEYOR_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "CONVEYOR";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `CONVEYOR_` prefix and `__` separator
    pub fn new(config_dir: impl Into<PathBuf>) -> Result<Self, ConveyorError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, ConveyorError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), ConveyorError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &Path) -> Result<AppConfig, ConveyorError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var("CONVEYOR_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = config_dir.join(format!("{}.toml", name));
            if path.exists() {
                debug!("Loading config from: {}", path.display());
                builder = builder.add_source(File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_conveyor_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_conveyor_error)?;

        validate_config(&app_config)?;

        Ok(app_config)
    }
}

/// Validates the configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), ConveyorError> {
    if config.database.url.is_empty() {
        return Err(ConveyorError::Configuration(
            "Database URL is required".to_string(),
        ));
    }

    if config.database.min_connections > config.database.max_connections {
        return Err(ConveyorError::Configuration(
            "database.min_connections must not exceed max_connections".to_string(),
        ));
    }

    config
        .jobs
        .validate()
        .map_err(|e| ConveyorError::Configuration(e.to_string()))?;

    if config.app.environment == "production" && config.observability.log_level == "trace" {
        warn!("Trace logging enabled in production");
    }

    Ok(())
}

fn config_error_to_conveyor_error(err: ConfigError) -> ConveyorError {
    ConveyorError::Configuration(err.to_string())
}

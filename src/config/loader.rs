//! Configuration Loader
//!
//! Environment-aware layered loading. Sources are merged lowest to highest:
//!
//! 1. Built-in defaults ([`EngineConfig::default`])
//! 2. `relay-engine.toml` in the configuration directory (optional)
//! 3. `relay-engine.{environment}.toml` in the configuration directory (optional)
//! 4. `RELAY_<SECTION>__<KEY>` environment variables, e.g. `RELAY_QUEUES__MAIN__CAPACITY=500`
//!    or `RELAY_DISPATCH__ENDPOINTS=http://a,http://b`

use config::{Config, Environment, File, FileFormat};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::EngineConfig;

const CONFIG_FILE_STEM: &str = "relay-engine";
const ENV_PREFIX: &str = "RELAY";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: EngineConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection from `./config`
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_with_overrides(config_dir, environment, None)
    }

    /// Load with an explicit map standing in for the process environment.
    ///
    /// Keys use the same `RELAY_SECTION__KEY` spelling as real environment variables.
    /// Passing `None` reads the process environment.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading engine configuration"
        );

        let config = Self::build(&config_directory, environment, env_overrides)?;
        config.validate()?;

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            endpoints = config.dispatch.endpoints.len(),
            workers = config.workers.total(),
            "⚙️ Engine configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding applications)
    pub fn from_config(config: EngineConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::from("config"),
        }))
    }

    fn build(
        config_directory: &Path,
        environment: &str,
        env_overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<EngineConfig> {
        let base_file = config_directory.join(format!("{CONFIG_FILE_STEM}.toml"));
        let env_file = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml"));

        let defaults = Config::try_from(&EngineConfig::default())
            .map_err(|e| ConfigurationError::load_error(environment, e))?;

        let environment_source = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("dispatch.endpoints")
            .try_parsing(true)
            .source(env_overrides.map(|vars| vars.into_iter().collect::<config::Map<_, _>>()));

        Config::builder()
            .add_source(defaults)
            .add_source(File::new(&base_file.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(File::new(&env_file.to_string_lossy(), FileFormat::Toml).required(false))
            .add_source(environment_source)
            .build()
            .and_then(|layered| layered.try_deserialize::<EngineConfig>())
            .map_err(|e| ConfigurationError::load_error(environment, e))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with endpoint query strings masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Endpoint URLs may carry credentials in their query string
    fn sanitize_config_for_logging(config: &EngineConfig) -> serde_json::Value {
        let mut sanitized = config.clone();
        for endpoint in sanitized.dispatch.endpoints.iter_mut() {
            if let Some((address, _query)) = endpoint.split_once('?') {
                *endpoint = format!("{address}?[MASKED]");
            }
        }
        serde_json::json!(sanitized)
    }

    /// Detect current environment: RELAY_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("RELAY_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

//! Configuration Loader
//!
//! Environment-aware configuration loading. A single optional TOML file is
//! layered under `OBSERVER__`-prefixed environment overrides, e.g.
//! `OBSERVER__MANAGER__LOOP_SLEEP_SECONDS=10`.

use super::error::{ConfigResult, ConfigurationError};
use super::{AgentConfig, SettingsSnapshot};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_PATH_ENV: &str = "OBSERVER_CONFIG_PATH";
const ENVIRONMENT_ENV: &str = "OBSERVER_ENV";
const ENV_OVERRIDE_PREFIX: &str = "OBSERVER";
const DEFAULT_CONFIG_PATH: &str = "config/observer-agent.toml";

/// Loaded, validated agent configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: AgentConfig,
    environment: String,
    source_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific file (or environment overrides only when `None`)
    pub fn load_from_path(path: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_path_with_env(path, &environment)
    }

    /// Load configuration with an explicit environment name.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_path_with_env(
        path: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        debug!(
            environment = %environment,
            path = ?path,
            "Loading observer agent configuration"
        );

        let config = Self::build_config(path.as_deref())?;
        config.validate()?;

        debug!(
            "Configuration loaded successfully: {}",
            serde_json::to_string_pretty(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        info!(
            environment = %environment,
            node_name = %config.manager.node_name,
            observer_sections = config.observers.len(),
            loop_sleep_seconds = config.manager.loop_sleep_seconds,
            "⚙️ CONFIG: Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            source_path: path,
        }))
    }

    /// Build a manager from an already-constructed configuration
    pub fn from_config(config: AgentConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source_path: None,
        }))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Re-read the configuration sources and return a fresh observer snapshot.
    ///
    /// Used to feed the reload channel; the manager-level settings loaded at
    /// startup stay authoritative for the lifetime of the process.
    pub fn reload_snapshot(&self) -> ConfigResult<SettingsSnapshot> {
        let config = Self::build_config(self.source_path.as_deref())?;
        let snapshot = config.snapshot();
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Configuration as JSON with sensitive parameter values masked
    pub fn debug_config(&self) -> serde_json::Value {
        Self::sanitize_config_for_logging(&self.config)
    }

    /// Detect the runtime environment
    pub fn detect_environment() -> String {
        env::var(ENVIRONMENT_ENV).unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_path() -> Option<PathBuf> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    }

    fn build_config(path: Option<&Path>) -> ConfigResult<AgentConfig> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::file_not_found(path));
            }
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_OVERRIDE_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "environment".to_string());

        builder
            .build()
            .and_then(|c| c.try_deserialize::<AgentConfig>())
            .map_err(|e| ConfigurationError::parse_error(source_name, e))
    }

    fn sanitize_config_for_logging(config: &AgentConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        let sensitive_patterns = ["password", "secret", "key", "token", "credential"];
        Self::sanitize_json_recursive(&mut config_json, &sensitive_patterns);
        config_json
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    let is_sensitive = sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern));

                    if is_sensitive && !val.is_object() {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }
}

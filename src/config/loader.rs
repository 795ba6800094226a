//! Configuration loading and layering
//!
//! Precedence order (highest to lowest):
//! 1. Environment variable overrides
//! 2. Root config file
//! 3. Built-in defaults

use super::{paths, schema::Config};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the root config file (if any) with environment overrides applied
    pub fn load() -> Result<Config> {
        Self::load_from(&paths::root_config_path())
    }

    /// Same as `load`, reading `path` instead of the root config file
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is
    /// an error.
    pub fn load_from(path: &Path) -> Result<Config> {
        let config = if path.exists() {
            Self::load_file(path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };
        Ok(Self::apply_env_overrides(config))
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate the root config file
    ///
    /// Fails on invalid YAML, unknown keys, invalid value types and values
    /// that cannot drive the manager.
    pub fn validate() -> Result<()> {
        let config = Self::load().context("Failed to load configuration")?;
        Self::check(&config)
    }

    fn check(config: &Config) -> Result<()> {
        if config.event_buffer == 0 {
            anyhow::bail!("eventBuffer must be greater than 0");
        }
        if config.reconnect_interval_secs == 0 {
            anyhow::bail!("reconnectIntervalSecs must be greater than 0");
        }
        if let Some(path) = &config.kubeconfig {
            if !path.exists() {
                anyhow::bail!("kubeconfig {} does not exist", path.display());
            }
        }
        config
            .log_level
            .parse::<tracing_subscriber::filter::LevelFilter>()
            .map_err(|_| anyhow::anyhow!("logLevel '{}' is not a tracing level", config.log_level))?;
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: Config) -> Config {
        if let Ok(namespace) = std::env::var("KONTEXT_NAMESPACE") {
            config.namespace = (!namespace.is_empty()).then_some(namespace);
        }

        if let Ok(kubeconfig) = std::env::var("KONTEXT_KUBECONFIG") {
            config.kubeconfig = (!kubeconfig.is_empty()).then(|| PathBuf::from(kubeconfig));
        }

        if let Ok(level) = std::env::var("KONTEXT_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Save configuration to a file
    pub fn save(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

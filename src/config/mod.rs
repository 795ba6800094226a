//! Configuration system for kontext
//!
//! A single YAML file plus `KONTEXT_*` environment overrides.

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::Config;

/// Get a configuration value by key
pub fn get_config_value(config: &Config, key: &str) -> anyhow::Result<String> {
    match key {
        "kubeconfig" => Ok(config
            .kubeconfig
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_default()),
        "namespace" => Ok(config.namespace.clone().unwrap_or_default()),
        "reconnectIntervalSecs" => Ok(config.reconnect_interval_secs.to_string()),
        "eventBuffer" => Ok(config.event_buffer.to_string()),
        "logLevel" => Ok(config.log_level.clone()),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

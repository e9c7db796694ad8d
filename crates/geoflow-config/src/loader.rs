//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::{GeoflowConfig, PlannerMode};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full geoflow configuration from YAML file.
///
/// Relative `layers[].path` and `planner.actions_file` entries are resolved
/// against the directory containing the config file.
pub fn load_config(path: &Path) -> Result<GeoflowConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: GeoflowConfig = serde_yaml::from_str(&content)?;
    if let Some(base) = path.parent() {
        for layer in &mut config.layers {
            if layer.path.is_relative() {
                layer.path = base.join(&layer.path);
            }
        }
        if let Some(actions_file) = &mut config.planner.actions_file {
            if actions_file.is_relative() {
                *actions_file = base.join(&*actions_file);
            }
        }
    }
    validate_config(&config)?;
    Ok(config)
}

pub(crate) fn validate_config(config: &GeoflowConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.planner.mode == PlannerMode::Static && config.planner.actions_file.is_none() {
        return Err(ConfigError::Invalid(
            "planner.actions_file is required in static mode".to_string(),
        ));
    }

    if config.planner.mode == PlannerMode::Llm && config.planner.model.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "planner.model must not be empty".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&config.planner.temperature) {
        return Err(ConfigError::Invalid(
            "planner.temperature must be within 0.0..=2.0".to_string(),
        ));
    }

    if config.providers.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "providers.timeout_secs must be > 0".to_string(),
        ));
    }

    if config.providers.endpoint.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "providers.endpoint must not be empty".to_string(),
        ));
    }

    for (index, layer) in config.layers.iter().enumerate() {
        if layer.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "layers[{}].path must not be empty",
                index
            )));
        }
    }

    if config
        .runtime
        .required_operations
        .iter()
        .any(|name| name.trim().is_empty())
    {
        return Err(ConfigError::Invalid(
            "runtime.required_operations entries must not be empty".to_string(),
        ));
    }

    Ok(())
}

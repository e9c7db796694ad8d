//! # Geoflow Config
//!
//! Unified single-file configuration management for geoflow.
//! A single `geoflow.yaml` configures the planner, the LLM provider, the
//! runtime, the layers preloaded into the store and observability settings.

mod loader;
mod providers;

pub use loader::{load_config, ConfigError};
pub use providers::{ApiKeyError, ProviderConfig};

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level configuration schema for geoflow.
#[derive(Debug, Clone, Deserialize)]
pub struct GeoflowConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub providers: ProviderConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Layers loaded into the base store at startup, in order.
    #[serde(default)]
    pub layers: Vec<LayerSource>,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for GeoflowConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            planner: PlannerConfig::default(),
            providers: ProviderConfig::default(),
            runtime: RuntimeConfig::default(),
            layers: Vec::new(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

fn default_app_name() -> String {
    "geoflow".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerMode {
    /// Ask a language model for the action list
    #[default]
    Llm,
    /// Replay a fixed action list from `actions_file`
    Static,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub mode: PlannerMode,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// JSON plan replayed in static mode.
    #[serde(default)]
    pub actions_file: Option<PathBuf>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            mode: PlannerMode::default(),
            model: default_model(),
            temperature: default_temperature(),
            system_prompt: None,
            actions_file: None,
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreScope {
    /// Every session works on its own fork of the preloaded layers
    #[default]
    Session,
    /// All sessions share one store
    Shared,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub store_scope: StoreScope,
    /// Report steps that can never run instead of dropping them.
    #[serde(default = "default_true")]
    pub report_unresolved: bool,
    /// Operations that must be registered before the runtime starts.
    #[serde(default = "default_required_operations")]
    pub required_operations: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store_scope: StoreScope::default(),
            report_unresolved: true,
            required_operations: default_required_operations(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_required_operations() -> Vec<String> {
    [
        "buffer_layer",
        "intersection",
        "union",
        "clip",
        "dissolve",
        "simplify",
        "reproject",
        "point_in_polygon",
    ]
    .iter()
    .map(|name| name.to_string())
    .collect()
}

/// A GeoJSON file to preload.
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSource {
    pub path: PathBuf,
    /// CRS used when the file does not declare one.
    #[serde(default)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

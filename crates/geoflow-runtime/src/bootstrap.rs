use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use geoflow_config::{load_config, ConfigError, GeoflowConfig, LayerSource, ObservabilityConfig};
use geoflow_core::operation::RegistryError;
use geoflow_core::planner::Planner;
use geoflow_core::types::{Crs, Layer, LayerError};
use geoflow_planners::{build_planner, PlannerBuildError};
use geoflow_stores::InMemoryLayerStore;

use crate::orchestrator::{Orchestrator, OrchestratorConfig};

/// Runtime bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("planner build error: {0}")]
    PlannerBuild(#[from] PlannerBuildError),
    #[error("operation registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("cannot read layer file '{path}': {source}")]
    LayerIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse layer file '{path}': {source}")]
    LayerParse { path: PathBuf, source: LayerError },
}

/// Running app bundle created from unified config.
pub struct RuntimeApp {
    pub orchestrator: Orchestrator,
    pub config: GeoflowConfig,
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

impl RuntimeApp {
    /// Create a runnable app from a single `geoflow.yaml`.
    pub fn from_config_path(path: impl AsRef<Path>) -> Result<Self, BootstrapError> {
        let config = load_config(path.as_ref())?;
        Self::from_config(config)
    }

    /// Create a runnable app using the planner selected by `planner.mode`.
    pub fn from_config(config: GeoflowConfig) -> Result<Self, BootstrapError> {
        init_tracing_if_needed(&config.observability);
        let planner = build_planner(&config)?;
        Self::assemble(config, planner)
    }

    /// Create a runnable app around an explicit planner (e.g. a replayed plan).
    pub fn with_planner(
        config: GeoflowConfig,
        planner: Arc<dyn Planner>,
    ) -> Result<Self, BootstrapError> {
        init_tracing_if_needed(&config.observability);
        Self::assemble(config, planner)
    }

    fn assemble(config: GeoflowConfig, planner: Arc<dyn Planner>) -> Result<Self, BootstrapError> {
        let registry = geoflow_ops::builtin_registry();
        registry.ensure_contains(&config.runtime.required_operations)?;

        let layers = load_layers(&config.layers)?;
        let base_store = Arc::new(InMemoryLayerStore::with_layers(layers));

        tracing::info!(
            app = %config.app.name,
            operations = registry.len(),
            layers = config.layers.len(),
            store_scope = ?config.runtime.store_scope,
            report_unresolved = config.runtime.report_unresolved,
            "runtime assembled"
        );

        let orchestrator = Orchestrator::with_config(
            planner,
            Arc::new(registry),
            base_store,
            OrchestratorConfig {
                store_scope: config.runtime.store_scope,
                report_unresolved: config.runtime.report_unresolved,
            },
        );
        Ok(Self {
            orchestrator,
            config,
        })
    }
}

/// Read every configured layer file, in order.
pub fn load_layers(sources: &[LayerSource]) -> Result<Vec<Layer>, BootstrapError> {
    let mut layers = Vec::with_capacity(sources.len());
    for source in sources {
        layers.push(load_layer(source)?);
    }
    Ok(layers)
}

fn load_layer(source: &LayerSource) -> Result<Layer, BootstrapError> {
    let text = std::fs::read_to_string(&source.path).map_err(|e| BootstrapError::LayerIo {
        path: source.path.clone(),
        source: e,
    })?;
    let default_crs = source.crs.as_deref().map(Crs::parse);
    let layer = Layer::from_geojson_str(&text, default_crs.as_ref()).map_err(|e| {
        BootstrapError::LayerParse {
            path: source.path.clone(),
            source: e,
        }
    })?;
    tracing::debug!(
        path = %source.path.display(),
        features = layer.len(),
        crs = %layer.crs(),
        "layer file loaded"
    );
    Ok(layer)
}

/// Install the global subscriber once per process.
pub fn init_tracing_if_needed(observability: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let log_file_path = std::env::var("GEOFLOW_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| observability.log_file.clone());
        let file_writer = log_file_path.as_deref().and_then(create_log_writer);
        let fallback_level = match observability.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        };

        let make_filter = || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        };

        match file_writer {
            Some(writer) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init();
            }
            None => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .try_init();
            }
        }

        tracing::info!(
            log_level = %observability.log_level,
            log_file = %log_file_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(stderr)".to_string()),
            "tracing initialized"
        );
    });
}

fn create_log_writer(path: &Path) -> Option<SharedFileMakeWriter> {
    use std::fs::{create_dir_all, OpenOptions};

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = create_dir_all(parent) {
                eprintln!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    err
                );
                return None;
            }
        }
    }
    let file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", path.display(), err);
            return None;
        }
    };
    Some(SharedFileMakeWriter::new(file))
}

#[derive(Clone)]
struct SharedFileMakeWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl SharedFileMakeWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

struct SharedFileWriter {
    file: Arc<std::sync::Mutex<std::fs::File>>,
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedFileMakeWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SharedFileWriter {
            file: self.file.clone(),
        }
    }
}

impl std::io::Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::write(&mut *file, buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("log file mutex poisoned"))?;
        std::io::Write::flush(&mut *file)
    }
}

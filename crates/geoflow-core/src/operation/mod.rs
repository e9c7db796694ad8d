//! Geometry operation abstraction module
//!
//! - GeometryOperation: named operation with a declared parameter contract
//! - OperationRegistry: name -> operation lookup used by the processor
//! - OperationOutput: a new layer or a plain value
//!
//! Implementations live in the geoflow-ops crate.

mod params;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::store::{LayerStore, StoreError};
use crate::types::{Crs, Layer, Params};

pub use params::{param_f64, param_layer, param_str, param_str_opt};

/// Typed failure raised by an operation on invalid input
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("layer '{0}' not found")]
    LayerNotFound(String),

    #[error("CRS mismatch: '{left}' vs '{right}'")]
    CrsMismatch { left: Crs, right: Crs },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("unsupported CRS transformation from '{from}' to '{to}'")]
    UnsupportedCrs { from: Crs, to: Crs },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for OperationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::LayerNotFound(id),
            other => Self::Store(other),
        }
    }
}

impl OperationError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// What an operation hands back to the processor
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// A new layer, to be inserted into the store
    Layer(Layer),
    /// Anything else (counts, areas, ...)
    Value(Value),
}

/// Operation metadata for the planner catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationMeta {
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    #[serde(default)]
    pub optional_params: Vec<String>,
}

/// GeometryOperation trait - one primitive of the geometry library
///
/// Operations receive already-resolved parameters; layer parameters carry
/// layer identifiers, never layer values.
pub trait GeometryOperation: Send + Sync {
    /// Get the operation name (must be unique)
    fn name(&self) -> &str;

    /// Get the operation description (for LLM planning)
    fn description(&self) -> &str;

    /// Parameters without a default
    fn required_params(&self) -> &[&'static str];

    /// Parameters with a default
    fn optional_params(&self) -> &[&'static str] {
        &[]
    }

    fn metadata(&self) -> OperationMeta {
        OperationMeta {
            name: self.name().to_string(),
            description: self.description().to_string(),
            required_params: self.required_params().iter().map(|p| p.to_string()).collect(),
            optional_params: self.optional_params().iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Run the operation against the store (read-only access)
    fn invoke(
        &self,
        params: &Params,
        store: &dyn LayerStore,
    ) -> Result<OperationOutput, OperationError>;
}

/// Registry completeness errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("required operations not registered: {}", .0.join(", "))]
    MissingOperations(Vec<String>),
}

/// Operation registry for looking up operations by name
pub struct OperationRegistry {
    operations: HashMap<String, Arc<dyn GeometryOperation>>,
}

impl OperationRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Register an operation, replacing any previous one with the same name
    pub fn register(&mut self, operation: Arc<dyn GeometryOperation>) {
        self.operations
            .insert(operation.name().to_string(), operation);
    }

    /// Get an operation by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn GeometryOperation>> {
        self.operations.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// All operation names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.operations.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Metadata of every operation, sorted by name
    pub fn catalog(&self) -> Vec<OperationMeta> {
        self.names()
            .iter()
            .filter_map(|name| self.operations.get(name))
            .map(|operation| operation.metadata())
            .collect()
    }

    /// Startup check that every required operation is registered
    pub fn ensure_contains<S: AsRef<str>>(&self, required: &[S]) -> Result<(), RegistryError> {
        let missing: Vec<String> = required
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| !self.contains(name))
            .map(ToString::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::MissingOperations(missing))
        }
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

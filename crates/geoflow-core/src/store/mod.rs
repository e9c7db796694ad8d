//! Store module
//!
//! LayerStore is the single shared mutable resource of a session: a map
//! from layer identifier to layer value that only ever grows.
//!
//! Note: Implementations are in geoflow-stores crate

use std::sync::Arc;

use thiserror::Error;

use crate::types::{Layer, LayerId, LayerSummary};

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("layer '{0}' not found")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// LayerStore trait - insert-only layer storage
///
/// Layers are handed out behind `Arc` so readers never copy feature data and
/// can never mutate a stored layer.
pub trait LayerStore: Send + Sync {
    /// Look up a layer by identifier
    fn get(&self, id: &str) -> Result<Arc<Layer>, StoreError>;

    /// Insert a layer under a freshly generated `Layer N` identifier
    fn put(&self, layer: Layer) -> Result<LayerId, StoreError>;

    /// All identifiers in insertion order
    fn list(&self) -> Result<Vec<LayerId>, StoreError>;

    /// Number of stored layers
    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.list()?.len())
    }

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        match self.get(id) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Planner-facing summaries of every stored layer
    fn summaries(&self) -> Result<Vec<LayerSummary>, StoreError> {
        let mut summaries = Vec::new();
        for id in self.list()? {
            let layer = self.get(id.as_str())?;
            summaries.push(layer.summary(id));
        }
        Ok(summaries)
    }
}

//! # Geoflow Stores
//!
//! Store implementations for the geoflow runtime.
//!
//! This crate provides:
//! - InMemory LayerStore (also usable as a per-session fork of a base store)

mod layer_store;

pub use layer_store::InMemoryLayerStore;

// Re-export core traits for convenience
pub use geoflow_core::store::{LayerStore, StoreError};

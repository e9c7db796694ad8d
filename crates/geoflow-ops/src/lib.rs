//! # Geoflow Ops
//!
//! The builtin geometry operations.
//!
//! This crate provides:
//! - buffer_layer / simplify / reproject (per-feature transforms)
//! - intersection / union / clip / dissolve (polygon overlay)
//! - point_in_polygon / calculate_area (joins and measures)
//! - `builtin_registry()` with all of the above

mod measure;
mod overlay;
mod support;
mod transform;

use std::sync::Arc;

use geoflow_core::operation::{GeometryOperation, OperationRegistry};

pub use measure::{CalculateAreaOperation, PointInPolygonOperation};
pub use overlay::{ClipOperation, DissolveOperation, IntersectionOperation, UnionOperation};
pub use transform::{BufferOperation, ReprojectOperation, SimplifyOperation};

/// Every builtin operation, in catalog order
pub fn builtin_operations() -> Vec<Arc<dyn GeometryOperation>> {
    vec![
        Arc::new(BufferOperation),
        Arc::new(IntersectionOperation),
        Arc::new(UnionOperation),
        Arc::new(ClipOperation),
        Arc::new(DissolveOperation),
        Arc::new(SimplifyOperation),
        Arc::new(ReprojectOperation),
        Arc::new(PointInPolygonOperation),
        Arc::new(CalculateAreaOperation),
    ]
}

/// Registry holding every builtin operation
pub fn builtin_registry() -> OperationRegistry {
    let mut registry = OperationRegistry::new();
    for operation in builtin_operations() {
        registry.register(operation);
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_core_operations() {
        let registry = builtin_registry();
        registry
            .ensure_contains(&[
                "buffer_layer",
                "intersection",
                "union",
                "clip",
                "dissolve",
                "simplify",
                "reproject",
                "point_in_polygon",
            ])
            .expect("all core operations registered");
        assert!(registry.contains("calculate_area"));
        assert_eq!(registry.len(), builtin_operations().len());
    }

    #[test]
    fn test_catalog_declares_parameters() {
        let registry = builtin_registry();
        let catalog = registry.catalog();
        let buffer = catalog
            .iter()
            .find(|meta| meta.name == "buffer_layer")
            .expect("buffer_layer in catalog");
        assert_eq!(buffer.required_params, vec!["layer_name", "distance"]);

        let dissolve = catalog
            .iter()
            .find(|meta| meta.name == "dissolve")
            .expect("dissolve in catalog");
        assert_eq!(dissolve.optional_params, vec!["by"]);
    }
}

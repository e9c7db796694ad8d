//! LayerStore implementations

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use geoflow_core::store::{LayerStore, StoreError};
use geoflow_core::types::{Layer, LayerId};

#[derive(Debug, Default, Clone)]
struct Inner {
    order: Vec<LayerId>,
    layers: HashMap<LayerId, Arc<Layer>>,
}

/// In-memory implementation for development and testing
///
/// Identifiers are `Layer 1`, `Layer 2`, ... in insertion order. Nothing is
/// ever removed, so the next identifier is always one past the current count.
#[derive(Debug, Default)]
pub struct InMemoryLayerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLayerStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store preloaded with the given layers, in order
    pub fn with_layers(layers: impl IntoIterator<Item = Layer>) -> Self {
        let mut inner = Inner::default();
        for layer in layers {
            let id = LayerId::numbered(inner.order.len() + 1);
            inner.order.push(id.clone());
            inner.layers.insert(id, Arc::new(layer));
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Independent copy sharing the current layer values.
    ///
    /// Layers put into the fork are invisible to this store and vice versa.
    pub fn fork(&self) -> Result<Self, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(Self {
            inner: RwLock::new(inner.clone()),
        })
    }
}

impl LayerStore for InMemoryLayerStore {
    fn get(&self, id: &str) -> Result<Arc<Layer>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        inner
            .layers
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn put(&self, layer: Layer) -> Result<LayerId, StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let id = LayerId::numbered(inner.order.len() + 1);
        tracing::debug!(
            layer = %id,
            features = layer.len(),
            crs = %layer.crs(),
            "layer stored"
        );
        inner.order.push(id.clone());
        inner.layers.insert(id.clone(), Arc::new(layer));
        Ok(id)
    }

    fn list(&self) -> Result<Vec<LayerId>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(inner.order.clone())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(inner.order.len())
    }

    fn contains(&self, id: &str) -> Result<bool, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(inner.layers.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::point;
    use geoflow_core::types::{Crs, Feature};

    fn layer(x: f64) -> Layer {
        Layer::new(vec![Feature::new(point!(x: x, y: 1.0))], Crs::wgs84())
    }

    #[test]
    fn test_put_assigns_sequential_identifiers() {
        let store = InMemoryLayerStore::new();
        assert!(store.is_empty().unwrap());

        let first = store.put(layer(1.0)).unwrap();
        let second = store.put(layer(2.0)).unwrap();

        assert_eq!(first, "Layer 1");
        assert_eq!(second, "Layer 2");
        assert_eq!(store.list().unwrap(), vec![first, second]);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn test_get_returns_stored_value() {
        let store = InMemoryLayerStore::new();
        let original = layer(3.0);
        let id = store.put(original.clone()).unwrap();

        assert_eq!(*store.get(id.as_str()).unwrap(), original);
        assert!(store.contains("Layer 1").unwrap());
        assert!(!store.contains("Layer 2").unwrap());
        assert!(matches!(store.get("Layer 2"), Err(StoreError::NotFound(id)) if id == "Layer 2"));
    }

    #[test]
    fn test_with_layers_preloads_in_order() {
        let store = InMemoryLayerStore::with_layers(vec![layer(1.0), layer(2.0)]);
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.put(layer(3.0)).unwrap(), "Layer 3");

        let summaries = store.summaries().unwrap();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[0].id, "Layer 1");
        assert_eq!(summaries[0].feature_count, 1);
        assert_eq!(summaries[0].geometry_type.as_deref(), Some("Point"));
    }

    #[test]
    fn test_fork_is_isolated() {
        let base = InMemoryLayerStore::with_layers(vec![layer(1.0)]);
        let fork = base.fork().unwrap();

        assert_eq!(fork.put(layer(2.0)).unwrap(), "Layer 2");
        assert_eq!(base.len().unwrap(), 1);
        assert_eq!(base.put(layer(9.0)).unwrap(), "Layer 2");

        let from_fork = fork.get("Layer 2").unwrap();
        let from_base = base.get("Layer 2").unwrap();
        assert_ne!(*from_fork, *from_base);
        assert!(Arc::ptr_eq(
            &fork.get("Layer 1").unwrap(),
            &base.get("Layer 1").unwrap()
        ));
    }

    #[test]
    fn test_concurrent_puts_never_reuse_identifiers() {
        let store = Arc::new(InMemoryLayerStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || store.put(layer(i as f64)).unwrap())
            })
            .collect();
        let mut ids: Vec<LayerId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 8);
        assert_eq!(store.len().unwrap(), 8);
    }
}

//! Spatial join and measurement

use geo::{Area, Contains, Geometry, MultiPolygon};
use serde_json::json;

use geoflow_core::operation::{param_layer, GeometryOperation, OperationError, OperationOutput};
use geoflow_core::store::LayerStore;
use geoflow_core::types::{Feature, Layer, Params};

use crate::support::{areas_of, ensure_same_crs, merge_properties};

/// Points tagged with the attributes of the polygon containing them
pub struct PointInPolygonOperation;

impl GeometryOperation for PointInPolygonOperation {
    fn name(&self) -> &str {
        "point_in_polygon"
    }

    fn description(&self) -> &str {
        "Keep the points of `points_layer_name` that fall inside a polygon of \
         `polygons_layer_name`, joined with that polygon's attributes."
    }

    fn required_params(&self) -> &[&'static str] {
        &["points_layer_name", "polygons_layer_name"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let points = param_layer(params, "points_layer_name", store)?;
        let polygons = param_layer(params, "polygons_layer_name", store)?;
        ensure_same_crs(&points, &polygons)?;

        let mut areas: Vec<(&Feature, MultiPolygon<f64>)> = Vec::with_capacity(polygons.len());
        for feature in polygons.features() {
            match areas_of(&feature.geometry)? {
                Some(area) => areas.push((feature, area)),
                None => {
                    return Err(OperationError::InvalidGeometry(
                        "polygons layer contains non-polygon features".to_string(),
                    ))
                }
            }
        }

        let mut features = Vec::new();
        for point_feature in points.features() {
            let inside = |area: &MultiPolygon<f64>| match &point_feature.geometry {
                Geometry::Point(point) => Ok(area.contains(point)),
                Geometry::MultiPoint(multi) => Ok(multi.iter().any(|point| area.contains(point))),
                _ => Err(OperationError::InvalidGeometry(
                    "points layer contains non-point features".to_string(),
                )),
            };
            for (polygon_feature, area) in &areas {
                if inside(area)? {
                    features.push(Feature {
                        geometry: point_feature.geometry.clone(),
                        properties: merge_properties(point_feature, polygon_feature),
                    });
                    break;
                }
            }
        }
        Ok(OperationOutput::Layer(Layer::new(features, points.crs().clone())))
    }
}

/// Total planar area of a layer
pub struct CalculateAreaOperation;

impl GeometryOperation for CalculateAreaOperation {
    fn name(&self) -> &str {
        "calculate_area"
    }

    fn description(&self) -> &str {
        "Total unsigned planar area of a layer in squared CRS units. Returns a number, not a layer."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer_name"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let layer = param_layer(params, "layer_name", store)?;
        let total: f64 = layer
            .features()
            .iter()
            .map(|feature| feature.geometry.unsigned_area())
            .sum();
        Ok(OperationOutput::Value(json!(total)))
    }
}

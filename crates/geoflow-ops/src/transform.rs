//! Per-feature transforms: buffer, simplify, reproject

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use geo::{Buffer, Coord, Geometry, MapCoords, Simplify};

use geoflow_core::operation::{
    param_f64, param_layer, param_str, GeometryOperation, OperationError, OperationOutput,
};
use geoflow_core::store::LayerStore;
use geoflow_core::types::{Crs, Feature, Layer, Params};

use crate::support::simplest_polygonal;

/// Buffer every feature by a distance in layer units
pub struct BufferOperation;

impl GeometryOperation for BufferOperation {
    fn name(&self) -> &str {
        "buffer_layer"
    }

    fn description(&self) -> &str {
        "Buffer every feature of a layer by `distance`, expressed in the layer's CRS units. \
         Negative distances shrink polygons."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer_name", "distance"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let layer = param_layer(params, "layer_name", store)?;
        let distance = param_f64(params, "distance")?;
        if distance == 0.0 {
            return Err(OperationError::invalid_parameter(
                "distance",
                "must be non-zero",
            ));
        }

        let features = layer
            .features()
            .iter()
            .filter_map(|feature| {
                let buffered = feature.geometry.buffer(distance);
                if buffered.0.is_empty() {
                    None
                } else {
                    Some(feature.map_geometry(simplest_polygonal(buffered)))
                }
            })
            .collect();
        Ok(OperationOutput::Layer(Layer::new(features, layer.crs().clone())))
    }
}

/// Douglas-Peucker simplification of lines and polygons
pub struct SimplifyOperation;

impl GeometryOperation for SimplifyOperation {
    fn name(&self) -> &str {
        "simplify"
    }

    fn description(&self) -> &str {
        "Simplify line and polygon features with tolerance `tolerance` (layer CRS units). \
         Points are left unchanged."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer_name", "tolerance"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let layer = param_layer(params, "layer_name", store)?;
        let tolerance = param_f64(params, "tolerance")?;
        if tolerance < 0.0 {
            return Err(OperationError::invalid_parameter(
                "tolerance",
                "must not be negative",
            ));
        }

        let features = layer
            .features()
            .iter()
            .map(|feature| feature.map_geometry(simplify_geometry(&feature.geometry, tolerance)))
            .collect();
        Ok(OperationOutput::Layer(Layer::new(features, layer.crs().clone())))
    }
}

fn simplify_geometry(geometry: &Geometry<f64>, tolerance: f64) -> Geometry<f64> {
    match geometry {
        Geometry::LineString(line) => Geometry::LineString(line.simplify(tolerance)),
        Geometry::MultiLineString(lines) => Geometry::MultiLineString(lines.simplify(tolerance)),
        Geometry::Polygon(polygon) => Geometry::Polygon(polygon.simplify(tolerance)),
        Geometry::MultiPolygon(polygons) => Geometry::MultiPolygon(polygons.simplify(tolerance)),
        Geometry::GeometryCollection(collection) => Geometry::GeometryCollection(
            collection
                .iter()
                .map(|member| simplify_geometry(member, tolerance))
                .collect(),
        ),
        other => other.clone(),
    }
}

const EARTH_RADIUS_M: f64 = 6_378_137.0;
const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_806_59;

/// Reprojection between WGS84 and spherical Web Mercator
pub struct ReprojectOperation;

impl GeometryOperation for ReprojectOperation {
    fn name(&self) -> &str {
        "reproject"
    }

    fn description(&self) -> &str {
        "Reproject a layer to `target_crs` (e.g. 'EPSG:3857'). Supported: EPSG:4326 <-> EPSG:3857."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer_name", "target_crs"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let layer = param_layer(params, "layer_name", store)?;
        let target = Crs::parse(param_str(params, "target_crs")?);
        let source = layer.crs().clone();
        if source == target {
            return Ok(OperationOutput::Layer((*layer).clone()));
        }

        let project: fn(Coord<f64>) -> Coord<f64> = match (source.epsg_code(), target.epsg_code()) {
            (Some(4326), Some(3857)) => to_web_mercator,
            (Some(3857), Some(4326)) => to_wgs84,
            _ => {
                return Err(OperationError::UnsupportedCrs {
                    from: source,
                    to: target,
                })
            }
        };

        let features: Vec<Feature> = layer
            .features()
            .iter()
            .map(|feature| feature.map_geometry(feature.geometry.map_coords(project)))
            .collect();
        Ok(OperationOutput::Layer(Layer::new(features, target)))
    }
}

fn to_web_mercator(coord: Coord<f64>) -> Coord<f64> {
    let latitude = coord.y.clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE);
    Coord {
        x: EARTH_RADIUS_M * coord.x.to_radians(),
        y: EARTH_RADIUS_M * (FRAC_PI_4 + latitude.to_radians() / 2.0).tan().ln(),
    }
}

fn to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (coord.x / EARTH_RADIUS_M).to_degrees(),
        y: (2.0 * (coord.y / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees(),
    }
}

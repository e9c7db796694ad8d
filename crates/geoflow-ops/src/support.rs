//! Shared helpers for the builtin operations

use geo::{Geometry, MultiLineString, MultiPoint, MultiPolygon, Polygon};

use geoflow_core::operation::OperationError;
use geoflow_core::types::{Feature, Layer};
use serde_json::{Map, Value};

/// Coarse classification used to pick an overlay strategy
pub(crate) enum Shape {
    Points(MultiPoint<f64>),
    Lines(MultiLineString<f64>),
    Areas(MultiPolygon<f64>),
}

pub(crate) fn shape_of(geometry: &Geometry<f64>) -> Result<Shape, OperationError> {
    let shape = match geometry {
        Geometry::Point(point) => Shape::Points(MultiPoint::new(vec![*point])),
        Geometry::MultiPoint(points) => Shape::Points(points.clone()),
        Geometry::Line(line) => Shape::Lines(MultiLineString::new(vec![(*line).into()])),
        Geometry::LineString(line) => Shape::Lines(MultiLineString::new(vec![line.clone()])),
        Geometry::MultiLineString(lines) => Shape::Lines(lines.clone()),
        Geometry::Polygon(polygon) => Shape::Areas(MultiPolygon::new(vec![polygon.clone()])),
        Geometry::MultiPolygon(polygons) => Shape::Areas(polygons.clone()),
        Geometry::Rect(rect) => Shape::Areas(MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::Triangle(triangle) => {
            Shape::Areas(MultiPolygon::new(vec![triangle.to_polygon()]))
        }
        Geometry::GeometryCollection(_) => {
            return Err(OperationError::InvalidGeometry(
                "geometry collections are not supported".to_string(),
            ))
        }
    };
    Ok(shape)
}

/// Polygonal part of a geometry, `None` for points and lines.
pub(crate) fn areas_of(geometry: &Geometry<f64>) -> Result<Option<MultiPolygon<f64>>, OperationError> {
    match shape_of(geometry)? {
        Shape::Areas(polygons) => Ok(Some(polygons)),
        _ => Ok(None),
    }
}

/// Union of every polygonal feature of a layer.
pub(crate) fn union_areas<'a>(
    geometries: impl IntoIterator<Item = &'a Geometry<f64>>,
) -> Result<Option<MultiPolygon<f64>>, OperationError> {
    use geo::BooleanOps;

    let mut merged: Option<MultiPolygon<f64>> = None;
    for geometry in geometries {
        let Some(polygons) = areas_of(geometry)? else {
            continue;
        };
        merged = Some(match merged {
            Some(acc) => acc.union(&polygons),
            None => polygons,
        });
    }
    Ok(merged)
}

/// Collapse single-member multi geometries.
pub(crate) fn simplest_polygonal(polygons: MultiPolygon<f64>) -> Geometry<f64> {
    if polygons.0.len() == 1 {
        let mut polygons = polygons.0;
        let polygon: Polygon<f64> = polygons.remove(0);
        Geometry::Polygon(polygon)
    } else {
        Geometry::MultiPolygon(polygons)
    }
}

pub(crate) fn simplest_lineal(lines: MultiLineString<f64>) -> Geometry<f64> {
    if lines.0.len() == 1 {
        let mut lines = lines.0;
        Geometry::LineString(lines.remove(0))
    } else {
        Geometry::MultiLineString(lines)
    }
}

pub(crate) fn simplest_puntal(points: MultiPoint<f64>) -> Geometry<f64> {
    if points.0.len() == 1 {
        Geometry::Point(points.0[0])
    } else {
        Geometry::MultiPoint(points)
    }
}

/// Both operands of a binary operation must share a CRS.
pub(crate) fn ensure_same_crs(left: &Layer, right: &Layer) -> Result<(), OperationError> {
    if left.crs() != right.crs() {
        return Err(OperationError::CrsMismatch {
            left: left.crs().clone(),
            right: right.crs().clone(),
        });
    }
    Ok(())
}

/// `primary` attributes, plus any `secondary` attribute it does not define.
pub(crate) fn merge_properties(primary: &Feature, secondary: &Feature) -> Map<String, Value> {
    let mut merged = primary.properties.clone();
    for (key, value) in &secondary.properties {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

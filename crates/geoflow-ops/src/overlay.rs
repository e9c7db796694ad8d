//! Overlay operations: intersection, union, clip, dissolve
//!
//! Polygon math goes through `geo::BooleanOps`. Lines are clipped against
//! polygons, crossing lines meet in points, and points are kept when they
//! touch the other operand.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{
    BooleanOps, Coord, Geometry, GeometryCollection, Intersects, LineString, MultiLineString,
    MultiPoint, Point,
};
use serde_json::Value;

use geoflow_core::operation::{
    param_layer, param_str, param_str_opt, GeometryOperation, OperationError, OperationOutput,
};
use geoflow_core::store::LayerStore;
use geoflow_core::types::{Feature, Layer, Params};

use crate::support::{
    areas_of, ensure_same_crs, merge_properties, shape_of, simplest_lineal, simplest_polygonal,
    simplest_puntal, union_areas, Shape,
};

/// Pairwise overlay of two layers
pub struct IntersectionOperation;

impl GeometryOperation for IntersectionOperation {
    fn name(&self) -> &str {
        "intersection"
    }

    fn description(&self) -> &str {
        "Intersect two layers feature by feature. Result features keep the attributes of \
         layer1 plus those of layer2 that layer1 lacks."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer1_name", "layer2_name"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let left = param_layer(params, "layer1_name", store)?;
        let right = param_layer(params, "layer2_name", store)?;
        ensure_same_crs(&left, &right)?;

        // A layer intersected with itself is itself.
        if param_str(params, "layer1_name")? == param_str(params, "layer2_name")? {
            return Ok(OperationOutput::Layer((*left).clone()));
        }

        let mut features = Vec::new();
        for first in left.features() {
            for second in right.features() {
                if let Some(feature) = intersect_features(first, second)? {
                    features.push(feature);
                }
            }
        }
        Ok(OperationOutput::Layer(Layer::new(features, left.crs().clone())))
    }
}

fn intersect_features(first: &Feature, second: &Feature) -> Result<Option<Feature>, OperationError> {
    let geometry = match (shape_of(&first.geometry)?, shape_of(&second.geometry)?) {
        (Shape::Areas(a), Shape::Areas(b)) => {
            let overlap = a.intersection(&b);
            (!overlap.0.is_empty()).then(|| simplest_polygonal(overlap))
        }
        (Shape::Lines(lines), Shape::Areas(areas)) | (Shape::Areas(areas), Shape::Lines(lines)) => {
            let inside = areas.clip(&lines, false);
            (!inside.0.is_empty()).then(|| simplest_lineal(inside))
        }
        (Shape::Points(points), _) => points_touching(points, &second.geometry),
        (_, Shape::Points(points)) => points_touching(points, &first.geometry),
        (Shape::Lines(a), Shape::Lines(b)) => line_crossings(&a, &b),
    };
    Ok(geometry.map(|geometry| Feature {
        geometry,
        properties: merge_properties(first, second),
    }))
}

/// Crossing points of two lineal geometries, plus any collinear overlaps.
fn line_crossings(a: &MultiLineString<f64>, b: &MultiLineString<f64>) -> Option<Geometry<f64>> {
    let mut points: Vec<Coord<f64>> = Vec::new();
    let mut overlaps: Vec<LineString<f64>> = Vec::new();
    for first in a.0.iter().flat_map(|ls| ls.lines()) {
        for second in b.0.iter().flat_map(|ls| ls.lines()) {
            match line_intersection(first, second) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    if !points.contains(&intersection) {
                        points.push(intersection);
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    overlaps.push(LineString::from(intersection));
                }
                None => {}
            }
        }
    }
    // Collinear overlaps already cover their own endpoints.
    points.retain(|c| {
        !overlaps
            .iter()
            .any(|ls| Geometry::Point(Point(*c)).intersects(&Geometry::LineString(ls.clone())))
    });

    let puntal = (!points.is_empty())
        .then(|| simplest_puntal(MultiPoint::new(points.into_iter().map(Point).collect())));
    let lineal = (!overlaps.is_empty()).then(|| simplest_lineal(MultiLineString::new(overlaps)));
    match (puntal, lineal) {
        (Some(p), Some(l)) => Some(Geometry::GeometryCollection(GeometryCollection::new_from(
            vec![p, l],
        ))),
        (p, l) => p.or(l),
    }
}

fn points_touching(points: MultiPoint<f64>, other: &Geometry<f64>) -> Option<Geometry<f64>> {
    let kept: Vec<_> = points
        .0
        .into_iter()
        .filter(|point| Geometry::Point(*point).intersects(other))
        .collect();
    (!kept.is_empty()).then(|| simplest_puntal(MultiPoint::new(kept)))
}

/// Merge two layers into one
pub struct UnionOperation;

impl GeometryOperation for UnionOperation {
    fn name(&self) -> &str {
        "union"
    }

    fn description(&self) -> &str {
        "Union two layers. All polygons are merged into a single feature; point and line \
         features are carried over unchanged."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer1_name", "layer2_name"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let left = param_layer(params, "layer1_name", store)?;
        let right = param_layer(params, "layer2_name", store)?;
        ensure_same_crs(&left, &right)?;

        let all: Vec<&Feature> = left.features().iter().chain(right.features()).collect();
        let merged = union_areas(all.iter().map(|feature| &feature.geometry))?;

        let mut features = Vec::new();
        if let Some(polygons) = merged {
            features.push(Feature::new(simplest_polygonal(polygons)));
        }
        for feature in all {
            if areas_of(&feature.geometry)?.is_none() {
                features.push(feature.clone());
            }
        }
        Ok(OperationOutput::Layer(Layer::new(features, left.crs().clone())))
    }
}

/// Cut a layer to the extent of a polygon mask
pub struct ClipOperation;

impl GeometryOperation for ClipOperation {
    fn name(&self) -> &str {
        "clip"
    }

    fn description(&self) -> &str {
        "Clip a layer to the polygons of `mask_name`. Features outside the mask are dropped; \
         attributes are kept."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer_name", "mask_name"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let layer = param_layer(params, "layer_name", store)?;
        let mask_layer = param_layer(params, "mask_name", store)?;
        ensure_same_crs(&layer, &mask_layer)?;

        let mask = union_areas(mask_layer.features().iter().map(|f| &f.geometry))?.ok_or_else(
            || OperationError::InvalidGeometry("clip mask has no polygon features".to_string()),
        )?;
        let mask_geometry = Geometry::MultiPolygon(mask.clone());

        let mut features = Vec::new();
        for feature in layer.features() {
            let clipped = match shape_of(&feature.geometry)? {
                Shape::Areas(areas) => {
                    let inside = areas.intersection(&mask);
                    (!inside.0.is_empty()).then(|| simplest_polygonal(inside))
                }
                Shape::Lines(lines) => {
                    let inside = mask.clip(&lines, false);
                    (!inside.0.is_empty()).then(|| simplest_lineal(inside))
                }
                Shape::Points(points) => points_touching(points, &mask_geometry),
            };
            if let Some(geometry) = clipped {
                features.push(feature.map_geometry(geometry));
            }
        }
        Ok(OperationOutput::Layer(Layer::new(features, layer.crs().clone())))
    }
}

/// Merge polygons, optionally grouped by an attribute
pub struct DissolveOperation;

impl GeometryOperation for DissolveOperation {
    fn name(&self) -> &str {
        "dissolve"
    }

    fn description(&self) -> &str {
        "Dissolve the polygons of a layer into one feature, or one feature per distinct \
         value of attribute `by`."
    }

    fn required_params(&self) -> &[&'static str] {
        &["layer_name"]
    }

    fn optional_params(&self) -> &[&'static str] {
        &["by"]
    }

    fn invoke(&self, params: &Params, store: &dyn LayerStore) -> Result<OperationOutput, OperationError> {
        let layer = param_layer(params, "layer_name", store)?;
        let by = param_str_opt(params, "by")?;

        // Groups in order of first appearance.
        let mut groups: Vec<(Value, Vec<&Geometry<f64>>)> = Vec::new();
        for feature in layer.features() {
            if areas_of(&feature.geometry)?.is_none() {
                return Err(OperationError::InvalidGeometry(
                    "dissolve requires polygon features".to_string(),
                ));
            }
            let key = by
                .and_then(|name| feature.properties.get(name).cloned())
                .unwrap_or(Value::Null);
            match groups.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, members)) => members.push(&feature.geometry),
                None => groups.push((key, vec![&feature.geometry])),
            }
        }

        let mut features = Vec::with_capacity(groups.len());
        for (key, members) in groups {
            let Some(merged) = union_areas(members)? else {
                continue;
            };
            let mut feature = Feature::new(simplest_polygonal(merged));
            if let Some(name) = by {
                feature = feature.with_property(name, key);
            }
            features.push(feature);
        }
        Ok(OperationOutput::Layer(Layer::new(features, layer.crs().clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{line_string, point, polygon, Area};
    use geoflow_core::types::Crs;
    use geoflow_stores::InMemoryLayerStore;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().expect("object")
    }

    fn layer_of(output: OperationOutput) -> Layer {
        match output {
            OperationOutput::Layer(layer) => layer,
            other => panic!("expected layer, got {:?}", other),
        }
    }

    fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ])
    }

    fn area(layer: &Layer) -> f64 {
        layer.features().iter().map(|f| f.geometry.unsigned_area()).sum()
    }

    fn store_with(layers: Vec<Layer>) -> InMemoryLayerStore {
        InMemoryLayerStore::with_layers(layers)
    }

    #[test]
    fn test_intersection_of_overlapping_squares() {
        let store = store_with(vec![
            Layer::new(
                vec![Feature::new(square(0.0, 0.0, 2.0)).with_property("zone", "a")],
                Crs::web_mercator(),
            ),
            Layer::new(
                vec![Feature::new(square(1.0, 1.0, 2.0))
                    .with_property("zone", "b")
                    .with_property("risk", 3)],
                Crs::web_mercator(),
            ),
        ]);

        let layer = layer_of(
            IntersectionOperation
                .invoke(&params(json!({"layer1_name": "Layer 1", "layer2_name": "Layer 2"})), &store)
                .expect("intersection"),
        );

        assert_eq!(layer.len(), 1);
        assert!((area(&layer) - 1.0).abs() < 1e-9);
        let properties = &layer.features()[0].properties;
        assert_eq!(properties["zone"], json!("a"));
        assert_eq!(properties["risk"], json!(3));
    }

    #[test]
    fn test_intersection_keeps_points_and_clips_lines() {
        let store = store_with(vec![
            Layer::new(
                vec![
                    Feature::new(point!(x: 0.5, y: 0.5)),
                    Feature::new(point!(x: 5.0, y: 5.0)),
                    Feature::new(line_string![(x: -1.0, y: 1.0), (x: 3.0, y: 1.0)]),
                ],
                Crs::web_mercator(),
            ),
            Layer::new(vec![Feature::new(square(0.0, 0.0, 2.0))], Crs::web_mercator()),
        ]);

        let layer = layer_of(
            IntersectionOperation
                .invoke(&params(json!({"layer1_name": "Layer 1", "layer2_name": "Layer 2"})), &store)
                .expect("intersection"),
        );

        assert_eq!(layer.len(), 2);
        assert_eq!(layer.features()[0].geometry, Geometry::Point(point!(x: 0.5, y: 0.5)));
        assert!(matches!(
            layer.features()[1].geometry,
            Geometry::LineString(_) | Geometry::MultiLineString(_)
        ));
    }

    #[test]
    fn test_intersection_of_crossing_lines_yields_points() {
        let store = store_with(vec![
            Layer::new(
                vec![Feature::new(line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 4.0)]).with_property("road", "a")],
                Crs::web_mercator(),
            ),
            Layer::new(
                vec![
                    Feature::new(line_string![(x: 0.0, y: 4.0), (x: 4.0, y: 0.0)]).with_property("river", "b"),
                    Feature::new(line_string![(x: 10.0, y: 0.0), (x: 10.0, y: 5.0)]),
                ],
                Crs::web_mercator(),
            ),
        ]);

        let layer = layer_of(
            IntersectionOperation
                .invoke(&params(json!({"layer1_name": "Layer 1", "layer2_name": "Layer 2"})), &store)
                .expect("intersection"),
        );

        assert_eq!(layer.len(), 1);
        let Geometry::Point(crossing) = layer.features()[0].geometry else {
            panic!("expected a crossing point");
        };
        assert!((crossing.x() - 2.0).abs() < 1e-9 && (crossing.y() - 2.0).abs() < 1e-9);
        assert_eq!(layer.features()[0].properties["road"], json!("a"));
        assert_eq!(layer.features()[0].properties["river"], json!("b"));
    }

    #[test]
    fn test_intersection_of_overlapping_lines_keeps_shared_segment() {
        let store = store_with(vec![
            Layer::new(
                vec![Feature::new(line_string![(x: 0.0, y: 0.0), (x: 4.0, y: 0.0)])],
                Crs::web_mercator(),
            ),
            Layer::new(
                vec![Feature::new(line_string![(x: 2.0, y: 0.0), (x: 6.0, y: 0.0)])],
                Crs::web_mercator(),
            ),
        ]);

        let layer = layer_of(
            IntersectionOperation
                .invoke(&params(json!({"layer1_name": "Layer 1", "layer2_name": "Layer 2"})), &store)
                .expect("intersection"),
        );

        assert_eq!(layer.len(), 1);
        assert!(matches!(layer.features()[0].geometry, Geometry::LineString(_)));
    }

    #[test]
    fn test_intersection_with_itself_is_identity() {
        let original = Layer::new(vec![Feature::new(square(0.0, 0.0, 2.0))], Crs::web_mercator());
        let store = store_with(vec![original.clone()]);

        let layer = layer_of(
            IntersectionOperation
                .invoke(&params(json!({"layer1_name": "Layer 1", "layer2_name": "Layer 1"})), &store)
                .expect("intersection"),
        );
        assert_eq!(layer, original);
    }

    #[test]
    fn test_intersection_rejects_crs_mismatch() {
        let store = store_with(vec![
            Layer::new(vec![Feature::new(square(0.0, 0.0, 1.0))], Crs::wgs84()),
            Layer::new(vec![Feature::new(square(0.0, 0.0, 1.0))], Crs::web_mercator()),
        ]);

        let err = IntersectionOperation
            .invoke(&params(json!({"layer1_name": "Layer 1", "layer2_name": "Layer 2"})), &store)
            .unwrap_err();
        assert!(matches!(err, OperationError::CrsMismatch { .. }));
        assert!(err.to_string().contains("EPSG:3857"));
    }

    #[test]
    fn test_union_merges_polygons_and_keeps_points() {
        let store = store_with(vec![
            Layer::new(vec![Feature::new(square(0.0, 0.0, 2.0))], Crs::web_mercator()),
            Layer::new(
                vec![
                    Feature::new(square(1.0, 0.0, 2.0)),
                    Feature::new(point!(x: 9.0, y: 9.0)).with_property("id", 1),
                ],
                Crs::web_mercator(),
            ),
        ]);

        let layer = layer_of(
            UnionOperation
                .invoke(&params(json!({"layer1_name": "Layer 1", "layer2_name": "Layer 2"})), &store)
                .expect("union"),
        );

        assert_eq!(layer.len(), 2);
        assert!(matches!(layer.features()[0].geometry, Geometry::Polygon(_)));
        assert!((layer.features()[0].geometry.unsigned_area() - 6.0).abs() < 1e-9);
        assert_eq!(layer.features()[1].properties["id"], json!(1));
    }

    #[test]
    fn test_clip_to_mask() {
        let store = store_with(vec![
            Layer::new(
                vec![
                    Feature::new(square(1.0, 1.0, 2.0)).with_property("name", "parcel"),
                    Feature::new(square(10.0, 10.0, 1.0)),
                ],
                Crs::web_mercator(),
            ),
            Layer::new(vec![Feature::new(square(0.0, 0.0, 2.0))], Crs::web_mercator()),
        ]);

        let layer = layer_of(
            ClipOperation
                .invoke(&params(json!({"layer_name": "Layer 1", "mask_name": "Layer 2"})), &store)
                .expect("clip"),
        );

        assert_eq!(layer.len(), 1);
        assert!((area(&layer) - 1.0).abs() < 1e-9);
        assert_eq!(layer.features()[0].properties["name"], json!("parcel"));
    }

    #[test]
    fn test_clip_requires_polygon_mask() {
        let store = store_with(vec![
            Layer::new(vec![Feature::new(square(0.0, 0.0, 1.0))], Crs::web_mercator()),
            Layer::new(vec![Feature::new(point!(x: 0.0, y: 0.0))], Crs::web_mercator()),
        ]);

        let err = ClipOperation
            .invoke(&params(json!({"layer_name": "Layer 1", "mask_name": "Layer 2"})), &store)
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidGeometry(_)));
    }

    #[test]
    fn test_dissolve_by_attribute() {
        let store = store_with(vec![Layer::new(
            vec![
                Feature::new(square(0.0, 0.0, 1.0)).with_property("district", "north"),
                Feature::new(square(1.0, 0.0, 1.0)).with_property("district", "north"),
                Feature::new(square(5.0, 5.0, 1.0)).with_property("district", "south"),
            ],
            Crs::web_mercator(),
        )]);

        let grouped = layer_of(
            DissolveOperation
                .invoke(&params(json!({"layer_name": "Layer 1", "by": "district"})), &store)
                .expect("dissolve"),
        );
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped.features()[0].properties["district"], json!("north"));
        assert!((grouped.features()[0].geometry.unsigned_area() - 2.0).abs() < 1e-9);
        assert_eq!(grouped.features()[1].properties["district"], json!("south"));

        let all = layer_of(
            DissolveOperation
                .invoke(&params(json!({"layer_name": "Layer 1"})), &store)
                .expect("dissolve"),
        );
        assert_eq!(all.len(), 1);
        assert!(all.features()[0].properties.is_empty());
        assert!((area(&all) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dissolve_rejects_points() {
        let store = store_with(vec![Layer::new(
            vec![Feature::new(point!(x: 0.0, y: 0.0))],
            Crs::web_mercator(),
        )]);

        let err = DissolveOperation
            .invoke(&params(json!({"layer_name": "Layer 1"})), &store)
            .unwrap_err();
        assert!(matches!(err, OperationError::InvalidGeometry(_)));
    }
}

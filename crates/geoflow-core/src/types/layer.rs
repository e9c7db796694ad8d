//! Layer type definitions
//!
//! A Layer is an immutable-once-created vector dataset. Operations never
//! edit a layer in place; they build a new one.

use std::fmt;

use geo_types::Geometry;
use geojson::{FeatureCollection, GeoJson, JsonObject};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use super::LayerId;

/// Attribute name -> value mapping of a feature.
pub type Properties = Map<String, Value>;

const EPSG_WGS84: u32 = 4326;
const EPSG_WEB_MERCATOR: u32 = 3857;

/// Layer conversion errors
#[derive(Debug, Error)]
pub enum LayerError {
    #[error("GeoJSON parse error: {0}")]
    Parse(#[from] geojson::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("feature {0} has no geometry")]
    MissingGeometry(usize),
}

/// Coordinate reference system identifier, normalized to `EPSG:<code>` when
/// the input names an EPSG code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Crs(String);

impl Crs {
    pub fn epsg(code: u32) -> Self {
        Self(format!("EPSG:{}", code))
    }

    pub fn wgs84() -> Self {
        Self::epsg(EPSG_WGS84)
    }

    pub fn web_mercator() -> Self {
        Self::epsg(EPSG_WEB_MERCATOR)
    }

    /// Parse `EPSG:3857`, `epsg:3857`, `3857` or `urn:ogc:def:crs:EPSG::3857`.
    /// Anything else is kept verbatim (trimmed).
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match parse_epsg_code(trimmed) {
            Some(code) => Self::epsg(code),
            None => Self(trimmed.to_string()),
        }
    }

    pub fn epsg_code(&self) -> Option<u32> {
        parse_epsg_code(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn urn(&self) -> String {
        match self.epsg_code() {
            Some(code) => format!("urn:ogc:def:crs:EPSG::{}", code),
            None => self.0.clone(),
        }
    }
}

fn parse_epsg_code(value: &str) -> Option<u32> {
    let upper = value.to_ascii_uppercase();
    let digits = upper
        .strip_prefix("URN:OGC:DEF:CRS:EPSG::")
        .or_else(|| upper.strip_prefix("EPSG:"))
        .unwrap_or(&upper);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl From<String> for Crs {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for Crs {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A single feature: geometry plus attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Properties,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Same attributes, different geometry.
    pub fn map_geometry(&self, geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: self.properties.clone(),
        }
    }
}

/// Ordered features sharing one CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    features: Vec<Feature>,
    crs: Crs,
}

impl Layer {
    pub fn new(features: Vec<Feature>, crs: Crs) -> Self {
        Self { features, crs }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// GeoJSON geometry type shared by all features, `Mixed` when they differ.
    pub fn geometry_type(&self) -> Option<&'static str> {
        let mut kinds = self.features.iter().map(|f| geometry_type_name(&f.geometry));
        let first = kinds.next()?;
        if kinds.all(|kind| kind == first) {
            Some(first)
        } else {
            Some("Mixed")
        }
    }

    pub fn summary(&self, id: impl Into<LayerId>) -> LayerSummary {
        LayerSummary {
            id: id.into(),
            feature_count: self.features.len(),
            geometry_type: self.geometry_type().map(ToString::to_string),
            crs: self.crs.clone(),
        }
    }

    /// Parse a FeatureCollection, a single Feature or a bare Geometry.
    ///
    /// The CRS comes from a legacy `crs` member when present, then
    /// `default_crs`, then EPSG:4326.
    pub fn from_geojson_str(text: &str, default_crs: Option<&Crs>) -> Result<Self, LayerError> {
        let geojson: GeoJson = text.parse()?;
        let (raw_features, declared_crs) = match geojson {
            GeoJson::FeatureCollection(collection) => {
                let crs = collection.foreign_members.as_ref().and_then(crs_from_members);
                (collection.features, crs)
            }
            GeoJson::Feature(feature) => {
                let crs = feature.foreign_members.as_ref().and_then(crs_from_members);
                (vec![feature], crs)
            }
            GeoJson::Geometry(geometry) => (
                vec![geojson::Feature {
                    bbox: None,
                    geometry: Some(geometry),
                    id: None,
                    properties: None,
                    foreign_members: None,
                }],
                None,
            ),
        };

        let mut features = Vec::with_capacity(raw_features.len());
        for (index, raw) in raw_features.into_iter().enumerate() {
            let geometry = raw.geometry.ok_or(LayerError::MissingGeometry(index))?;
            let geometry = Geometry::<f64>::try_from(geometry)?;
            features.push(Feature {
                geometry,
                properties: raw.properties.unwrap_or_default(),
            });
        }

        let crs = declared_crs
            .or_else(|| default_crs.cloned())
            .unwrap_or_default();
        Ok(Self::new(features, crs))
    }

    /// Geometry payload: a GeoJSON FeatureCollection. Non-WGS84 layers carry a
    /// legacy `crs` member so the payload reads back into the same CRS.
    pub fn to_geojson(&self) -> Result<Value, LayerError> {
        let features = self
            .features
            .iter()
            .map(|feature| geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(
                    &feature.geometry,
                ))),
                id: None,
                properties: Some(feature.properties.clone()),
                foreign_members: None,
            })
            .collect();
        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };

        let mut value = serde_json::to_value(&collection)?;
        if self.crs.epsg_code() != Some(EPSG_WGS84) {
            if let Some(object) = value.as_object_mut() {
                object.insert(
                    "crs".to_string(),
                    json!({"type": "name", "properties": {"name": self.crs.urn()}}),
                );
            }
        }
        Ok(value)
    }
}

fn crs_from_members(members: &JsonObject) -> Option<Crs> {
    members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(Crs::parse)
}

fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => "Polygon",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Planner-facing description of a stored layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSummary {
    pub id: LayerId,
    pub feature_count: usize,
    #[serde(default)]
    pub geometry_type: Option<String>,
    pub crs: Crs,
}

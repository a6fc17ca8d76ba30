//! Minimal GeoJSON reading and writing
//!
//! Only what the merge pipeline needs: FeatureCollections whose features carry
//! Polygon or MultiPolygon geometry. Other geometry types are read so the engine can
//! report them, but are never produced.

use crate::error::{CliError, Result};
use geo::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use region_merge_lib::{Feature, Properties};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Read a JSON document from disk
pub fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Write any serializable value to disk as JSON
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let io_error = |source| CliError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(io_error)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(io_error)
}

/// Read the features of a GeoJSON FeatureCollection, in file order
pub fn read_features(path: &Path) -> Result<Vec<Feature>> {
    parse_feature_collection(&read_json(path)?)
}

/// Write features as a GeoJSON FeatureCollection
pub fn write_features(path: &Path, features: &[Feature]) -> Result<()> {
    write_json(path, &feature_collection(features))
}

/// Mutable access to the `features` array of a FeatureCollection
pub fn features_mut(collection: &mut Value) -> Result<&mut Vec<Value>> {
    collection
        .get_mut("features")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| CliError::GeoJson("missing \"features\" array".to_string()))
}

pub fn parse_feature_collection(collection: &Value) -> Result<Vec<Feature>> {
    match collection.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {}
        other => {
            return Err(CliError::GeoJson(format!(
                "expected a FeatureCollection, found {}",
                other.unwrap_or("no type")
            )));
        }
    }
    let features = collection
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| CliError::GeoJson("missing \"features\" array".to_string()))?;

    Ok(features
        .iter()
        .enumerate()
        .map(|(i, feature)| parse_feature(i, feature))
        .collect())
}

/// Convert one GeoJSON feature
///
/// A malformed geometry becomes `None` so the engine counts the feature as invalid
/// instead of aborting the whole read.
fn parse_feature(ordinal: usize, feature: &Value) -> Feature {
    let properties = feature
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let geometry = match parse_geometry(feature.get("geometry")) {
        Ok(geometry) => geometry,
        Err(reason) => {
            tracing::warn!("Feature {}: {}", ordinal, reason);
            None
        }
    };

    Feature {
        geometry,
        properties,
    }
}

/// Convert a GeoJSON geometry object, `None` for a missing or `null` geometry
pub fn parse_geometry(geometry: Option<&Value>) -> std::result::Result<Option<Geometry<f64>>, String> {
    let Some(geometry) = geometry.filter(|g| !g.is_null()) else {
        return Ok(None);
    };
    let kind = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or("geometry has no type")?;
    let coordinates = geometry.get("coordinates");

    let parsed = match kind {
        "Polygon" => Geometry::Polygon(parse_polygon(required(coordinates)?)?),
        "MultiPolygon" => {
            let polygons = as_array(required(coordinates)?, "MultiPolygon")?
                .iter()
                .map(parse_polygon)
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Geometry::MultiPolygon(MultiPolygon::new(polygons))
        }
        "Point" => Geometry::Point(parse_position(required(coordinates)?)?.into()),
        "LineString" => Geometry::LineString(parse_line(required(coordinates)?)?),
        other => return Err(format!("unsupported geometry type {other}")),
    };
    Ok(Some(parsed))
}

fn required(value: Option<&Value>) -> std::result::Result<&Value, String> {
    value.ok_or_else(|| "geometry has no coordinates".to_string())
}

fn as_array<'a>(value: &'a Value, what: &str) -> std::result::Result<&'a Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("{what} coordinates must be an array"))
}

fn parse_polygon(rings: &Value) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = as_array(rings, "Polygon")?.iter().map(parse_line);
    let exterior = rings
        .next()
        .ok_or_else(|| "polygon has no exterior ring".to_string())??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_line(positions: &Value) -> std::result::Result<LineString<f64>, String> {
    let coords = as_array(positions, "ring")?
        .iter()
        .map(parse_position)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(LineString::new(coords))
}

/// `[x, y]` or `[x, y, z]`; altitude is dropped
fn parse_position(position: &Value) -> std::result::Result<Coord<f64>, String> {
    let values = as_array(position, "position")?;
    match (
        values.first().and_then(Value::as_f64),
        values.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok(Coord { x, y }),
        _ => Err(format!("invalid position {position}")),
    }
}

pub fn feature_collection(features: &[Feature]) -> Value {
    json!({
        "type": "FeatureCollection",
        "features": features.iter().map(feature_to_value).collect::<Vec<_>>(),
    })
}

fn feature_to_value(feature: &Feature) -> Value {
    json!({
        "type": "Feature",
        "geometry": feature.geometry.as_ref().map_or(Value::Null, geometry_to_value),
        "properties": Value::Object(feature.properties.clone()),
    })
}

fn geometry_to_value(geometry: &Geometry<f64>) -> Value {
    match geometry {
        Geometry::Polygon(polygon) => json!({
            "type": "Polygon",
            "coordinates": polygon_coordinates(polygon),
        }),
        Geometry::MultiPolygon(multi) => json!({
            "type": "MultiPolygon",
            "coordinates": multi.0.iter().map(polygon_coordinates).collect::<Vec<_>>(),
        }),
        Geometry::Point(point) => json!({
            "type": "Point",
            "coordinates": [point.x(), point.y()],
        }),
        Geometry::LineString(line) => json!({
            "type": "LineString",
            "coordinates": line_coordinates(line),
        }),
        _ => Value::Null,
    }
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(line_coordinates)
        .collect()
}

fn line_coordinates(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.0.iter().map(|c| [c.x, c.y]).collect()
}

/// Properties object of a raw GeoJSON feature, created if missing or `null`
pub fn properties_mut(feature: &mut Value) -> Option<&mut Properties> {
    let object = feature.as_object_mut()?;
    let properties = object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if properties.is_null() {
        *properties = Value::Object(Map::new());
    }
    properties.as_object_mut()
}

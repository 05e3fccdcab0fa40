//! GeoJSON writer for feature collections

use crate::error::{Error, Result};
use crate::io::native::ensure_extension;
use crate::vector::{Feature, FeatureCollection};
use geo_types::{Coord, Geometry, LineString, Polygon};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Vector outputs must be GeoJSON
pub fn ensure_vector_path(path: &Path) -> Result<()> {
    ensure_extension(path, &["geojson", "json"], "a GeoJSON path (.geojson/.json)")
}

/// Write a feature collection as a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let value = to_geojson(collection)?;
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(writer, &value).map_err(|e| Error::Other(format!("GeoJSON write error: {}", e)))
}

/// Build the GeoJSON document for a feature collection.
///
/// A known EPSG code is recorded as a named `crs` member so that projected
/// coordinates are not mistaken for WGS84.
pub fn to_geojson(collection: &FeatureCollection) -> Result<Value> {
    let features = collection
        .iter()
        .map(feature_value)
        .collect::<Result<Vec<_>>>()?;

    let mut doc = Map::new();
    doc.insert("type".into(), json!("FeatureCollection"));
    if let Some(code) = collection.crs.as_ref().and_then(|c| c.epsg()) {
        doc.insert(
            "crs".into(),
            json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", code) }
            }),
        );
    }
    doc.insert("features".into(), Value::Array(features));
    Ok(Value::Object(doc))
}

fn feature_value(feature: &Feature) -> Result<Value> {
    let geometry = match &feature.geometry {
        Some(g) => geometry_value(g)?,
        None => Value::Null,
    };
    let properties = serde_json::to_value(&feature.properties)
        .map_err(|e| Error::Other(format!("Cannot encode properties: {}", e)))?;

    let mut value = json!({
        "type": "Feature",
        "properties": properties,
        "geometry": geometry,
    });
    if let Some(id) = &feature.id {
        value["id"] = json!(id);
    }
    Ok(value)
}

fn geometry_value(geometry: &Geometry<f64>) -> Result<Value> {
    let value = match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::LineString(ls) => json!({ "type": "LineString", "coordinates": ring(ls) }),
        Geometry::Polygon(poly) => json!({ "type": "Polygon", "coordinates": polygon(poly) }),
        Geometry::MultiPoint(mp) => json!({
            "type": "MultiPoint",
            "coordinates": mp.iter().map(|p| vec![p.x(), p.y()]).collect::<Vec<_>>(),
        }),
        Geometry::MultiLineString(mls) => json!({
            "type": "MultiLineString",
            "coordinates": mls.iter().map(ring).collect::<Vec<_>>(),
        }),
        Geometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.iter().map(polygon).collect::<Vec<_>>(),
        }),
        other => {
            return Err(Error::UnsupportedDataType(format!(
                "GeoJSON geometry {:?}",
                other
            )))
        }
    };
    Ok(value)
}

fn ring(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.coords().map(|&Coord { x, y }| [x, y]).collect()
}

fn polygon(poly: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .map(ring)
        .collect()
}

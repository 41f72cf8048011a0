//! Decoding of feature-service responses into districts.
//!
//! Two encodings are accepted: GeoJSON feature collections and ArcGIS
//! feature sets (`f=json`). Only the configured id and name attributes are
//! kept, and every geometry is reprojected to WGS84.

use super::crs::Crs;
use super::{District, DistrictId};
use crate::config::BoundaryConfig;
use crate::error::{Error, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon, Winding};
use geojson::GeoJson;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EsriFeatureSet {
    spatial_reference: Option<EsriSpatialReference>,
    #[serde(default)]
    features: Vec<EsriFeature>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EsriSpatialReference {
    wkid: Option<i64>,
    latest_wkid: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EsriFeature {
    #[serde(default)]
    attributes: Map<String, Value>,
    geometry: Option<EsriPolygon>,
}

#[derive(Debug, Deserialize)]
struct EsriPolygon {
    #[serde(default)]
    rings: Vec<Vec<Vec<f64>>>,
}

/// Parse a feature-service response body into WGS84 districts.
pub fn parse_feature_collection(bytes: &[u8], fields: &BoundaryConfig) -> Result<Vec<District>> {
    let value: Value = serde_json::from_slice(bytes)?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(Error::Boundary(format!(
            "feature service returned an error: {message}"
        )));
    }

    let is_geojson = matches!(
        value.get("type").and_then(Value::as_str),
        Some("FeatureCollection" | "Feature")
    );

    let districts = if is_geojson {
        parse_geojson(value, fields)?
    } else {
        parse_esri(value, fields)?
    };

    debug!("Parsed {} district polygons", districts.len());
    Ok(districts)
}

fn parse_geojson(value: Value, fields: &BoundaryConfig) -> Result<Vec<District>> {
    let crs = value
        .pointer("/crs/properties/name")
        .and_then(Value::as_str)
        .map(Crs::from_name)
        .unwrap_or_default();

    let features = match GeoJson::from_json_value(value)
        .map_err(|e| Error::Boundary(format!("invalid GeoJSON: {e}")))?
    {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => {
            return Err(Error::Boundary(
                "expected features, found a bare geometry".to_string(),
            ))
        }
    };

    let mut districts = Vec::with_capacity(features.len());
    for (i, feature) in features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry else {
            debug!("Skipping feature {i} without geometry");
            continue;
        };

        let polygons = match geometry.value {
            geojson::Value::Polygon(rings) => vec![rings],
            geojson::Value::MultiPolygon(polygons) => polygons,
            _ => {
                debug!("Skipping feature {i} with non-polygon geometry");
                continue;
            }
        };

        let polygons = polygons
            .into_iter()
            .filter(|rings| !rings.is_empty())
            .map(|rings| {
                let mut rings = rings
                    .iter()
                    .map(|ring| line_string(ring.iter().map(|p| p.as_slice())))
                    .collect::<Result<Vec<_>>>()?;
                let exterior = rings.remove(0);
                Ok(Polygon::new(exterior, rings))
            })
            .collect::<Result<Vec<_>>>()?;

        let properties = feature.properties.unwrap_or_default();
        districts.push(district(i, &properties, MultiPolygon::new(polygons), &crs, fields)?);
    }
    Ok(districts)
}

fn parse_esri(value: Value, fields: &BoundaryConfig) -> Result<Vec<District>> {
    let set: EsriFeatureSet = serde_json::from_value(value)?;
    let crs = set
        .spatial_reference
        .as_ref()
        .and_then(|sr| sr.latest_wkid.or(sr.wkid))
        .map(Crs::from_epsg)
        .unwrap_or_default();
    trace!("ArcGIS feature set in {crs} with {} features", set.features.len());

    let mut districts = Vec::with_capacity(set.features.len());
    for (i, feature) in set.features.into_iter().enumerate() {
        let rings = feature.geometry.map(|g| g.rings).unwrap_or_default();
        if rings.is_empty() {
            debug!("Skipping feature {i} without geometry");
            continue;
        }

        let rings = rings
            .iter()
            .map(|ring| line_string(ring.iter().map(|p| p.as_slice())))
            .collect::<Result<Vec<_>>>()?;

        districts.push(district(i, &feature.attributes, group_rings(rings), &crs, fields)?);
    }
    Ok(districts)
}

fn district(
    index: usize,
    attributes: &Map<String, Value>,
    geometry: MultiPolygon<f64>,
    crs: &Crs,
    fields: &BoundaryConfig,
) -> Result<District> {
    let id = attributes
        .get(&fields.id_field)
        .and_then(DistrictId::from_json)
        .ok_or_else(|| {
            Error::Boundary(format!("feature {index} has no {} attribute", fields.id_field))
        })?;

    let name = match attributes.get(&fields.name_field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => {
            return Err(Error::Boundary(format!(
                "feature {index} has no {} attribute",
                fields.name_field
            )))
        }
        Some(other) => other.to_string(),
    };

    Ok(District {
        id,
        name,
        geometry: crs.to_wgs84(geometry)?,
    })
}

fn line_string<'a>(positions: impl Iterator<Item = &'a [f64]>) -> Result<LineString<f64>> {
    let coords = positions
        .map(|p| match p {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(Error::Boundary(format!(
                "position needs two coordinates, got {}",
                p.len()
            ))),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut ring = LineString::new(coords);
    ring.close();
    Ok(ring)
}

/// Twice the signed area; positive for counter-clockwise rings.
/// ArcGIS rings: clockwise rings start polygons, counter-clockwise rings are
/// holes in the most recent polygon.
fn group_rings(rings: Vec<LineString<f64>>) -> MultiPolygon<f64> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for ring in rings {
        if ring.is_ccw() {
            if let Some((_, holes)) = polygons.last_mut() {
                holes.push(ring);
                continue;
            }
        }
        polygons.push((ring, Vec::new()));
    }

    MultiPolygon::new(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    )
}

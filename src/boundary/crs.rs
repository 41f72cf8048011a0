use crate::error::{Error, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use std::f64::consts::PI;
use std::fmt;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Coordinate reference system of a boundary layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Crs {
    /// EPSG:4326 longitude/latitude
    #[default]
    Wgs84,
    /// EPSG:3857 spherical Mercator (ESRI 102100)
    WebMercator,
    Other(String),
}

impl Crs {
    pub fn from_epsg(code: i64) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 | 900913 | 102100 | 102113 => Crs::WebMercator,
            other => Crs::Other(format!("EPSG:{other}")),
        }
    }

    /// Parse names such as `EPSG:4326`, `urn:ogc:def:crs:EPSG::3857` or `CRS84`.
    pub fn from_name(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Crs::Wgs84;
        }
        upper
            .rsplit(':')
            .next()
            .and_then(|code| code.parse::<i64>().ok())
            .map(Crs::from_epsg)
            .unwrap_or_else(|| Crs::Other(name.to_string()))
    }

    pub fn to_wgs84(&self, geometry: MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        match self {
            Crs::Wgs84 => Ok(geometry),
            Crs::WebMercator => Ok(geometry.map_coords(web_mercator_to_wgs84)),
            Crs::Other(name) => Err(Error::Boundary(format!(
                "cannot reproject boundaries from {name} to WGS84"
            ))),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => f.write_str("EPSG:4326"),
            Crs::WebMercator => f.write_str("EPSG:3857"),
            Crs::Other(name) => f.write_str(name),
        }
    }
}

fn web_mercator_to_wgs84(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    Coord { x: lon, y: lat }
}

//! District boundary polygons.
//!
//! A [`BoundarySource`] yields the district layer used as the spatial join's
//! right-hand side. The production source fetches a feature-service query
//! once per run; file and static sources cover offline runs and tests.

use crate::config::BoundaryConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use geo::MultiPolygon;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use tracing::info;

pub mod crs;
pub mod parse;

pub use crs::Crs;
pub use parse::parse_feature_collection;

/// District identifier as published by the feature service.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum DistrictId {
    Number(i64),
    Text(String),
}

impl DistrictId {
    /// Integral numbers and numeric strings become `Number`; NULL yields `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(match n.as_i64() {
                Some(i) => DistrictId::Number(i),
                None => match n.as_f64() {
                    Some(f) if f.fract() == 0.0 => DistrictId::Number(f as i64),
                    _ => DistrictId::Text(n.to_string()),
                },
            }),
            Value::String(s) => Some(
                s.trim()
                    .parse::<i64>()
                    .map(DistrictId::Number)
                    .unwrap_or_else(|_| DistrictId::Text(s.clone())),
            ),
            other => Some(DistrictId::Text(other.to_string())),
        }
    }
}

impl fmt::Display for DistrictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistrictId::Number(n) => write!(f, "{n}"),
            DistrictId::Text(s) => f.write_str(s),
        }
    }
}

/// One boundary polygon, in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct District {
    pub id: DistrictId,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[async_trait]
pub trait BoundarySource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<District>>;
}

/// Fetches the district layer from a feature-service URL.
pub struct HttpBoundarySource {
    http: Client,
    config: BoundaryConfig,
}

impl HttpBoundarySource {
    pub fn new(config: BoundaryConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl BoundarySource for HttpBoundarySource {
    async fn fetch(&self) -> Result<Vec<District>> {
        info!("Fetching district boundaries from {}", self.config.url);
        let response = self.http.get(&self.config.url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(Error::Boundary(format!(
                "feature service returned {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        parse_feature_collection(&body, &self.config)
    }
}

/// Reads a saved feature-service response (GeoJSON or ArcGIS JSON) from disk.
pub struct FileBoundarySource {
    path: PathBuf,
    config: BoundaryConfig,
}

impl FileBoundarySource {
    pub fn new(path: impl Into<PathBuf>, config: BoundaryConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

#[async_trait]
impl BoundarySource for FileBoundarySource {
    async fn fetch(&self) -> Result<Vec<District>> {
        info!("Reading district boundaries from {}", self.path.display());
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::Boundary(format!("failed to read {}: {e}", self.path.display()))
        })?;
        parse_feature_collection(&bytes, &self.config)
    }
}

pub struct StaticBoundarySource {
    districts: Vec<District>,
}

impl StaticBoundarySource {
    pub fn new(districts: Vec<District>) -> Self {
        Self { districts }
    }
}

#[async_trait]
impl BoundarySource for StaticBoundarySource {
    async fn fetch(&self) -> Result<Vec<District>> {
        Ok(self.districts.clone())
    }
}

//! Pipeline configuration.
//!
//! Every knob the pipeline reads lives in [`Config`], which is built once by the
//! caller (see [`ConfigLoader`]) and handed to the stages explicitly. Nothing in
//! the crate reads or writes process environment outside of
//! [`Config::merge_env_vars`].

use crate::error::{Error, Result};
use crate::report::OutputFormat;
use crate::warehouse::TableRef;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod loader;

pub use loader::ConfigLoader;

/// Default feature-service query for the council district layer, WGS84 output.
pub const COUNCIL_DISTRICTS_URL: &str = "https://services1.arcgis.com/tp9wqSVX1AitKgjd/\
arcgis/rest/services/MA_IRZ_MAP/FeatureServer/3/query?where=1%3D1&outFields=*&outSR=4326&f=json";

pub const DEFAULT_BIGQUERY_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Upper bound for `filter.window_days` (one hundred years).
pub const MAX_WINDOW_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub warehouse: WarehouseConfig,
    pub boundaries: BoundaryConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
}

/// Connection parameters and credentials for the service-request warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub endpoint: String,
    pub project_id: String,
    pub dataset_id: String,
    pub table: String,
    /// OAuth bearer token sent with every warehouse request
    pub access_token: Option<String>,
    /// File holding the bearer token, read when `access_token` is unset
    pub token_file: Option<PathBuf>,
    /// Rows requested per page
    pub page_size: u32,
    pub columns: ColumnConfig,
}

/// Warehouse column names for the five extracted fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub id: String,
    pub category: String,
    pub created: String,
    pub longitude: String,
    pub latitude: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryConfig {
    pub url: String,
    pub id_field: String,
    pub name_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Category dropped at the warehouse; `None` keeps every category
    pub excluded_category: Option<String>,
    /// Length of the trailing window ending today, in days
    pub window_days: u32,
    /// Row limit applied to the SQL preview handed to the query hook
    pub preview_rows: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_BIGQUERY_ENDPOINT.to_string(),
            project_id: "ita-datalakepoc".to_string(),
            dataset_id: "publicwork_311".to_string(),
            table: "ServiceRequestTopLevel".to_string(),
            access_token: None,
            token_file: None,
            page_size: 10_000,
            columns: ColumnConfig::default(),
        }
    }
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id: "SRNumber".to_string(),
            category: "SRType".to_string(),
            created: "CreatedDate".to_string(),
            longitude: "Longitude".to_string(),
            latitude: "Latitude".to_string(),
        }
    }
}

impl ColumnConfig {
    /// Projection order used by the extract query.
    pub fn projection(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.category.clone(),
            self.created.clone(),
            self.longitude.clone(),
            self.latitude.clone(),
        ]
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            url: COUNCIL_DISTRICTS_URL.to_string(),
            id_field: "District".to_string(),
            name_field: "NAME".to_string(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_category: Some("Homeless Encampment".to_string()),
            window_days: 183,
            preview_rows: 10,
        }
    }
}

impl WarehouseConfig {
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.project_id, &self.dataset_id, &self.table)
    }

    /// Resolve the bearer token, preferring the inline value over the token file.
    pub fn resolve_access_token(&self) -> Result<String> {
        if let Some(token) = self.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
            return Ok(token.trim().to_string());
        }

        let path = self.token_file.as_ref().ok_or_else(|| {
            Error::Config(
                "no warehouse access token: set warehouse.access_token, warehouse.token_file \
                 or CIVIC311_ACCESS_TOKEN"
                    .to_string(),
            )
        })?;

        let token = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read token file {}: {e}", path.display()))
        })?;
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Config(format!(
                "token file {} is empty",
                path.display()
            )));
        }
        Ok(token.to_string())
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_env_vars(&mut self) {
        self.merge_env_with(|key| std::env::var(key).ok());
    }

    /// Apply `CIVIC311_*` overrides using the given lookup.
    pub fn merge_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = lookup("CIVIC311_PROJECT_ID") {
            self.warehouse.project_id = project;
        }

        if let Some(dataset) = lookup("CIVIC311_DATASET_ID") {
            self.warehouse.dataset_id = dataset;
        }

        if let Some(token) = lookup("CIVIC311_ACCESS_TOKEN") {
            self.warehouse.access_token = Some(token);
        }

        if let Some(path) = lookup("CIVIC311_TOKEN_FILE") {
            self.warehouse.token_file = Some(PathBuf::from(path));
        }

        if let Some(url) = lookup("CIVIC311_BOUNDARY_URL") {
            self.boundaries.url = url;
        }

        if let Some(category) = lookup("CIVIC311_EXCLUDED_CATEGORY") {
            self.filter.excluded_category = if category.is_empty() {
                None
            } else {
                Some(category)
            };
        }
    }

    pub fn validate(&self) -> Result<()> {
        let w = &self.warehouse;
        for (name, value) in [
            ("warehouse.project_id", &w.project_id),
            ("warehouse.dataset_id", &w.dataset_id),
            ("warehouse.table", &w.table),
            ("boundaries.id_field", &self.boundaries.id_field),
            ("boundaries.name_field", &self.boundaries.name_field),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }

        if w.page_size == 0 {
            return Err(Error::Config(
                "warehouse.page_size must be greater than zero".to_string(),
            ));
        }

        if self.filter.window_days > MAX_WINDOW_DAYS {
            return Err(Error::Config(format!(
                "filter.window_days must be at most {MAX_WINDOW_DAYS}, got {}",
                self.filter.window_days
            )));
        }

        let projection = w.columns.projection();
        for (i, column) in projection.iter().enumerate() {
            if column.trim().is_empty() {
                return Err(Error::Config("warehouse column names must not be empty".to_string()));
            }
            if projection[..i].contains(column) {
                return Err(Error::Config(format!(
                    "warehouse column {column} is mapped more than once"
                )));
            }
        }

        Ok(())
    }
}

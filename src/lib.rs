//! # civic311
//!
//! Counts 311 service requests per council district and request category.
//!
//! ## Usage
//!
//! ```bash
//! civic311 run [--config civic311.toml] [--snapshot rows.csv] [--boundaries districts.json]
//! civic311 sql [--today 2026-03-15]
//! ```
//!
//! ## Modules
//!
//! - `config` - Connection parameters, column mapping and filter settings
//! - `warehouse` - Query builder and paginated row sources (BigQuery, in-memory, CSV)
//! - `extract` - Stage 1: year and category filtered pull from the warehouse
//! - `boundary` - District polygons from a feature service or file
//! - `geojoin` - Stage 2: typed parsing, trailing window and point-in-polygon join
//! - `aggregate` - Stage 3: counts per district and category
//! - `report` - Table, JSON and CSV rendering
//! - `pipeline` - The stages run in order
pub mod aggregate;
pub mod boundary;
pub mod config;
pub mod error;
pub mod extract;
pub mod geojoin;
pub mod pipeline;
pub mod report;
pub mod warehouse;

pub use error::{Error, Result};

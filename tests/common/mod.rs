//! Common test utilities and helpers

use civic311::boundary::{District, DistrictId};
use civic311::config::Config;
use civic311::warehouse::{InMemorySource, Row};
use geo::{polygon, MultiPolygon};

/// Builder for in-memory warehouse snapshots using the default column names
pub struct SnapshotBuilder {
    rows: Vec<Row>,
    page_size: usize,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            page_size: 1_000,
        }
    }

    /// Add a request; empty strings become NULL
    pub fn request(mut self, id: &str, kind: &str, created: &str, lon: &str, lat: &str) -> Self {
        self.rows.push(
            [id, kind, created, lon, lat]
                .iter()
                .map(|v| (!v.is_empty()).then(|| v.to_string()))
                .collect(),
        );
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn build(self) -> InMemorySource {
        InMemorySource::new(Config::new().warehouse.columns.projection(), self.rows)
            .with_page_size(self.page_size)
    }
}

/// Axis-aligned square district with its south-west corner at (x0, y0)
pub fn square_district(id: i64, name: &str, x0: f64, y0: f64, size: f64) -> District {
    District {
        id: DistrictId::Number(id),
        name: name.to_string(),
        geometry: MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
        ]]),
    }
}

//! The three stages wired together.
//!
//! A run is strictly sequential: extract, then fetch boundaries and join,
//! then aggregate. Each source is called once.

use crate::aggregate::{aggregate_by_category, AggregateRow};
use crate::boundary::BoundarySource;
use crate::config::Config;
use crate::error::Result;
use crate::extract::{extract, QueryHook};
use crate::geojoin::geo_join;
use crate::warehouse::TableSource;
use chrono::NaiveDate;
use tracing::info;

/// Row counts per stage plus the final aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub extracted: usize,
    pub districts: usize,
    pub joined: usize,
    pub aggregate: Vec<AggregateRow>,
}

pub struct Pipeline {
    config: Config,
    requests: Box<dyn TableSource>,
    boundaries: Box<dyn BoundarySource>,
    query_hook: Option<QueryHook>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        requests: Box<dyn TableSource>,
        boundaries: Box<dyn BoundarySource>,
    ) -> Self {
        Self {
            config,
            requests,
            boundaries,
            query_hook: None,
        }
    }

    /// Receive the compiled SQL preview before the warehouse query runs.
    pub fn with_query_hook(mut self, hook: QueryHook) -> Self {
        self.query_hook = Some(hook);
        self
    }

    /// Run every stage with `today` as the reference date for the year
    /// filter and the trailing window.
    pub async fn run(&self, today: NaiveDate) -> Result<PipelineOutput> {
        info!("Starting pipeline run for {today}");

        let raw = extract(
            self.requests.as_ref(),
            &self.config,
            today,
            self.query_hook.as_ref(),
        )
        .await?;
        let extracted = raw.len();

        let districts = self.boundaries.fetch().await?;
        let joined = geo_join(raw, &districts, today, self.config.filter.window_days)?;

        let aggregate = aggregate_by_category(&joined);
        info!(
            "Pipeline finished: {} extracted, {} joined, {} groups",
            extracted,
            joined.len(),
            aggregate.len()
        );

        Ok(PipelineOutput {
            extracted,
            districts: districts.len(),
            joined: joined.len(),
            aggregate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{District, DistrictId, StaticBoundarySource};
    use crate::warehouse::InMemorySource;
    use geo::{polygon, MultiPolygon};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    fn districts() -> Vec<District> {
        vec![
            District {
                id: DistrictId::Number(1),
                name: "West".to_string(),
                geometry: MultiPolygon::new(vec![polygon![
                    (x: -119.0, y: 33.0), (x: -118.3, y: 33.0),
                    (x: -118.3, y: 35.0), (x: -119.0, y: 35.0),
                ]]),
            },
            District {
                id: DistrictId::Number(2),
                name: "East".to_string(),
                geometry: MultiPolygon::new(vec![polygon![
                    (x: -118.3, y: 33.0), (x: -117.5, y: 33.0),
                    (x: -117.5, y: 35.0), (x: -118.3, y: 35.0),
                ]]),
            },
        ]
    }

    fn requests(rows: &[(&str, &str, &str, &str, &str)]) -> InMemorySource {
        let columns = Config::new().warehouse.columns.projection();
        let rows = rows
            .iter()
            .map(|(id, kind, created, lon, lat)| {
                [id, kind, created, lon, lat]
                    .iter()
                    .map(|v| (!v.is_empty()).then(|| v.to_string()))
                    .collect()
            })
            .collect();
        InMemorySource::new(columns, rows)
    }

    fn pipeline(rows: &[(&str, &str, &str, &str, &str)]) -> Pipeline {
        Pipeline::new(
            Config::new(),
            Box::new(requests(rows)),
            Box::new(StaticBoundarySource::new(districts())),
        )
    }

    const ROWS: &[(&str, &str, &str, &str, &str)] = &[
        ("1", "Pothole", "2026-03-01T08:00:00", "-118.5", "34.0"),
        ("2", "Pothole", "2026-02-01T08:00:00", "-118.6", "34.1"),
        ("3", "Pothole", "03/10/2026 04:30:00 PM", "-118.0", "34.0"),
        ("4", "Graffiti", "2025-12-24T08:00:00", "-118.0", "34.2"),
        ("5", "Homeless Encampment", "2026-03-01T08:00:00", "-118.0", "34.2"),
        ("6", "Pothole", "2025-01-05T08:00:00", "-118.5", "34.0"),
        ("7", "Pothole", "2026-03-02T08:00:00", "", "34.0"),
        ("8", "Pothole", "2026-03-02T08:00:00", "-100.0", "40.0"),
    ];

    #[tokio::test]
    async fn test_full_run() {
        let output = pipeline(ROWS).run(today()).await.unwrap();

        // 5 is excluded at the source; 6 is in the prior year but outside the window
        assert_eq!(output.extracted, 7);
        assert_eq!(output.districts, 2);
        assert_eq!(output.joined, 4);

        let counts: Vec<_> = output
            .aggregate
            .iter()
            .map(|r| (r.district_id.to_string(), r.category.as_str(), r.count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("1".to_string(), "Pothole", 2),
                ("2".to_string(), "Graffiti", 1),
                ("2".to_string(), "Pothole", 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_same_inputs_same_day_are_deterministic() {
        let first = pipeline(ROWS).run(today()).await.unwrap();
        let second = pipeline(ROWS).run(today()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_extract_propagates() {
        let output = pipeline(&[]).run(today()).await.unwrap();
        assert_eq!(output.extracted, 0);
        assert_eq!(output.joined, 0);
        assert!(output.aggregate.is_empty());
    }
}

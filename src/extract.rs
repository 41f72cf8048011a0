//! Stage 1: pull service requests from the warehouse.
//!
//! Rows are restricted at the source to creation dates mentioning the current
//! or prior calendar year and to every category but the excluded one. The year
//! test is a substring match on the raw date text, not a calendar range.

use crate::config::{ColumnConfig, Config};
use crate::error::{Error, Result};
use crate::warehouse::{fetch_all, Predicate, RawTable, SelectQuery, TableSource};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Receives the compiled SQL preview before the query runs.
pub type QueryHook = Arc<dyn Fn(&str) + Send + Sync>;

/// A service request exactly as the warehouse returned it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawServiceRequest {
    pub sr_number: Option<String>,
    pub sr_type: Option<String>,
    pub created_date: Option<String>,
    pub longitude: Option<String>,
    pub latitude: Option<String>,
}

pub fn build_extract_query(config: &Config, today: NaiveDate) -> Result<SelectQuery> {
    let columns = &config.warehouse.columns;
    let current_year = today.year().to_string();
    let prior_year = (today.year() - 1).to_string();

    let mut builder = SelectQuery::builder(config.warehouse.table_ref())
        .select(columns.projection())
        .filter(
            Predicate::contains(&columns.created, &current_year)
                .or(Predicate::contains(&columns.created, &prior_year)),
        );

    if let Some(excluded) = &config.filter.excluded_category {
        builder = builder.filter(Predicate::not_equals(&columns.category, excluded));
    }

    builder.build()
}

/// Dry run: the SQL that `extract` would preview, without touching a source.
pub fn preview_sql(config: &Config, today: NaiveDate) -> Result<String> {
    let query = build_extract_query(config, today)?;
    Ok(query.with_limit(config.filter.preview_rows).to_sql())
}

pub async fn extract(
    source: &dyn TableSource,
    config: &Config,
    today: NaiveDate,
    hook: Option<&QueryHook>,
) -> Result<Vec<RawServiceRequest>> {
    let query = build_extract_query(config, today)?;

    let preview = query.with_limit(config.filter.preview_rows).to_sql();
    debug!("Extract query preview:\n{preview}");
    if let Some(hook) = hook {
        hook(&preview);
    }

    let table = fetch_all(source, &query).await?;
    info!("Successfully executed query ({} rows)", table.len());

    rows_to_requests(table, &config.warehouse.columns)
}

fn rows_to_requests(table: RawTable, columns: &ColumnConfig) -> Result<Vec<RawServiceRequest>> {
    let index = |name: &str| {
        table.column_index(name).ok_or_else(|| {
            Error::Warehouse(format!("result is missing expected column {name}"))
        })
    };

    // An empty result may come back without a schema
    if table.is_empty() {
        return Ok(Vec::new());
    }

    let id = index(&columns.id)?;
    let category = index(&columns.category)?;
    let created = index(&columns.created)?;
    let longitude = index(&columns.longitude)?;
    let latitude = index(&columns.latitude)?;

    Ok(table
        .rows
        .into_iter()
        .map(|mut row| RawServiceRequest {
            sr_number: row[id].take(),
            sr_type: row[category].take(),
            created_date: row[created].take(),
            longitude: row[longitude].take(),
            latitude: row[latitude].take(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::InMemorySource;
    use std::sync::Mutex;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    }

    fn row(id: &str, kind: Option<&str>, created: &str) -> Vec<Option<String>> {
        vec![
            Some(id.to_string()),
            kind.map(str::to_string),
            Some(created.to_string()),
            Some("-118.25".to_string()),
            Some("34.05".to_string()),
            Some("ignored".to_string()),
        ]
    }

    fn source() -> InMemorySource {
        let columns = [
            "SRNumber",
            "SRType",
            "CreatedDate",
            "Longitude",
            "Latitude",
            "Owner",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        InMemorySource::new(
            columns,
            vec![
                row("a", Some("Pothole"), "03/01/2026 08:00:00 AM"),
                row("b", Some("Pothole"), "2025-12-31T23:59:59"),
                row("c", Some("Pothole"), "2024-06-01T00:00:00"),
                row("d", Some("Homeless Encampment"), "2026-01-02T00:00:00"),
                row("e", None, "2026-01-02T00:00:00"),
                row("f", Some("Graffiti"), "Ticket 2025 reopened"),
            ],
        )
        .with_page_size(2)
    }

    #[test]
    fn test_query_restricts_years_and_category() {
        let query = build_extract_query(&Config::new(), today()).unwrap();
        let sql = query.to_sql();
        assert!(sql.contains("STRPOS(`CreatedDate`, '2026') > 0"));
        assert!(sql.contains("STRPOS(`CreatedDate`, '2025') > 0"));
        assert!(sql.contains("`SRType` != 'Homeless Encampment'"));
        assert_eq!(query.limit, None);
        assert_eq!(query.columns.len(), 5);
    }

    #[test]
    fn test_preview_sql_is_limited() {
        let sql = preview_sql(&Config::new(), today()).unwrap();
        assert!(sql.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_no_excluded_category_drops_that_filter() {
        let mut config = Config::new();
        config.filter.excluded_category = None;
        let sql = build_extract_query(&config, today()).unwrap().to_sql();
        assert!(!sql.contains("!="));
    }

    #[tokio::test]
    async fn test_extract_keeps_only_matching_rows() {
        let source = source();
        let config = Config::new();

        let rows = extract(&source, &config, today(), None).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.sr_number.as_deref().unwrap()).collect();
        // "e" has a NULL category, which `!=` never keeps
        assert_eq!(ids, vec!["a", "b", "f"]);

        for row in &rows {
            let created = row.created_date.as_deref().unwrap();
            assert!(created.contains("2026") || created.contains("2025"));
            assert_ne!(row.sr_type.as_deref(), Some("Homeless Encampment"));
        }
    }

    #[tokio::test]
    async fn test_extract_runs_unlimited_query_and_calls_hook() {
        let source = source();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook: QueryHook = {
            let seen = seen.clone();
            Arc::new(move |sql: &str| seen.lock().unwrap().push(sql.to_string()))
        };

        extract(&source, &Config::new(), today(), Some(&hook))
            .await
            .unwrap();

        let previews = seen.lock().unwrap().clone();
        assert_eq!(previews.len(), 1);
        assert!(previews[0].ends_with("LIMIT 10"));

        let executed = source.executed_queries().await;
        assert_eq!(executed.len(), 1);
        assert!(!executed[0].contains("LIMIT"));
    }

    #[tokio::test]
    async fn test_extract_empty_source() {
        let source = InMemorySource::new(
            Config::new().warehouse.columns.projection(),
            Vec::new(),
        );
        let rows = extract(&source, &Config::new(), today(), None).await.unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_column_in_result_is_error() {
        let table = RawTable {
            columns: vec!["SRNumber".to_string()],
            rows: vec![vec![Some("x".to_string())]],
        };
        let result = rows_to_requests(table, &ColumnConfig::default());
        assert!(matches!(result, Err(Error::Warehouse(_))));
    }
}

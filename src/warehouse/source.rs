//! Paginated tabular sources.
//!
//! [`TableSource`] is the seam between the extract stage and wherever rows
//! come from. Sources hand back one page at a time; [`fetch_all`] drains them
//! into a [`RawTable`].

use super::query::SelectQuery;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// One result row, positionally aligned with its page's columns. `None` is NULL.
pub type Row = Vec<Option<String>>;

/// Where the next page of a result set starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub job_id: Option<String>,
    pub location: Option<String>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPage {
    /// Column names; may be empty on a page that carries no rows
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub next: Option<PageCursor>,
}

/// A fully materialized result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait TableSource: Send + Sync {
    /// Fetch one page of `query`'s result. `cursor` is `None` for the first page
    /// and the previous page's `next` afterwards.
    async fn fetch_page(&self, query: &SelectQuery, cursor: Option<&PageCursor>)
        -> Result<RowPage>;
}

/// Run `query` and collect every page. No row cap beyond the query's own limit.
pub async fn fetch_all(source: &dyn TableSource, query: &SelectQuery) -> Result<RawTable> {
    let mut table = RawTable::default();
    let mut cursor: Option<PageCursor> = None;
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(query, cursor.as_ref()).await?;
        pages += 1;
        trace!(
            "Page {} returned {} rows (more: {})",
            pages,
            page.rows.len(),
            page.next.is_some()
        );

        if !page.columns.is_empty() {
            if table.columns.is_empty() {
                table.columns = page.columns;
            } else if table.columns != page.columns {
                return Err(Error::Warehouse(format!(
                    "page {pages} changed the result schema from {:?} to {:?}",
                    table.columns, page.columns
                )));
            }
        }

        if !page.rows.is_empty() {
            if table.columns.is_empty() {
                return Err(Error::Warehouse(
                    "received rows before the result schema".to_string(),
                ));
            }
            if let Some(bad) = page.rows.iter().find(|r| r.len() != table.columns.len()) {
                return Err(Error::Warehouse(format!(
                    "row has {} values but the result has {} columns",
                    bad.len(),
                    table.columns.len()
                )));
            }
            table.rows.extend(page.rows);
        }

        match page.next {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    debug!("Fetched {} rows in {} page(s)", table.rows.len(), pages);
    Ok(table)
}

/// Rows held in memory, queried with the same semantics as the warehouse.
///
/// Backs offline snapshots (`from_csv`) and tests. Every executed query's SQL
/// is recorded for inspection.
pub struct InMemorySource {
    columns: Vec<String>,
    rows: Vec<Row>,
    page_size: usize,
    executed: Arc<Mutex<Vec<String>>>,
}

impl InMemorySource {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            page_size: 1_000,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Load a CSV snapshot with a header row. Empty cells are NULL.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(
                record
                    .iter()
                    .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                    .collect(),
            );
        }

        debug!("Loaded {} snapshot rows from {}", rows.len(), path.display());
        Ok(Self::new(columns, rows))
    }

    /// SQL text of every query whose first page was requested.
    pub async fn executed_queries(&self) -> Vec<String> {
        self.executed.lock().await.clone()
    }

    fn index_of(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| Error::Query(format!("unrecognized column: {column}")))
    }

    fn matching_rows(&self, query: &SelectQuery) -> Result<Vec<&Row>> {
        for column in query.referenced_columns() {
            self.index_of(column)?;
        }

        let mut matched: Vec<&Row> = match &query.filter {
            Some(filter) => self
                .rows
                .iter()
                .filter(|row| {
                    let value_of = |column: &str| {
                        self.columns
                            .iter()
                            .position(|c| c == column)
                            .and_then(|i| row.get(i))
                            .and_then(|v| v.as_deref())
                    };
                    filter.evaluate(&value_of) == Some(true)
                })
                .collect(),
            None => self.rows.iter().collect(),
        };

        if let Some(limit) = query.limit {
            matched.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(matched)
    }
}

#[async_trait]
impl TableSource for InMemorySource {
    async fn fetch_page(
        &self,
        query: &SelectQuery,
        cursor: Option<&PageCursor>,
    ) -> Result<RowPage> {
        let offset = match cursor.and_then(|c| c.page_token.as_deref()) {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| Error::Query(format!("invalid page token: {token}")))?,
            None => {
                self.executed.lock().await.push(query.to_sql());
                0
            }
        };

        let matched = self.matching_rows(query)?;

        let (columns, projection): (Vec<String>, Vec<usize>) = if query.columns.is_empty() {
            (self.columns.clone(), (0..self.columns.len()).collect())
        } else {
            let indexes = query
                .columns
                .iter()
                .map(|c| self.index_of(c))
                .collect::<Result<Vec<_>>>()?;
            (query.columns.clone(), indexes)
        };

        let end = (offset + self.page_size).min(matched.len());
        let rows = matched
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|row| projection.iter().map(|&i| row.get(i).cloned().flatten()).collect())
            .collect();

        let next = (end < matched.len()).then(|| PageCursor {
            page_token: Some(end.to_string()),
            ..Default::default()
        });

        Ok(RowPage {
            columns,
            rows,
            next,
        })
    }
}

//! BigQuery REST client.
//!
//! The first page of a query comes from `jobs.query`; later pages, and polls
//! for jobs that did not finish within the first call, go through
//! `jobs.getQueryResults` using the job reference carried in [`PageCursor`].

use super::query::SelectQuery;
use super::source::{PageCursor, Row, RowPage, TableSource};
use crate::config::WarehouseConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

pub struct BigQueryClient {
    cfg: WarehouseConfig,
    http: Client,
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    job_complete: Option<bool>,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<ResultRow>,
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ResultRow {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Decode a `jobs.query` / `jobs.getQueryResults` response body into a page.
pub fn parse_query_response(body: &str) -> Result<RowPage> {
    let response: QueryResponse = serde_json::from_str(body)?;

    let columns = response
        .schema
        .map(|s| s.fields.into_iter().map(|f| f.name).collect())
        .unwrap_or_default();

    let rows: Vec<Row> = response
        .rows
        .into_iter()
        .map(|row| row.f.into_iter().map(|cell| cell_value(cell.v)).collect())
        .collect();

    let complete = response.job_complete.unwrap_or(true);
    let next = if !complete || response.page_token.is_some() {
        let job = response.job_reference.ok_or_else(|| {
            Error::Warehouse("response has more results but no job reference".to_string())
        })?;
        Some(PageCursor {
            job_id: Some(job.job_id),
            location: job.location,
            // An unfinished job is polled from the start of its results
            page_token: if complete { response.page_token } else { None },
        })
    } else {
        None
    };

    Ok(RowPage {
        columns,
        rows,
        next,
    })
}

fn cell_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

impl BigQueryClient {
    pub fn new(cfg: WarehouseConfig) -> Result<Self> {
        let access_token = cfg.resolve_access_token()?;
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            cfg,
            http,
            access_token,
        })
    }

    fn queries_url(&self) -> Result<Url> {
        let url = format!(
            "{}/projects/{}/queries",
            self.cfg.endpoint.trim_end_matches('/'),
            self.cfg.project_id
        );
        Ok(Url::parse(&url)?)
    }

    fn results_url(&self, cursor: &PageCursor) -> Result<Url> {
        let job_id = cursor.job_id.as_deref().ok_or_else(|| {
            Error::Warehouse("page cursor is missing the query job id".to_string())
        })?;

        let mut url = self.queries_url()?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::Config(format!("invalid warehouse endpoint: {}", self.cfg.endpoint))
            })?
            .push(job_id);
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("maxResults", &self.cfg.page_size.to_string());
            if let Some(token) = &cursor.page_token {
                qp.append_pair("pageToken", token);
            }
            if let Some(location) = &cursor.location {
                qp.append_pair("location", location);
            }
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<RowPage> {
        let response = request.bearer_auth(&self.access_token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(Error::Warehouse(format!(
                "BigQuery returned {status}: {message}"
            )));
        }

        trace!("BigQuery response: {} bytes", body.len());
        parse_query_response(&body)
    }
}

#[async_trait]
impl TableSource for BigQueryClient {
    async fn fetch_page(
        &self,
        query: &SelectQuery,
        cursor: Option<&PageCursor>,
    ) -> Result<RowPage> {
        match cursor {
            None => {
                let sql = query.to_sql();
                debug!("Submitting query to {}", query.table);
                let body = QueryRequest {
                    query: &sql,
                    use_legacy_sql: false,
                    max_results: self.cfg.page_size,
                };
                self.send(self.http.post(self.queries_url()?).json(&body))
                    .await
            }
            Some(cursor) => {
                debug!(
                    "Fetching results for job {}",
                    cursor.job_id.as_deref().unwrap_or("?")
                );
                self.send(self.http.get(self.results_url(cursor)?)).await
            }
        }
    }
}

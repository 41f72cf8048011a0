//! Warehouse access: query construction and paginated row sources.

pub mod bigquery;
pub mod query;
pub mod source;

pub use bigquery::BigQueryClient;
pub use query::{Predicate, SelectQuery, SelectQueryBuilder, TableRef};
pub use source::{fetch_all, InMemorySource, PageCursor, RawTable, Row, RowPage, TableSource};

//! Declarative select queries compiled to BigQuery Standard SQL.
//!
//! A [`SelectQuery`] is a projection, an optional row filter and an optional
//! limit against one table. The same [`Predicate`] compiles to SQL for the
//! warehouse and evaluates locally for in-memory sources, with SQL NULL
//! semantics in both places.

use crate::error::{Error, Result};
use std::fmt;

/// Fully-qualified `project.dataset.table` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self {
            project: project.to_string(),
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// Row filter over string columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Column value contains `needle` as a substring
    Contains { column: String, needle: String },
    Equals { column: String, value: String },
    NotEquals { column: String, value: String },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn contains(column: &str, needle: &str) -> Self {
        Predicate::Contains {
            column: column.to_string(),
            needle: needle.to_string(),
        }
    }

    pub fn equals(column: &str, value: &str) -> Self {
        Predicate::Equals {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn not_equals(column: &str, value: &str) -> Self {
        Predicate::NotEquals {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn and(self, other: Predicate) -> Self {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match self {
            Predicate::Or(mut parts) => {
                parts.push(other);
                Predicate::Or(parts)
            }
            first => Predicate::Or(vec![first, other]),
        }
    }

    /// Every column the predicate reads, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Contains { column, .. }
            | Predicate::Equals { column, .. }
            | Predicate::NotEquals { column, .. } => {
                if !out.contains(&column.as_str()) {
                    out.push(column);
                }
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_columns(out);
                }
            }
        }
    }

    /// Evaluate against one row. `None` is SQL UNKNOWN (a NULL was involved);
    /// a `WHERE` clause keeps the row only on `Some(true)`.
    pub fn evaluate<'r, F>(&self, value_of: &F) -> Option<bool>
    where
        F: Fn(&str) -> Option<&'r str>,
    {
        match self {
            Predicate::Contains { column, needle } => {
                value_of(column).map(|v| v.contains(needle.as_str()))
            }
            Predicate::Equals { column, value } => value_of(column).map(|v| v == value),
            Predicate::NotEquals { column, value } => value_of(column).map(|v| v != value),
            Predicate::And(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(value_of) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown {
                    None
                } else {
                    Some(true)
                }
            }
            Predicate::Or(parts) => {
                let mut unknown = false;
                for part in parts {
                    match part.evaluate(value_of) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown {
                    None
                } else {
                    Some(false)
                }
            }
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            Predicate::Contains { column, needle } => format!(
                "STRPOS({}, {}) > 0",
                quote_identifier(column),
                quote_literal(needle)
            ),
            Predicate::Equals { column, value } => {
                format!("{} = {}", quote_identifier(column), quote_literal(value))
            }
            Predicate::NotEquals { column, value } => {
                format!("{} != {}", quote_identifier(column), quote_literal(value))
            }
            Predicate::And(parts) => join_parts(parts, " AND ", "TRUE"),
            Predicate::Or(parts) => join_parts(parts, " OR ", "FALSE"),
        }
    }

    fn is_compound(&self) -> bool {
        matches!(self, Predicate::And(p) | Predicate::Or(p) if p.len() > 1)
    }
}

fn join_parts(parts: &[Predicate], separator: &str, empty: &str) -> String {
    match parts {
        [] => empty.to_string(),
        [only] => only.to_sql(),
        _ => parts
            .iter()
            .map(|p| {
                if p.is_compound() {
                    format!("({})", p.to_sql())
                } else {
                    p.to_sql()
                }
            })
            .collect::<Vec<_>>()
            .join(separator),
    }
}

/// Backtick-quote an identifier or dotted table path.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: TableRef,
    /// Projected columns; empty selects every column
    pub columns: Vec<String>,
    pub filter: Option<Predicate>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    pub fn builder(table: TableRef) -> SelectQueryBuilder {
        SelectQueryBuilder::new(table)
    }

    /// Copy of this query capped at `limit` rows.
    pub fn with_limit(&self, limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..self.clone()
        }
    }

    pub fn to_sql(&self) -> String {
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!(
            "SELECT {projection}\nFROM {}",
            quote_identifier(&self.table.to_string())
        );
        if let Some(filter) = &self.filter {
            sql.push_str("\nWHERE ");
            sql.push_str(&filter.to_sql());
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!("\nLIMIT {limit}"));
        }
        sql
    }

    /// Projected and filtered columns, deduplicated.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for column in &self.columns {
            if !out.contains(&column.as_str()) {
                out.push(column);
            }
        }
        if let Some(filter) = &self.filter {
            for column in filter.columns() {
                if !out.contains(&column) {
                    out.push(column);
                }
            }
        }
        out
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

pub struct SelectQueryBuilder {
    query: SelectQuery,
}

impl SelectQueryBuilder {
    pub fn new(table: TableRef) -> Self {
        Self {
            query: SelectQuery {
                table,
                columns: Vec::new(),
                filter: None,
                limit: None,
            },
        }
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.query
            .columns
            .extend(columns.into_iter().map(|c| c.as_ref().to_string()));
        self
    }

    /// Add a filter; repeated calls are combined with AND.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.query.filter = Some(match self.query.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn build(self) -> Result<SelectQuery> {
        for (i, column) in self.query.columns.iter().enumerate() {
            if column.is_empty() {
                return Err(Error::Query("empty column name in projection".to_string()));
            }
            if self.query.columns[..i].contains(column) {
                return Err(Error::Query(format!(
                    "column {column} is projected more than once"
                )));
            }
        }
        Ok(self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn table() -> TableRef {
        TableRef::new("proj", "ds", "requests")
    }

    fn lookup<'a>(
        row: &'a HashMap<&'a str, Option<&'a str>>,
    ) -> impl Fn(&str) -> Option<&'a str> + 'a {
        move |column| row.get(column).copied().flatten()
    }

    #[test]
    fn test_compiles_projection_filter_and_limit() {
        let query = SelectQuery::builder(table())
            .select(["SRNumber", "SRType"])
            .filter(
                Predicate::contains("CreatedDate", "2026")
                    .or(Predicate::contains("CreatedDate", "2025")),
            )
            .filter(Predicate::not_equals("SRType", "Homeless Encampment"))
            .limit(10)
            .build()
            .unwrap();

        assert_eq!(
            query.to_sql(),
            "SELECT `SRNumber`, `SRType`\n\
             FROM `proj.ds.requests`\n\
             WHERE (STRPOS(`CreatedDate`, '2026') > 0 OR STRPOS(`CreatedDate`, '2025') > 0) \
             AND `SRType` != 'Homeless Encampment'\n\
             LIMIT 10"
        );
    }

    #[test]
    fn test_no_limit_and_select_star() {
        let query = SelectQuery::builder(table()).build().unwrap();
        assert_eq!(query.to_sql(), "SELECT *\nFROM `proj.ds.requests`");
    }

    #[test]
    fn test_literals_are_escaped() {
        let predicate = Predicate::equals("SRType", "Owner's \\ Report");
        assert_eq!(predicate.to_sql(), r"`SRType` = 'Owner\'s \\ Report'");
    }

    #[test]
    fn test_duplicate_projection_rejected() {
        let result = SelectQuery::builder(table()).select(["a", "a"]).build();
        assert!(matches!(result, Err(Error::Query(_))));
    }

    #[test]
    fn test_with_limit_leaves_original_unlimited() {
        let query = SelectQuery::builder(table()).select(["a"]).build().unwrap();
        let preview = query.with_limit(10);
        assert_eq!(query.limit, None);
        assert_eq!(preview.limit, Some(10));
    }

    #[test]
    fn test_evaluate_uses_null_semantics() {
        let predicate = Predicate::contains("date", "2026")
            .or(Predicate::contains("date", "2025"))
            .and(Predicate::not_equals("kind", "Excluded"));

        let row: HashMap<&str, Option<&str>> =
            [("date", Some("2025-02-01")), ("kind", Some("Pothole"))].into();
        assert_eq!(predicate.evaluate(&lookup(&row)), Some(true));

        let row: HashMap<&str, Option<&str>> =
            [("date", Some("2025-02-01")), ("kind", Some("Excluded"))].into();
        assert_eq!(predicate.evaluate(&lookup(&row)), Some(false));

        // NULL category: `!=` is unknown, so the row is not kept
        let row: HashMap<&str, Option<&str>> =
            [("date", Some("2025-02-01")), ("kind", None)].into();
        assert_eq!(predicate.evaluate(&lookup(&row)), None);

        let row: HashMap<&str, Option<&str>> =
            [("date", Some("2019-02-01")), ("kind", None)].into();
        assert_eq!(predicate.evaluate(&lookup(&row)), Some(false));
    }

    #[test]
    fn test_referenced_columns_include_filter_only_columns() {
        let query = SelectQuery::builder(table())
            .select(["a", "b"])
            .filter(Predicate::equals("c", "x").and(Predicate::equals("a", "y")))
            .build()
            .unwrap();
        assert_eq!(query.referenced_columns(), vec!["a", "b", "c"]);
    }
}

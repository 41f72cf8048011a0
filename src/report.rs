//! Rendering of the aggregate table for standard output.

use crate::aggregate::AggregateRow;
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

const HEADERS: [&str; 4] = ["district", "name", "category", "count"];

pub fn render(rows: &[AggregateRow], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(render_table(rows)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(rows)? + "\n"),
        OutputFormat::Csv => render_csv(rows),
    }
}

fn cells(row: &AggregateRow) -> [String; 4] {
    [
        row.district_id.to_string(),
        row.district_name.clone(),
        row.category.clone(),
        row.count.to_string(),
    ]
}

fn render_table(rows: &[AggregateRow]) -> String {
    let body: Vec<[String; 4]> = rows.iter().map(cells).collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| {
        // Count is right-aligned, text columns left-aligned
        format!(
            "{:<w0$}  {:<w1$}  {:<w2$}  {:>w3$}",
            cells[0],
            cells[1],
            cells[2],
            cells[3],
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        )
        .trim_end()
        .to_string()
    };

    let mut out = String::new();
    out.push_str(&line(HEADERS));
    out.push('\n');
    for cells in &body {
        out.push_str(&line([&cells[0], &cells[1], &cells[2], &cells[3]]));
        out.push('\n');
    }
    out.push_str(&format!("[{} rows]\n", rows.len()));
    out
}

fn render_csv(rows: &[AggregateRow]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS)?;
    for row in rows {
        writer.write_record(cells(row))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| crate::error::Error::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::DistrictId;

    fn rows() -> Vec<AggregateRow> {
        vec![
            AggregateRow {
                district_id: DistrictId::Number(1),
                district_name: "Eunisses Hernandez".to_string(),
                category: "Bulky Items".to_string(),
                count: 1204,
            },
            AggregateRow {
                district_id: DistrictId::Number(13),
                district_name: "Hugo Soto-Martinez".to_string(),
                category: "Graffiti Removal".to_string(),
                count: 87,
            },
        ]
    }

    #[test]
    fn test_table_is_aligned() {
        let out = render(&rows(), OutputFormat::Table).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "district  name                category          count",
                "1         Eunisses Hernandez  Bulky Items        1204",
                "13        Hugo Soto-Martinez  Graffiti Removal     87",
                "[2 rows]",
            ]
        );
    }

    #[test]
    fn test_empty_table_has_header() {
        let out = render(&[], OutputFormat::Table).unwrap();
        assert_eq!(out, "district  name  category  count\n[0 rows]\n");
    }

    #[test]
    fn test_json_output() {
        let out = render(&rows(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value[0]["district_id"], 1);
        assert_eq!(value[1]["count"], 87);
    }

    #[test]
    fn test_csv_output() {
        let out = render(&rows(), OutputFormat::Csv).unwrap();
        assert_eq!(
            out,
            "district,name,category,count\n\
             1,Eunisses Hernandez,Bulky Items,1204\n\
             13,Hugo Soto-Martinez,Graffiti Removal,87\n"
        );
    }
}

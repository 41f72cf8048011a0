//! Stage 3: request counts per district and category.

use crate::boundary::DistrictId;
use crate::geojoin::JoinedRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateRow {
    pub district_id: DistrictId,
    pub district_name: String,
    pub category: String,
    pub count: u64,
}

/// Group joined rows by (district id, district name, category) and count.
///
/// The count is of joined rows, including rows whose request id is NULL.
/// Rows without a category have no group and are not counted. The result is
/// ordered by key.
pub fn aggregate_by_category(joined: &[JoinedRecord]) -> Vec<AggregateRow> {
    let mut groups: BTreeMap<(&DistrictId, &str, &str), u64> = BTreeMap::new();
    let mut uncategorized = 0usize;

    for record in joined {
        let Some(category) = record.request.category.as_deref() else {
            uncategorized += 1;
            continue;
        };
        *groups
            .entry((&record.district_id, &record.district_name, category))
            .or_insert(0) += 1;
    }

    if uncategorized > 0 {
        debug!("Skipped {uncategorized} joined rows without a category");
    }

    groups
        .into_iter()
        .map(|((id, name, category), count)| AggregateRow {
            district_id: id.clone(),
            district_name: name.to_string(),
            category: category.to_string(),
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geojoin::ServiceRequest;
    use chrono::NaiveDate;

    fn joined(district: i64, name: &str, category: Option<&str>) -> JoinedRecord {
        JoinedRecord {
            request: ServiceRequest {
                sr_number: Some("sr".to_string()),
                category: category.map(str::to_string),
                created: NaiveDate::from_ymd_opt(2026, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                longitude: 0.0,
                latitude: 0.0,
            },
            district_id: DistrictId::Number(district),
            district_name: name.to_string(),
        }
    }

    fn row(district: i64, name: &str, category: &str, count: u64) -> AggregateRow {
        AggregateRow {
            district_id: DistrictId::Number(district),
            district_name: name.to_string(),
            category: category.to_string(),
            count,
        }
    }

    #[test]
    fn test_counts_per_district_and_category() {
        let rows = vec![
            joined(1, "One", Some("Pothole")),
            joined(2, "Two", Some("Pothole")),
            joined(1, "One", Some("Pothole")),
        ];

        assert_eq!(
            aggregate_by_category(&rows),
            vec![row(1, "One", "Pothole", 2), row(2, "Two", "Pothole", 1)]
        );
    }

    #[test]
    fn test_categories_are_separate_groups() {
        let rows = vec![
            joined(3, "Three", Some("Graffiti")),
            joined(3, "Three", Some("Bulky Items")),
            joined(3, "Three", Some("Graffiti")),
            joined(3, "Three", None),
        ];

        assert_eq!(
            aggregate_by_category(&rows),
            vec![
                row(3, "Three", "Bulky Items", 1),
                row(3, "Three", "Graffiti", 2)
            ]
        );
    }

    #[test]
    fn test_rows_without_request_id_are_counted() {
        let mut anonymous = joined(1, "One", Some("Pothole"));
        anonymous.request.sr_number = None;
        let rows = vec![joined(1, "One", Some("Pothole")), anonymous];

        assert_eq!(
            aggregate_by_category(&rows),
            vec![row(1, "One", "Pothole", 2)]
        );
    }

    #[test]
    fn test_empty_input_yields_no_rows() {
        assert!(aggregate_by_category(&[]).is_empty());
    }

    #[test]
    fn test_counts_sum_to_categorized_rows() {
        let rows: Vec<_> = (0..50)
            .map(|i| joined(i % 4, "d", Some(if i % 3 == 0 { "a" } else { "b" })))
            .collect();
        let aggregate = aggregate_by_category(&rows);
        assert_eq!(aggregate.iter().map(|r| r.count).sum::<u64>(), 50);
        assert!(aggregate.iter().all(|r| r.count > 0));
    }
}

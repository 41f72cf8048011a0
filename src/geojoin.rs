//! Stage 2: type the extracted rows and join them to districts.
//!
//! Rows outside the trailing window or without coordinates are dropped
//! quietly; a value that is present but unparseable aborts the run.

use crate::boundary::{District, DistrictId};
use crate::error::{Error, Result};
use crate::extract::RawServiceRequest;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use geo::{BoundingRect, Intersects, Point, Rect};
use tracing::{debug, info};

/// A service request with typed date and WGS84 location.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub sr_number: Option<String>,
    pub category: Option<String>,
    pub created: NaiveDateTime,
    pub longitude: f64,
    pub latitude: f64,
}

impl ServiceRequest {
    pub fn point(&self) -> Point<f64> {
        Point::new(self.longitude, self.latitude)
    }
}

/// A request paired with one district its point intersects.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub request: ServiceRequest,
    pub district_id: DistrictId,
    pub district_name: String,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse a creation timestamp. Blank input is `Ok(None)`.
pub fn parse_created(value: &str) -> Result<Option<NaiveDateTime>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(dt.naive_local()));
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Some(dt));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Ok(date.and_hms_opt(0, 0, 0));
        }
    }

    Err(Error::Parse(format!("unrecognized date: {value:?}")))
}

/// Parse a coordinate. Blank input and `NaN` are `Ok(None)`.
pub fn parse_coordinate(value: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let parsed: f64 = value
        .parse()
        .map_err(|_| Error::Parse(format!("unrecognized coordinate: {value:?}")))?;
    Ok((!parsed.is_nan()).then_some(parsed))
}

fn field<T>(
    raw: &RawServiceRequest,
    name: &str,
    value: Option<&str>,
    parse: impl Fn(&str) -> Result<Option<T>>,
) -> Result<Option<T>> {
    match value {
        Some(v) => parse(v).map_err(|e| {
            Error::Parse(format!(
                "request {}: {name}: {e}",
                raw.sr_number.as_deref().unwrap_or("<no id>")
            ))
        }),
        None => Ok(None),
    }
}

/// Type the raw rows, keep those created within `window_days` of `today`
/// (both ends inclusive) that have both coordinates.
pub fn prepare(
    raw: Vec<RawServiceRequest>,
    today: NaiveDate,
    window_days: u32,
) -> Result<Vec<ServiceRequest>> {
    let window_start = today
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .ok_or_else(|| {
            Error::Config(format!(
                "window of {window_days} days before {today} is outside the supported date range"
            ))
        })?;
    let total = raw.len();
    let mut outside_window = 0usize;
    let mut missing_location = 0usize;
    let mut prepared = Vec::with_capacity(total);

    for row in raw {
        let created = field(&row, "created date", row.created_date.as_deref(), parse_created)?;
        let longitude = field(&row, "longitude", row.longitude.as_deref(), parse_coordinate)?;
        let latitude = field(&row, "latitude", row.latitude.as_deref(), parse_coordinate)?;

        let Some(created) = created.filter(|c| (window_start..=today).contains(&c.date())) else {
            outside_window += 1;
            continue;
        };

        let (Some(longitude), Some(latitude)) = (longitude, latitude) else {
            missing_location += 1;
            continue;
        };

        prepared.push(ServiceRequest {
            sr_number: row.sr_number,
            category: row.sr_type,
            created,
            longitude,
            latitude,
        });
    }

    debug!(
        "Prepared {} of {} requests ({} outside {} to {}, {} without location)",
        prepared.len(),
        total,
        outside_window,
        window_start,
        today,
        missing_location
    );
    Ok(prepared)
}

/// Inner spatial join on intersection. A request matching several districts
/// appears once per match; one matching none is dropped.
pub fn spatial_join(requests: &[ServiceRequest], districts: &[District]) -> Vec<JoinedRecord> {
    let bounds: Vec<Option<Rect<f64>>> = districts
        .iter()
        .map(|d| d.geometry.bounding_rect())
        .collect();

    let mut joined = Vec::new();
    for request in requests {
        let point = request.point();
        for (district, rect) in districts.iter().zip(&bounds) {
            let Some(rect) = rect else { continue };
            if rect.intersects(&point) && district.geometry.intersects(&point) {
                joined.push(JoinedRecord {
                    request: request.clone(),
                    district_id: district.id.clone(),
                    district_name: district.name.clone(),
                });
            }
        }
    }
    joined
}

/// Prepare the extracted rows and join them to `districts`.
pub fn geo_join(
    raw: Vec<RawServiceRequest>,
    districts: &[District],
    today: NaiveDate,
    window_days: u32,
) -> Result<Vec<JoinedRecord>> {
    let requests = prepare(raw, today, window_days)?;
    let joined = spatial_join(&requests, districts);
    info!(
        "Joined {} requests to {} districts: {} matches",
        requests.len(),
        districts.len(),
        joined.len()
    );
    Ok(joined)
}

//! Typed schemas for the nine GTFS schedule tables and the concurrent
//! snapshot loader.
//!
//! Each table gets an explicit record type deserialized by header name, so a
//! column landing in the wrong position or carrying a non-numeric value is a
//! parse error rather than silently wrong data. Columns the model never reads
//! are not declared; the csv reader ignores them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// One row of `agency.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgencyRow {
    #[serde(default)]
    pub agency_id: Option<String>,
    pub agency_name: String,
    pub agency_timezone: String,
}

/// One row of `calendar.txt`. Day flags are `0`/`1`.
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarRow {
    pub service_id: String,
    pub monday: u8,
    pub tuesday: u8,
    pub wednesday: u8,
    pub thursday: u8,
    pub friday: u8,
    pub saturday: u8,
    pub sunday: u8,
    pub start_date: String,
    pub end_date: String,
}

/// One row of `calendar_dates.txt`. `exception_type` is `1` (added) or
/// `2` (removed).
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarDateRow {
    pub service_id: String,
    pub date: String,
    pub exception_type: u8,
}

/// One row of `feed_info.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedInfoRow {
    #[serde(default)]
    pub feed_publisher_name: Option<String>,
    pub feed_start_date: String,
    pub feed_end_date: String,
    #[serde(default)]
    pub feed_version: Option<String>,
}

/// One row of `routes.txt`. Only identity is carried into the model.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRow {
    pub route_id: String,
    #[serde(default)]
    pub route_short_name: Option<String>,
}

/// One row of `shapes.txt`. Loaded for snapshot completeness; geometry is
/// not consumed by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct ShapeRow {
    pub shape_id: String,
    pub shape_pt_lat: f64,
    pub shape_pt_lon: f64,
    pub shape_pt_sequence: u32,
}

/// One row of `stop_times.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct StopTimeRow {
    pub trip_id: String,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub stop_id: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<u32>,
}

/// One row of `stops.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct StopRow {
    pub stop_id: String,
    #[serde(default)]
    pub stop_code: Option<String>,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

/// One row of `trips.txt`.
#[derive(Debug, Clone, Deserialize)]
pub struct TripRow {
    pub route_id: String,
    pub service_id: String,
    pub trip_id: String,
    #[serde(default)]
    pub trip_headsign: Option<String>,
}

/// The fully parsed contents of one schedule snapshot.
#[derive(Debug, Default)]
pub struct ScheduleTables {
    pub agency: Vec<AgencyRow>,
    pub calendar: Vec<CalendarRow>,
    pub calendar_dates: Vec<CalendarDateRow>,
    pub feed_info: Vec<FeedInfoRow>,
    pub routes: Vec<RouteRow>,
    pub shapes: Vec<ShapeRow>,
    pub stop_times: Vec<StopTimeRow>,
    pub stops: Vec<StopRow>,
    pub trips: Vec<TripRow>,
}

impl ScheduleTables {
    /// Loads every table of the snapshot at `dir`, reading the nine files
    /// concurrently. Any single file failing to read or parse fails the load.
    pub async fn load(dir: &Path) -> Result<Self> {
        let (agency, calendar, calendar_dates, feed_info, routes, shapes, stop_times, stops, trips) =
            tokio::try_join!(
                read_table(dir, "agency"),
                read_table(dir, "calendar"),
                read_table(dir, "calendar_dates"),
                read_table(dir, "feed_info"),
                read_table(dir, "routes"),
                read_table(dir, "shapes"),
                read_table(dir, "stop_times"),
                read_table(dir, "stops"),
                read_table(dir, "trips"),
            )?;

        Ok(Self {
            agency,
            calendar,
            calendar_dates,
            feed_info,
            routes,
            shapes,
            stop_times,
            stops,
            trips,
        })
    }
}

/// Parses one comma-separated table: header line naming columns, `\r`
/// tolerated, empty optional fields deserialized as `None`.
pub fn parse_table<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

async fn read_table<T: DeserializeOwned>(dir: &Path, table: &str) -> Result<Vec<T>> {
    let path = dir.join(format!("{table}.txt"));
    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("failed to read schedule table {}", path.display()))?;

    let rows = parse_table(&bytes)
        .with_context(|| format!("failed to parse schedule table {}", path.display()))?;

    debug!(table, rows = rows.len(), "Schedule table loaded");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_with_crlf_line_endings() {
        let data = b"stop_id,stop_code,stop_name,stop_lat,stop_lon\r\n3836,3014,Bank / Somerset,45.41,-75.69\r\n";
        let rows: Vec<StopRow> = parse_table(data).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].stop_id, "3836");
        assert_eq!(rows[0].stop_code.as_deref(), Some("3014"));
        assert_eq!(rows[0].stop_name, "Bank / Somerset");
    }

    #[test]
    fn empty_optional_fields_become_none() {
        let data = b"trip_id,arrival_time,departure_time,stop_id,stop_sequence\nT1,,08:00:00,100,1\n";
        let rows: Vec<StopTimeRow> = parse_table(data).unwrap();

        assert_eq!(rows[0].arrival_time, None);
        assert_eq!(rows[0].departure_time.as_deref(), Some("08:00:00"));
    }

    #[test]
    fn missing_optional_columns_are_tolerated() {
        let data = b"route_id,service_id,trip_id\nR1,S1,T1\n";
        let rows: Vec<TripRow> = parse_table(data).unwrap();

        assert_eq!(rows[0].trip_id, "T1");
        assert_eq!(rows[0].trip_headsign, None);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let data = b"agency_id,agency_name,agency_url,agency_timezone,agency_lang\nOC,OC Transpo,https://example.org,America/Toronto,en\n";
        let rows: Vec<AgencyRow> = parse_table(data).unwrap();

        assert_eq!(rows[0].agency_name, "OC Transpo");
        assert_eq!(rows[0].agency_timezone, "America/Toronto");
    }

    #[test]
    fn non_numeric_required_fields_are_a_parse_error() {
        let data = b"stop_id,stop_name,stop_lat,stop_lon\n1,Main,not-a-number,-75.0\n";
        let rows: Result<Vec<StopRow>> = parse_table(data);
        assert!(rows.is_err());
    }
}

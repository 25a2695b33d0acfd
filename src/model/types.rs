//! Data model entities parsed out of one schedule snapshot.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use serde::Serialize;

/// The feed's operating agency. Exactly one per feed; its timezone governs
/// every calendar decision the builder makes.
#[derive(Debug, Clone)]
pub struct Agency {
    pub name: String,
    pub timezone: Tz,
}

/// The feed's declared validity window, in agency-local calendar dates.
#[derive(Debug, Clone, Copy)]
pub struct FeedWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub id: String,
    pub code: Option<String>,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Identity only; richer route attributes are out of scope for the lookup
/// index.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
}

/// A service calendar entry: validity window plus a weekday-activity vector
/// ordered Sunday..Saturday.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekdays: [bool; 7],
}

impl Service {
    /// `weekday` is days-from-Sunday, 0..=6.
    pub fn runs_on_weekday(&self, weekday: usize) -> bool {
        self.weekdays.get(weekday).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Added,
    Removed,
}

/// A single-date override of a service's weekday vector.
#[derive(Debug, Clone)]
pub struct ServiceException {
    pub service_id: String,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
}

#[derive(Debug, Clone)]
pub struct Trip {
    pub id: String,
    pub service_id: String,
    pub route_id: String,
    pub headsign: Option<String>,
}

/// One scheduled call at a stop, with absolute agency-local instants.
#[derive(Debug, Clone, Serialize)]
pub struct StopTime {
    pub stop_id: String,
    pub route_id: String,
    pub trip_id: String,
    pub arrival: Option<DateTime<Tz>>,
    pub departure: Option<DateTime<Tz>>,
    /// Whether the instants came from the realtime feed. Always `false`
    /// until the realtime merge extension point is implemented.
    pub realtime: bool,
}

/// Per-stop index: route id → stop times in file order.
#[derive(Debug, Default, Serialize)]
pub struct StopSchedule {
    pub routes: HashMap<String, Vec<StopTime>>,
}

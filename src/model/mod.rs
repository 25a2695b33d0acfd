//! The calendar-resolved, indexed in-memory representation of one schedule
//! snapshot.
//!
//! A [`TransitModel`] is built exactly once from a fully loaded snapshot and
//! a load instant, and is immutable afterwards; the cache manager replaces it
//! wholesale when a newer snapshot lands.

mod build;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::gtfs_rt::FeedMessage;
pub use types::{
    Agency, ExceptionKind, FeedWindow, Route, Service, ServiceException, Stop, StopSchedule,
    StopTime, Trip,
};

pub struct TransitModel {
    pub agency: Agency,
    pub feed_window: FeedWindow,
    /// The load instant, agency-local. All calendar decisions in this model
    /// were made relative to this instant.
    pub loaded_at: DateTime<Tz>,

    stops: HashMap<String, Stop>,
    code_index: HashMap<String, String>,
    routes: HashMap<String, Route>,
    trips: HashMap<String, Trip>,
    services: HashMap<String, Service>,
    schedules: HashMap<String, StopSchedule>,
}

impl TransitModel {
    /// Returns the schedule for `stop_id`, or `None` if the stop has no
    /// active stop times in this snapshot.
    pub fn lookup_by_id(&self, stop_id: &str) -> Option<&StopSchedule> {
        self.schedules.get(stop_id)
    }

    /// Resolves a rider-facing stop code to its stop id, then delegates to
    /// [`lookup_by_id`](Self::lookup_by_id). An unmapped code is the same
    /// not-found signal.
    pub fn lookup_by_code(&self, stop_code: &str) -> Option<&StopSchedule> {
        let stop_id = self.code_index.get(stop_code)?;
        self.lookup_by_id(stop_id)
    }

    /// The current instant reinterpreted in the agency's timezone.
    pub fn agency_local_now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.agency.timezone)
    }

    /// Reserved extension point: folding a realtime feed into the static
    /// model. Currently the identity function; the published model is
    /// returned unchanged.
    pub fn merge_realtime_update(self: &Arc<Self>, _feed: &FeedMessage) -> Arc<Self> {
        Arc::clone(self)
    }

    pub fn stop(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.get(stop_id)
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.get(route_id)
    }

    pub fn trip(&self, trip_id: &str) -> Option<&Trip> {
        self.trips.get(trip_id)
    }

    pub fn service(&self, service_id: &str) -> Option<&Service> {
        self.services.get(service_id)
    }

    /// Number of stops with at least one active stop time.
    pub fn indexed_stop_count(&self) -> usize {
        self.schedules.len()
    }
}

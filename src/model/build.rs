//! Model construction: turns one fully loaded snapshot plus a load instant
//! into a [`TransitModel`].

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use super::TransitModel;
use super::types::{
    Agency, ExceptionKind, FeedWindow, Route, Service, ServiceException, Stop, StopSchedule,
    StopTime, Trip,
};
use crate::tables::ScheduleTables;
use crate::time;

impl TransitModel {
    /// Builds a complete model or fails fast.
    ///
    /// A missing agency or feed_info row aborts construction; unresolved
    /// trip/service/route references and rows without a stop id are dropped
    /// with a warning. Stop times only materialize for services active at
    /// `loaded_at` in the agency's local calendar.
    pub fn from_tables(tables: &ScheduleTables, loaded_at: DateTime<Utc>) -> Result<Self> {
        let agency_row = tables
            .agency
            .first()
            .context("schedule snapshot has no agency row")?;
        let timezone = time::parse_timezone(&agency_row.agency_timezone)?;
        let agency = Agency {
            name: agency_row.agency_name.clone(),
            timezone,
        };

        let info_row = tables
            .feed_info
            .first()
            .context("schedule snapshot has no feed_info row")?;
        let feed_window = FeedWindow {
            start: time::parse_service_date(&info_row.feed_start_date)?,
            end: time::parse_service_date(&info_row.feed_end_date)?,
        };

        let mut stops = HashMap::with_capacity(tables.stops.len());
        let mut code_index = HashMap::new();
        for row in &tables.stops {
            if let Some(code) = &row.stop_code {
                // Codes are optional and not guaranteed unique; last write wins.
                code_index.insert(code.clone(), row.stop_id.clone());
            }
            stops.insert(
                row.stop_id.clone(),
                Stop {
                    id: row.stop_id.clone(),
                    code: row.stop_code.clone(),
                    name: row.stop_name.clone(),
                    latitude: row.stop_lat,
                    longitude: row.stop_lon,
                },
            );
        }

        let routes: HashMap<String, Route> = tables
            .routes
            .iter()
            .map(|row| (row.route_id.clone(), Route { id: row.route_id.clone() }))
            .collect();

        let trips: HashMap<String, Trip> = tables
            .trips
            .iter()
            .map(|row| {
                (
                    row.trip_id.clone(),
                    Trip {
                        id: row.trip_id.clone(),
                        service_id: row.service_id.clone(),
                        route_id: row.route_id.clone(),
                        headsign: row.trip_headsign.clone(),
                    },
                )
            })
            .collect();

        let local_now = loaded_at.with_timezone(&timezone);
        let weekday = local_now.weekday().num_days_from_sunday() as usize;
        let today = local_now.date_naive();

        let mut services = HashMap::with_capacity(tables.calendar.len());
        for row in &tables.calendar {
            let (start_date, end_date) = match (
                time::parse_service_date(&row.start_date),
                time::parse_service_date(&row.end_date),
            ) {
                (Ok(start), Ok(end)) => (start, end),
                _ => {
                    warn!(service_id = %row.service_id, "Unparsable service dates, service dropped");
                    continue;
                }
            };
            services.insert(
                row.service_id.clone(),
                Service {
                    id: row.service_id.clone(),
                    start_date,
                    end_date,
                    weekdays: [
                        row.sunday == 1,
                        row.monday == 1,
                        row.tuesday == 1,
                        row.wednesday == 1,
                        row.thursday == 1,
                        row.friday == 1,
                        row.saturday == 1,
                    ],
                },
            );
        }

        let active = active_service_set(&services, &tables.calendar_dates, weekday, today);

        let mut schedules: HashMap<String, StopSchedule> = HashMap::new();
        let mut dropped = 0usize;
        for row in &tables.stop_times {
            let Some(trip) = trips.get(&row.trip_id) else {
                warn!(trip_id = %row.trip_id, "stop_times row references unknown trip, dropped");
                dropped += 1;
                continue;
            };
            let Some(service) = services.get(&trip.service_id) else {
                warn!(trip_id = %trip.id, service_id = %trip.service_id,
                      "stop_times row references unknown service, dropped");
                dropped += 1;
                continue;
            };
            if !active.contains(&service.id) {
                continue;
            }
            let Some(route) = routes.get(&trip.route_id) else {
                warn!(trip_id = %trip.id, route_id = %trip.route_id,
                      "stop_times row references unknown route, dropped");
                dropped += 1;
                continue;
            };
            let Some(stop_id) = row.stop_id.as_deref().filter(|id| !id.is_empty()) else {
                warn!(trip_id = %trip.id, "stop_times row has no stop id, dropped");
                dropped += 1;
                continue;
            };

            // The owning service's local start date anchors the raw
            // wall-clock offsets.
            let arrival = materialize(row.arrival_time.as_deref(), service, timezone);
            let departure = materialize(row.departure_time.as_deref(), service, timezone);

            schedules
                .entry(stop_id.to_string())
                .or_default()
                .routes
                .entry(route.id.clone())
                .or_default()
                .push(StopTime {
                    stop_id: stop_id.to_string(),
                    route_id: route.id.clone(),
                    trip_id: trip.id.clone(),
                    arrival,
                    departure,
                    realtime: false,
                });
        }

        info!(
            stops = stops.len(),
            trips = trips.len(),
            active_services = active.len(),
            indexed_stops = schedules.len(),
            dropped,
            "Transit feed model built"
        );

        Ok(TransitModel {
            agency,
            feed_window,
            loaded_at: local_now,
            stops,
            code_index,
            routes,
            trips,
            services,
            schedules,
        })
    }
}

/// Computes the set of services active on `today`.
///
/// The base set is every service whose weekday flag for `weekday` is true.
/// Same-date exceptions then override it: ADDED inserts are applied first,
/// REMOVED deletions second, and both are evaluated against the full
/// declared-service universe, so an exception can introduce a normally
/// inactive service or suppress a normally active one.
fn active_service_set(
    services: &HashMap<String, Service>,
    calendar_dates: &[crate::tables::CalendarDateRow],
    weekday: usize,
    today: chrono::NaiveDate,
) -> HashSet<String> {
    let mut active: HashSet<String> = services
        .values()
        .filter(|service| service.runs_on_weekday(weekday))
        .map(|service| service.id.clone())
        .collect();

    let mut exceptions = Vec::new();
    for row in calendar_dates {
        let date = match time::parse_service_date(&row.date) {
            Ok(date) => date,
            Err(_) => {
                warn!(service_id = %row.service_id, date = %row.date,
                      "Unparsable exception date, skipped");
                continue;
            }
        };
        if date != today {
            continue;
        }
        let kind = match row.exception_type {
            1 => ExceptionKind::Added,
            2 => ExceptionKind::Removed,
            other => {
                warn!(service_id = %row.service_id, exception_type = other,
                      "Unknown exception type, skipped");
                continue;
            }
        };
        exceptions.push(ServiceException {
            service_id: row.service_id.clone(),
            date,
            kind,
        });
    }

    for exception in exceptions.iter().filter(|e| e.kind == ExceptionKind::Added) {
        if services.contains_key(&exception.service_id) {
            active.insert(exception.service_id.clone());
        } else {
            warn!(service_id = %exception.service_id,
                  "ADDED exception references unknown service");
        }
    }
    for exception in exceptions.iter().filter(|e| e.kind == ExceptionKind::Removed) {
        if services.contains_key(&exception.service_id) {
            active.remove(&exception.service_id);
        } else {
            warn!(service_id = %exception.service_id,
                  "REMOVED exception references unknown service");
        }
    }

    active
}

fn materialize(raw: Option<&str>, service: &Service, timezone: Tz) -> Option<DateTime<Tz>> {
    let raw = raw?;
    match time::overlay_wall_clock(service.start_date, raw, timezone) {
        Ok(instant) => Some(instant),
        Err(err) => {
            warn!(service_id = %service.id, raw, error = %err, "Unusable stop time value");
            None
        }
    }
}

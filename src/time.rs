//! Agency-local time arithmetic.
//!
//! All calendar-day decisions in the model (weekday activation, exception
//! matching, stop time anchoring) are made in the agency's declared IANA
//! timezone, never in the host zone.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

/// Resolves an `agency_timezone` value (e.g. `"America/Toronto"`) to a [`Tz`].
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|err| anyhow!("unknown agency timezone {name:?}: {err}"))
}

/// Parses a GTFS `YYYYMMDD` date field into a calendar date.
pub fn parse_service_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
        .with_context(|| format!("invalid GTFS date {raw:?}"))
}

/// Overlays a raw GTFS `HH:MM:SS` wall-clock value onto `anchor` and
/// reinterprets the result in the agency timezone.
///
/// Hours may legally exceed 23 to express post-midnight continuations of a
/// service day, so the overlay is a plain additive offset from the anchor's
/// midnight rather than a modulo-24 clock time.
pub fn overlay_wall_clock(anchor: NaiveDate, raw: &str, timezone: Tz) -> Result<DateTime<Tz>> {
    let mut parts = raw.trim().splitn(3, ':');
    let mut next = |unit: &str| -> Result<i64> {
        parts
            .next()
            .with_context(|| format!("wall clock value {raw:?} is missing its {unit} field"))?
            .parse::<i64>()
            .with_context(|| format!("wall clock value {raw:?} has a non-numeric {unit} field"))
    };
    let hours = next("hours")?;
    let minutes = next("minutes")?;
    let seconds = next("seconds")?;

    // Corrupt rows can carry values far outside any calendar; checked
    // arithmetic keeps them on the error path instead of aborting a build.
    let offset = Duration::try_hours(hours)
        .zip(Duration::try_minutes(minutes))
        .zip(Duration::try_seconds(seconds))
        .and_then(|((h, m), s)| h.checked_add(&m)?.checked_add(&s))
        .with_context(|| format!("wall clock value {raw:?} is out of range"))?;
    let naive = anchor
        .and_time(NaiveTime::MIN)
        .checked_add_signed(offset)
        .with_context(|| format!("wall clock value {raw:?} overflows the calendar"))?;

    resolve_local(naive, timezone)
        .ok_or_else(|| anyhow!("local time {naive} does not exist in {timezone}"))
}

/// Interprets a naive local datetime in `timezone`.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times
/// inside a DST gap are pushed forward past the transition.
pub fn resolve_local(naive: NaiveDateTime, timezone: Tz) -> Option<DateTime<Tz>> {
    match timezone.from_local_datetime(&naive) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (naive + Duration::hours(1))
            .and_local_timezone(timezone)
            .earliest(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::Toronto;

    #[test]
    fn parses_gtfs_dates() {
        let date = parse_service_date("20240305").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());

        assert!(parse_service_date("2024-03-05").is_err());
        assert!(parse_service_date("").is_err());
    }

    #[test]
    fn overlays_plain_wall_clock() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let instant = overlay_wall_clock(anchor, "08:30:15", Toronto).unwrap();

        assert_eq!(instant.date_naive(), anchor);
        assert_eq!((instant.hour(), instant.minute(), instant.second()), (8, 30, 15));
    }

    #[test]
    fn hours_past_midnight_roll_into_the_next_day() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let instant = overlay_wall_clock(anchor, "25:10:00", Toronto).unwrap();

        assert_eq!(instant.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!((instant.hour(), instant.minute()), (1, 10));
    }

    #[test]
    fn rejects_malformed_wall_clock_values() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(overlay_wall_clock(anchor, "08:30", Toronto).is_err());
        assert!(overlay_wall_clock(anchor, "ab:cd:ef", Toronto).is_err());
        assert!(overlay_wall_clock(anchor, "", Toronto).is_err());
    }

    #[test]
    fn out_of_range_wall_clock_values_are_errors_not_panics() {
        let anchor = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert!(overlay_wall_clock(anchor, "10000000000:00:00", Toronto).is_err());
        assert!(overlay_wall_clock(anchor, "00:00:9223372036854775807", Toronto).is_err());
    }

    #[test]
    fn dst_gap_times_are_pushed_past_the_transition() {
        // 2:30 never happens in Toronto on 2024-03-10 (spring forward).
        let naive = NaiveDate::from_ymd_opt(2024, 3, 10)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let instant = resolve_local(naive, Toronto).unwrap();
        assert_eq!(instant.hour(), 3);
    }

    #[test]
    fn ambiguous_fall_back_times_take_the_earlier_offset() {
        // 1:30 happens twice in Toronto on 2024-11-03.
        let naive = NaiveDate::from_ymd_opt(2024, 11, 3)
            .unwrap()
            .and_hms_opt(1, 30, 0)
            .unwrap();
        let instant = resolve_local(naive, Toronto).unwrap();
        assert_eq!(instant.offset().to_string(), "EDT");
    }
}

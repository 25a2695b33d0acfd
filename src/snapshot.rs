//! Snapshot directory naming.
//!
//! Each extracted schedule bundle lives in a directory named with the
//! ISO-8601 instant of its download, with `:` swapped for `_` so the name is
//! legal on every filesystem. A name that fails to parse back is treated the
//! same as an expired one.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Formats `instant` as a filesystem-safe ISO-8601 directory name,
/// e.g. `2024-03-05T17_00_00.000Z`.
pub fn file_safe_timestamp(instant: DateTime<Utc>) -> String {
    instant
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "_")
}

/// Parses a directory name produced by [`file_safe_timestamp`] back into an
/// instant. Returns `None` for anything that is not such a name.
pub fn parse_file_safe_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let restored = name.replace('_', ":");
    DateTime::parse_from_rfc3339(&restored)
        .ok()
        .map(|instant| instant.with_timezone(&Utc))
}

/// Whether the snapshot named `name` should be flagged for removal: its
/// recorded download instant is older than `staleness`, or the name does not
/// parse as a timestamp at all.
pub fn is_stale(name: &str, now: DateTime<Utc>, staleness: Duration) -> bool {
    match parse_file_safe_timestamp(name) {
        Some(downloaded) => now - downloaded > staleness,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_naming_round_trips_within_a_second() {
        let now = Utc::now();
        let name = file_safe_timestamp(now);

        assert!(!name.contains(':'));

        let parsed = parse_file_safe_timestamp(&name).unwrap();
        assert!((now - parsed).abs() < Duration::seconds(1));
    }

    #[test]
    fn malformed_names_parse_to_invalid() {
        for name in ["", "latest", "2024-03-05", "2024-03-05T17_00_00", "not a date"] {
            assert!(parse_file_safe_timestamp(name).is_none(), "{name:?}");
        }
    }

    #[test]
    fn staleness_honours_the_threshold() {
        let now = Utc::now();
        let threshold = Duration::hours(24);

        let fresh = file_safe_timestamp(now - Duration::hours(1));
        assert!(!is_stale(&fresh, now, threshold));

        let expired = file_safe_timestamp(now - Duration::hours(25));
        assert!(is_stale(&expired, now, threshold));
    }

    #[test]
    fn unparsable_names_are_always_stale() {
        assert!(is_stale("garbage", Utc::now(), Duration::hours(24)));
    }
}

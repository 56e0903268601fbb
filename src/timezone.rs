use std::fmt::Display;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tracing::warn;

pub const DEFAULT_ZONE: &str = "UTC";

const SHORT_TIME: &str = "%I:%M %p";
const FULL_DATE_TIME: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// A timestamp rendered for display in one zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Projection {
    pub short_time: String,
    pub full_date_time: String,
}

/// Parse an API timestamp.
///
/// Strings with a `Z` or a numeric offset are honoured as such. Strings
/// without a zone designator are UTC: the metrics backend stores naive UTC
/// and serialises it without an offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn is_valid_zone(zone: &str) -> bool {
    zone == DEFAULT_ZONE || zone.parse::<Tz>().is_ok()
}

/// Projects timestamps into one zone, resolved once up front.
///
/// An identifier that does not resolve falls back to UTC; it is logged but
/// never fails the caller.
#[derive(Copy, Clone, Debug)]
pub struct Projector {
    zone: Option<Tz>,
}

impl Projector {
    pub fn new(zone: &str) -> Self {
        if zone == DEFAULT_ZONE {
            return Self { zone: None };
        }
        match zone.parse::<Tz>() {
            Ok(tz) => Self { zone: Some(tz) },
            Err(err) => {
                warn!(zone, %err, "unknown timezone, rendering in UTC");
                Self { zone: None }
            }
        }
    }

    pub fn project(&self, ts: DateTime<Utc>) -> Projection {
        match self.zone {
            Some(tz) => render(&ts.with_timezone(&tz)),
            None => render(&ts),
        }
    }
}

/// Render `ts` in `zone`, falling back to UTC as [`Projector`] does.
pub fn project(ts: DateTime<Utc>, zone: &str) -> Projection {
    Projector::new(zone).project(ts)
}

/// Same as [`project`] for a raw API timestamp. Unparseable input is
/// echoed back verbatim rather than blanked.
pub fn project_str(raw: &str, zone: &str) -> Projection {
    match parse_timestamp(raw) {
        Some(ts) => project(ts, zone),
        None => Projection { short_time: raw.to_string(), full_date_time: raw.to_string() },
    }
}

fn render<Z: TimeZone>(dt: &DateTime<Z>) -> Projection
where
    Z::Offset: Display,
{
    Projection {
        short_time: dt.format(SHORT_TIME).to_string(),
        full_date_time: dt.format(FULL_DATE_TIME).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 5, 9).unwrap()
    }

    #[test]
    fn naive_strings_are_utc() {
        assert_eq!(parse_timestamp("2024-01-15T14:05:09"), Some(noon()));
        assert_eq!(parse_timestamp("2024-01-15 14:05:09"), Some(noon()));
        let micro = parse_timestamp("2024-01-15T14:05:09.123456").unwrap();
        assert_eq!(micro.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn explicit_offsets_are_honoured() {
        assert_eq!(parse_timestamp("2024-01-15T14:05:09Z"), Some(noon()));
        assert_eq!(parse_timestamp("2024-01-15T16:05:09+02:00"), Some(noon()));
        assert_eq!(parse_timestamp("2024-01-15T09:05:09-05:00"), Some(noon()));
        assert_eq!(parse_timestamp("2024-01-15T16:05:09+0200"), Some(noon()));
    }

    #[test]
    fn garbage_does_not_parse() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("15/01/2024"), None);
    }

    #[test]
    fn utc_projection() {
        let p = project(noon(), "UTC");
        assert_eq!(p.short_time, "02:05 PM");
        assert_eq!(p.full_date_time, "1/15/2024, 2:05:09 PM");
    }

    #[test]
    fn named_zone_projection() {
        let p = project(noon(), "America/New_York");
        assert_eq!(p.short_time, "09:05 AM");
        assert_eq!(p.full_date_time, "1/15/2024, 9:05:09 AM");

        let p = project(noon(), "Asia/Tokyo");
        assert_eq!(p.full_date_time, "1/15/2024, 11:05:09 PM");
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        assert_eq!(project(noon(), "Not/AZone"), project(noon(), "UTC"));
        assert_eq!(project(noon(), ""), project(noon(), "UTC"));
        assert!(!is_valid_zone("Not/AZone"));
        assert!(is_valid_zone("Europe/Paris"));
    }

    #[test]
    fn raw_projection_keeps_unparseable_input() {
        let p = project_str("not a time", "Europe/London");
        assert_eq!(p.short_time, "not a time");
        let p = project_str("2024-01-15T14:05:09", "Europe/London");
        assert_eq!(p.short_time, "02:05 PM");
    }
}

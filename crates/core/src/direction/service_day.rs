//! Anchoring GTFS time-of-day values to real instants.
//!
//! A stop time such as `25:10:00` means 25h10m after the reference midnight of
//! its service day, where the reference midnight is noon minus twelve hours so
//! that DST transitions do not shift the schedule. Stop-time slices carry no
//! service date, so the day is taken from "now" and nudged by one day either
//! way when that lands the instant within twelve hours of now.

use busradar_transit::ServiceTime;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Reference midnight of `date` in `timezone`, as noon minus twelve hours.
pub fn reference_midnight(date: NaiveDate, timezone: Tz) -> Option<DateTime<Utc>> {
    let noon = date.and_time(NaiveTime::from_hms_opt(12, 0, 0)?);
    let noon = timezone.from_local_datetime(&noon).earliest()?;
    Some(noon.with_timezone(&Utc) - Duration::hours(12))
}

/// The instant `time` refers to, on the service day closest to `now`.
pub fn resolve_service_time(time: ServiceTime, now: DateTime<Utc>, timezone: Tz) -> Option<DateTime<Utc>> {
    let service_day = now.with_timezone(&timezone).date_naive();
    let offset = Duration::seconds(i64::from(time.as_secs()));

    // The current service day comes first so it wins exact twelve-hour ties.
    [
        Some(service_day),
        service_day.pred_opt(),
        service_day.succ_opt(),
    ]
    .into_iter()
    .flatten()
    .filter_map(|day| reference_midnight(day, timezone))
    .map(|midnight| midnight + offset)
    .min_by_key(|instant| (*instant - now).abs())
}

/// Parse and resolve in one step. `None` for anything unparseable.
pub fn resolve_time_str(time: &str, now: DateTime<Utc>, timezone: Tz) -> Option<DateTime<Utc>> {
    let time = ServiceTime::parse(time).ok()?;
    resolve_service_time(time, now, timezone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Bucharest;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_same_day_in_utc() {
        let now = utc(2024, 5, 1, 8, 0);
        let resolved = resolve_time_str("08:10", now, Tz::UTC).unwrap();
        assert_eq!(resolved, utc(2024, 5, 1, 8, 10));
    }

    #[test]
    fn test_local_timezone() {
        // Bucharest is UTC+3 in May
        let now = utc(2024, 5, 1, 5, 0);
        let resolved = resolve_time_str("08:10:00", now, Bucharest).unwrap();
        assert_eq!(resolved, utc(2024, 5, 1, 5, 10));
    }

    #[test]
    fn test_after_midnight_time_belongs_to_previous_day() {
        // 00:30 local on May 2nd, trip scheduled at 24:40 of the May 1st service day
        let now = utc(2024, 5, 2, 0, 30);
        let resolved = resolve_time_str("24:40", now, Tz::UTC).unwrap();
        assert_eq!(resolved, utc(2024, 5, 2, 0, 40));
    }

    #[test]
    fn test_early_morning_time_seen_late_evening() {
        let now = utc(2024, 5, 1, 23, 50);
        let resolved = resolve_time_str("00:05", now, Tz::UTC).unwrap();
        assert_eq!(resolved, utc(2024, 5, 2, 0, 5));
    }

    #[test]
    fn test_dst_day_uses_noon_reference() {
        // Clocks go forward at 03:00 local on 2024-03-31 in Bucharest, so the
        // reference midnight sits one hour before local midnight.
        let midnight = reference_midnight(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(), Bucharest).unwrap();
        assert_eq!(midnight, utc(2024, 3, 30, 21, 0));
    }

    #[test]
    fn test_unparseable() {
        assert!(resolve_time_str("soon", utc(2024, 5, 1, 8, 0), Tz::UTC).is_none());
        assert!(resolve_time_str("", utc(2024, 5, 1, 8, 0), Tz::UTC).is_none());
    }
}

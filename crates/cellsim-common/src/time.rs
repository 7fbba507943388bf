//! ---
//! sim_section: "01-core-functionality"
//! sim_subsection: "module"
//! sim_type: "source"
//! sim_scope: "code"
//! sim_description: "Shared primitives and utilities for the simulator runtime."
//! sim_version: "v0.0.0-prealpha"
//! sim_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{
    DateTime, Duration as ChronoDuration, FixedOffset, Local, Offset, TimeZone, Timelike, Utc,
};

const TEN_MINUTES_SECS: i64 = 600;
const FIVE_MINUTES_SECS: i64 = 300;

/// Current wall-clock time in microseconds since the epoch.
pub fn now_epoch_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Convert a duration into microseconds, saturating at `i64::MAX`.
pub fn duration_to_micros(duration: Duration) -> i64 {
    i64::try_from(duration.as_micros()).unwrap_or(i64::MAX)
}

/// Interpret epoch microseconds as a UTC timestamp.
pub fn from_epoch_micros(micros: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_micros(micros).single()
}

/// Snap `now` to the nearest 10-minute boundary. Ties resolve to the earlier boundary.
pub fn nearest_ten_minute_boundary<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let floor = floor_to(now, TEN_MINUTES_SECS);
    let ceiling = floor.clone() + ChronoDuration::seconds(TEN_MINUTES_SECS);
    let to_floor = now.clone().signed_duration_since(floor.clone());
    let to_ceiling = ceiling.clone().signed_duration_since(now.clone());
    if to_floor <= to_ceiling {
        floor
    } else {
        ceiling
    }
}

/// Floor a timestamp to the enclosing 5-minute boundary.
pub fn floor_to_five_minutes<Tz: TimeZone>(ts: &DateTime<Tz>) -> DateTime<Tz> {
    floor_to(ts, FIVE_MINUTES_SECS)
}

fn floor_to<Tz: TimeZone>(ts: &DateTime<Tz>, step_secs: i64) -> DateTime<Tz> {
    let seconds_into_hour = i64::from(ts.minute()) * 60 + i64::from(ts.second());
    let excess = seconds_into_hour % step_secs;
    ts.clone()
        - ChronoDuration::seconds(excess)
        - ChronoDuration::nanoseconds(i64::from(ts.nanosecond()))
}

/// ISO-8601 with a numeric offset, e.g. `2024-03-01T10:30:00+01:00`.
pub fn to_iso8601<Tz: TimeZone>(ts: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    ts.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}

/// Local timezone offset in the `UTC+hh:mm` form used by event headers.
pub fn local_timezone_offset() -> String {
    format_offset(Local::now().offset().fix())
}

pub fn format_offset(offset: FixedOffset) -> String {
    let total = offset.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let abs = total.abs();
    format!("UTC{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}

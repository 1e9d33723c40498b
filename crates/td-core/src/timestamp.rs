//! Canonical timestamps.
//!
//! Every action-log timestamp is RFC-3339 UTC with exactly nine fractional
//! digits and a trailing `Z`. The fixed width makes lexicographic order on the
//! stored text equal chronological order.
//!
//! Within one process timestamps are strictly increasing:
//! `ts = max(system_time_ns, last + 1)`. Across processes they are plain wall
//! clock and may move backwards.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

static LAST_NANOS: AtomicI64 = AtomicI64::new(0);

/// Current instant, bumped so that no two calls in this process are equal.
#[must_use]
pub fn now() -> DateTime<Utc> {
    let wall = Utc::now();
    let Some(wall_ns) = wall.timestamp_nanos_opt() else {
        return wall;
    };

    let mut prev = LAST_NANOS.load(Ordering::Relaxed);
    loop {
        let next = wall_ns.max(prev + 1);
        match LAST_NANOS.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return DateTime::from_timestamp_nanos(next),
            Err(actual) => prev = actual,
        }
    }
}

/// Canonical timestamp text for a new action-log row.
#[must_use]
pub fn action_log_timestamp_now() -> String {
    format_timestamp(&now())
}

/// Render a timestamp in the canonical nanosecond layout.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse stored timestamp text.
///
/// Accepts RFC-3339 (any offset, any precision) and the raw SQLite
/// `DATETIME` layout `YYYY-MM-DD HH:MM:SS[.f]`, which is taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(raw, layout).ok())
        .map(|naive| naive.and_utc())
}

/// Today's calendar date (`YYYY-MM-DD`) in the local timezone.
///
/// Deferral and due dates are calendar dates typed by a person, so they are
/// compared against the local date rather than UTC.
#[must_use]
pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// UTC instants bounding the current local calendar day, as `[start, end)`.
#[must_use]
pub fn local_day_bounds() -> (DateTime<Utc>, DateTime<Utc>) {
    day_bounds(Local::now().date_naive())
}

fn day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_midnight(day);
    let end = day
        .succ_opt()
        .map_or_else(|| start + TimeDelta::days(1), local_midnight);
    (start, end)
}

fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    midnight
        .and_local_timezone(Local)
        .earliest()
        .map_or_else(|| midnight.and_utc(), |ts| ts.with_timezone(&Utc))
}

/// The local calendar date `days` from today.
#[must_use]
pub fn today_plus_days(days: u32) -> String {
    let today = Local::now().date_naive();
    today
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string()
}

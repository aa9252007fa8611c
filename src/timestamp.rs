use chrono::{DateTime, Local};

use crate::config::EventClock;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Renders a driver timestamp for the console. Realtime stamps become local
/// calendar time; monotonic stamps have no calendar anchor and are shown as
/// time since boot.
pub fn format_timestamp(timestamp_ns: u64, clock: EventClock) -> String {
    let secs = timestamp_ns / NANOS_PER_SEC;
    let nanos = (timestamp_ns % NANOS_PER_SEC) as u32;

    match clock {
        EventClock::Realtime => match DateTime::from_timestamp(secs as i64, nanos) {
            Some(utc) => utc
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S%.9f")
                .to_string(),
            None => format!("{secs}.{nanos:09}"),
        },
        EventClock::Monotonic => format!("{secs}.{nanos:09}s since boot"),
    }
}

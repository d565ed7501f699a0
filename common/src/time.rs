// Time types used across the node.
//
// Timestamps are microseconds since the UNIX epoch, which is the resolution
// transactions and blocks are stamped with. System time is never used for
// anything consensus-critical; block ordering comes from heights and the
// packager election, not from local clocks.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Microsecond timestamps used to determine it using its type
pub type TimestampMicros = u64;

// Seconds timestamps used to determine it using its type
pub type TimestampSeconds = u64;

pub const MICROS_PER_SECOND: u64 = 1_000_000;

#[inline]
pub fn get_current_time() -> Duration {
    let start = SystemTime::now();

    start
        .duration_since(UNIX_EPOCH)
        .expect("Incorrect time returned from get_current_time")
}

// Return timestamp in microseconds
// We cast it to u64 as we have plenty of time before it overflows
pub fn get_current_time_in_micros() -> TimestampMicros {
    get_current_time().as_micros() as TimestampMicros
}

// Return timestamp in seconds
pub fn get_current_time_in_seconds() -> TimestampSeconds {
    get_current_time().as_secs()
}

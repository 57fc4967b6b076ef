use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Sentinel for "never" in atomic timestamp cells.
pub(crate) const NEVER_MICROS: u64 = 0;

/// Microseconds since the Unix epoch. Pre-epoch times collapse to the
/// sentinel.
pub(crate) fn to_micros(time: SystemTime) -> u64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => since_epoch.as_micros() as u64,
        Err(_) => NEVER_MICROS,
    }
}

/// Micros since epoch, with `None` mapping to the sentinel.
pub(crate) fn to_micros_opt(time: Option<SystemTime>) -> u64 {
    time.map(to_micros).unwrap_or(NEVER_MICROS)
}

pub(crate) fn from_micros(micros: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(micros)
}

/// `None` when the cell still holds the "never" sentinel.
pub(crate) fn from_micros_opt(micros: u64) -> Option<SystemTime> {
    if micros == NEVER_MICROS {
        None
    } else {
        Some(from_micros(micros))
    }
}

/// Truncates to microsecond precision. All update timestamps the engine
/// records go through this so that a timestamp survives the round trip
/// through a dump file name unchanged.
pub(crate) fn truncate_to_micros(time: SystemTime) -> SystemTime {
    from_micros(to_micros(time))
}

/// Wall-clock now at microsecond precision.
pub(crate) fn system_now() -> SystemTime {
    truncate_to_micros(SystemTime::now())
}

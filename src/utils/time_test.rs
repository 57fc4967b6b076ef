use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::utils::time::from_micros;
use crate::utils::time::from_micros_opt;
use crate::utils::time::to_micros;
use crate::utils::time::truncate_to_micros;
use crate::utils::time::NEVER_MICROS;

#[test]
fn test_micros_round_trip() {
    let time = UNIX_EPOCH + Duration::from_micros(1_722_556_800_123_456);
    assert_eq!(from_micros(to_micros(time)), time);
}

#[test]
fn test_truncate_drops_sub_micro_precision() {
    let time = UNIX_EPOCH + Duration::new(1_722_556_800, 123_456_789);
    let truncated = truncate_to_micros(time);
    assert_eq!(
        truncated,
        UNIX_EPOCH + Duration::new(1_722_556_800, 123_456_000)
    );
    // Idempotent
    assert_eq!(truncate_to_micros(truncated), truncated);
}

#[test]
fn test_never_sentinel() {
    assert_eq!(from_micros_opt(NEVER_MICROS), None);
    assert!(from_micros_opt(1).is_some());
}

#[test]
fn test_pre_epoch_collapses_to_never() {
    let before_epoch = UNIX_EPOCH - Duration::from_secs(1);
    assert_eq!(to_micros(before_epoch), NEVER_MICROS);
}

#[test]
fn test_system_now_is_truncated() {
    let now = crate::utils::time::system_now();
    assert_eq!(truncate_to_micros(now), now);
    assert!(now > SystemTime::UNIX_EPOCH);
}

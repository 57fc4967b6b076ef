use std::path::Path;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::dump::DumpPathManager;

fn micros(micros: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_micros(micros)
}

#[test]
fn test_file_name_round_trip() {
    let update_time = micros(1_722_556_800_123_456);
    let name = DumpPathManager::dump_file_name(update_time, 3);
    assert_eq!(
        DumpPathManager::parse_dump_file_name(&name),
        Some((update_time, 3))
    );
}

#[test]
fn test_file_name_encodes_utc_timestamp() {
    // 2024-08-02 00:00:00.000001 UTC
    let update_time = micros(1_722_556_800_000_001);
    let name = DumpPathManager::dump_file_name(update_time, 0);
    assert_eq!(name, "2024-08-02T00-00-00.000001-0");
}

#[test]
fn test_parse_rejects_foreign_and_tmp_names() {
    assert_eq!(DumpPathManager::parse_dump_file_name("README.md"), None);
    assert_eq!(DumpPathManager::parse_dump_file_name("not-a-dump"), None);
    assert_eq!(
        DumpPathManager::parse_dump_file_name("2024-08-02T00-00-00.000001-0.tmp"),
        None
    );
    assert_eq!(DumpPathManager::parse_dump_file_name(""), None);
}

#[test]
fn test_tmp_path_is_sibling_with_suffix() {
    let tmp = DumpPathManager::tmp_path(Path::new("/var/dumps/2024-08-02T00-00-00.000001-0"));
    assert_eq!(
        tmp,
        Path::new("/var/dumps/2024-08-02T00-00-00.000001-0.tmp")
    );
    assert!(DumpPathManager::is_tmp_file_name(
        tmp.file_name().unwrap().to_str().unwrap()
    ));
}

#[test]
fn test_records_order_by_name_timestamp() {
    let older = DumpPathManager::dump_file_name(micros(1_000_000), 0);
    let newer = DumpPathManager::dump_file_name(micros(2_000_000), 0);
    assert!(older < newer);
}

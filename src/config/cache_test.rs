use crate::AllowedUpdateTypes;
use crate::CacheConfig;
use crate::CacheConfigPatch;
use crate::DumpConfig;
use crate::Error;
use crate::FirstUpdateMode;

use std::time::Duration;

#[test]
fn test_defaults_are_valid_for_full_only() {
    let config = CacheConfig {
        allowed_update_types: AllowedUpdateTypes::OnlyFull,
        ..Default::default()
    };
    assert!(config.validate().is_ok());
    assert_eq!(config.first_update_mode, FirstUpdateMode::Required);
    assert!(!config.dump.enabled);
    assert!(config.force_full_second_update);
}

#[test]
fn test_default_full_and_incremental_requires_full_interval() {
    let config = CacheConfig::default();
    assert_eq!(
        config.allowed_update_types,
        AllowedUpdateTypes::FullAndIncremental
    );
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig(msg)) if msg.contains("full_update_interval")
    ));

    let config = CacheConfig {
        full_update_interval_in_ms: 3_600_000,
        ..config
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_update_interval_rejected() {
    let config = CacheConfig {
        update_interval_in_ms: 0,
        allowed_update_types: AllowedUpdateTypes::OnlyFull,
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig(msg)) if msg.contains("update_interval")
    ));
}

#[test]
fn test_dump_enabled_requires_dir() {
    let config = CacheConfig {
        allowed_update_types: AllowedUpdateTypes::OnlyFull,
        dump: DumpConfig {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig(msg)) if msg.contains("dump.dir")
    ));

    let config = CacheConfig {
        dump: DumpConfig {
            enabled: true,
            dir: "/tmp/dumps".into(),
            ..Default::default()
        },
        ..config
    };
    assert!(config.validate().is_ok());
}

#[test]
fn test_dump_enabled_requires_retention() {
    let config = CacheConfig {
        allowed_update_types: AllowedUpdateTypes::OnlyFull,
        dump: DumpConfig {
            enabled: true,
            dir: "/tmp/dumps".into(),
            max_count: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig(msg)) if msg.contains("max_count")
    ));
}

#[test]
fn test_jitter_defaults_to_tenth_of_interval() {
    let config = CacheConfig {
        update_interval_in_ms: 5_000,
        ..Default::default()
    };
    assert_eq!(config.update_jitter(), Duration::from_millis(500));

    let config = CacheConfig {
        update_jitter_in_ms: Some(42),
        ..config
    };
    assert_eq!(config.update_jitter(), Duration::from_millis(42));
}

#[test]
fn test_merge_with_patch_overrides_dynamic_fields() {
    let base = CacheConfig {
        allowed_update_types: AllowedUpdateTypes::OnlyFull,
        dump: DumpConfig {
            enabled: false,
            dir: "/var/cache/dumps".into(),
            ..Default::default()
        },
        ..Default::default()
    };

    let patch = CacheConfigPatch {
        update_interval_in_ms: Some(60_000),
        allowed_update_types: Some(AllowedUpdateTypes::OnlyIncremental),
        dumps_enabled: Some(true),
        min_dump_interval_in_ms: Some(1_000),
        ..Default::default()
    };

    let merged = base.merge_with(&patch);
    assert_eq!(merged.update_interval_in_ms, 60_000);
    assert_eq!(
        merged.allowed_update_types,
        AllowedUpdateTypes::OnlyIncremental
    );
    assert!(merged.dump.enabled);
    assert_eq!(merged.dump.min_interval(), Duration::from_millis(1_000));
    // Static fields survive the patch
    assert_eq!(merged.dump.dir, "/var/cache/dumps");
    assert_eq!(merged.dump.max_count, base.dump.max_count);
    assert_eq!(
        merged.allow_first_update_failure,
        base.allow_first_update_failure
    );
}

#[test]
fn test_empty_patch_is_identity() {
    let base = CacheConfig {
        allowed_update_types: AllowedUpdateTypes::OnlyFull,
        ..Default::default()
    };
    assert_eq!(base.merge_with(&CacheConfigPatch::default()), base);
}

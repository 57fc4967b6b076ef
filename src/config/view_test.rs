use crate::AllowedUpdateTypes;
use crate::CacheConfig;
use crate::ConfigView;

#[test]
fn test_snapshot_is_stable_across_assign() {
    let view = ConfigView::new(CacheConfig {
        update_interval_in_ms: 1_000,
        ..Default::default()
    });

    let snapshot = view.read();
    assert_eq!(snapshot.update_interval_in_ms, 1_000);

    view.assign(CacheConfig {
        update_interval_in_ms: 2_000,
        ..Default::default()
    });

    // The acquired snapshot keeps its values; a fresh read sees the new one
    assert_eq!(snapshot.update_interval_in_ms, 1_000);
    assert_eq!(view.read().update_interval_in_ms, 2_000);
}

#[test]
fn test_cleanup_keeps_current_snapshot() {
    let view = ConfigView::new(CacheConfig {
        allowed_update_types: AllowedUpdateTypes::OnlyIncremental,
        ..Default::default()
    });
    view.cleanup_stale_snapshots();
    assert_eq!(
        view.read().allowed_update_types,
        AllowedUpdateTypes::OnlyIncremental
    );
}

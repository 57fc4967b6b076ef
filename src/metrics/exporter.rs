//! Prometheus rendering of per-cache statistics.
//!
//! A metrics exporter calls [`export_statistics`] for each cache it tracks
//! and serves [`gather_metrics_body`] as the text exposition.

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::TextEncoder;

use crate::Statistics;
use crate::UpdateStatisticsSnapshot;

lazy_static! {
    pub static ref UPDATE_ATTEMPTS_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_update_attempts", "Update attempts per cache and update kind"),
        &["cache_name", "kind"]
    )
    .expect("metric can not be created");
    pub static ref UPDATE_NO_CHANGES_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_update_no_changes", "Updates that found no source changes"),
        &["cache_name", "kind"]
    )
    .expect("metric can not be created");
    pub static ref UPDATE_FAILURES_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_update_failures", "Failed update attempts"),
        &["cache_name", "kind"]
    )
    .expect("metric can not be created");
    pub static ref DOCUMENTS_READ_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_documents_read", "Documents read from the authoritative source"),
        &["cache_name", "kind"]
    )
    .expect("metric can not be created");
    pub static ref DOCUMENTS_CURRENT_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_documents_current", "Documents currently held by the cache"),
        &["cache_name"]
    )
    .expect("metric can not be created");
    pub static ref DUMP_LAST_WRITTEN_SIZE_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_dump_last_written_size", "Size in bytes of the last written dump"),
        &["cache_name"]
    )
    .expect("metric can not be created");
    pub static ref DUMP_WRITE_DURATION_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "cache_dump_last_nontrivial_write_duration_ms",
            "Duration of the last non-bump dump write in ms"
        ),
        &["cache_name"]
    )
    .expect("metric can not be created");
    pub static ref DUMP_IS_LOADED_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_dump_is_loaded", "Whether a dump was restored at startup"),
        &["cache_name"]
    )
    .expect("metric can not be created");
    pub static ref DUMP_IS_CURRENT_FROM_DUMP_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "cache_dump_is_current_from_dump",
            "Whether in-memory contents still come from the restored dump"
        ),
        &["cache_name"]
    )
    .expect("metric can not be created");
    pub static ref DUMP_LOAD_DURATION_METRIC: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cache_dump_load_duration_ms", "Duration of the dump load in ms"),
        &["cache_name"]
    )
    .expect("metric can not be created");
    pub static ref CUSTOM_REGISTRY: Registry =
        Registry::new_custom(Some("recache".to_string()), None).unwrap();
}

pub(crate) fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(UPDATE_ATTEMPTS_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(UPDATE_NO_CHANGES_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(UPDATE_FAILURES_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DOCUMENTS_READ_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DOCUMENTS_CURRENT_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DUMP_LAST_WRITTEN_SIZE_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DUMP_WRITE_DURATION_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DUMP_IS_LOADED_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DUMP_IS_CURRENT_FROM_DUMP_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(DUMP_LOAD_DURATION_METRIC.clone()))
        .expect("collector can be registered");
}

fn export_update_kind(
    cache_name: &str,
    kind: &str,
    snapshot: &UpdateStatisticsSnapshot,
) {
    let labels = &[cache_name, kind];
    UPDATE_ATTEMPTS_METRIC
        .with_label_values(labels)
        .set(snapshot.update_attempt_count as i64);
    UPDATE_NO_CHANGES_METRIC
        .with_label_values(labels)
        .set(snapshot.update_no_changes_count as i64);
    UPDATE_FAILURES_METRIC
        .with_label_values(labels)
        .set(snapshot.update_failures_count as i64);
    DOCUMENTS_READ_METRIC
        .with_label_values(labels)
        .set(snapshot.documents_read_count as i64);
}

/// Refreshes the exported gauges for one cache from its live statistics.
pub fn export_statistics(
    cache_name: &str,
    statistics: &Statistics,
) {
    let snapshot = statistics.snapshot();

    export_update_kind(cache_name, "full", &snapshot.full);
    export_update_kind(cache_name, "incremental", &snapshot.incremental);
    export_update_kind(cache_name, "any", &snapshot.any);

    DOCUMENTS_CURRENT_METRIC
        .with_label_values(&[cache_name])
        .set(snapshot.documents_current_count as i64);
    DUMP_LAST_WRITTEN_SIZE_METRIC
        .with_label_values(&[cache_name])
        .set(snapshot.dump.last_written_size as i64);
    DUMP_WRITE_DURATION_METRIC
        .with_label_values(&[cache_name])
        .set(snapshot.dump.last_nontrivial_write_duration_ms as i64);
    DUMP_IS_LOADED_METRIC
        .with_label_values(&[cache_name])
        .set(snapshot.dump.is_loaded as i64);
    DUMP_IS_CURRENT_FROM_DUMP_METRIC
        .with_label_values(&[cache_name])
        .set(snapshot.dump.is_current_from_dump as i64);
    DUMP_LOAD_DURATION_METRIC
        .with_label_values(&[cache_name])
        .set(snapshot.dump.load_duration_ms as i64);
}

/// Text exposition of all exported cache metrics.
pub fn gather_metrics_body() -> String {
    use std::sync::Once;
    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| register_custom_metrics(&CUSTOM_REGISTRY));

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&CUSTOM_REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "could not encode cache metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

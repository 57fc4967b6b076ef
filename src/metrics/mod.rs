//! Per-cache refresh and dump statistics.
//!
//! Counters are atomic: the engine writes them from the update path and
//! dump tasks, a metrics exporter reads them concurrently. Timestamps are
//! stored as microseconds since the Unix epoch with `0` meaning "never".

mod exporter;
pub use exporter::*;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;

use serde::Serialize;
use tokio::time::Instant;

use crate::utils::time;
use crate::UpdateType;

#[derive(Debug, Default)]
pub struct Statistics {
    pub full: UpdateStatistics,
    pub incremental: UpdateStatistics,
    pub dump: DumpStatistics,
    pub documents_current_count: AtomicU64,
}

#[derive(Debug, Default)]
pub struct UpdateStatistics {
    pub update_attempt_count: AtomicU64,
    pub update_no_changes_count: AtomicU64,
    pub update_failures_count: AtomicU64,
    pub documents_read_count: AtomicU64,
    pub documents_parse_failures_count: AtomicU64,
    /// Micros since epoch of the most recent attempt
    pub last_update_start_time: AtomicU64,
    /// Micros since epoch of the most recent successful attempt
    pub last_successful_update_start_time: AtomicU64,
    pub last_update_duration_ms: AtomicU64,
}

#[derive(Debug, Default)]
pub struct DumpStatistics {
    /// A dump was restored at startup
    pub is_loaded: AtomicBool,
    /// In-memory contents still come from the restored dump; cleared by the
    /// first successful update
    pub is_current_from_dump: AtomicBool,
    pub load_duration_ms: AtomicU64,
    pub last_written_size: AtomicU64,
    pub last_nontrivial_write_duration_ms: AtomicU64,
    /// Micros since epoch when the last non-bump write started
    pub last_nontrivial_write_start_time: AtomicU64,
}

impl Statistics {
    pub fn for_update_type(
        &self,
        update_type: UpdateType,
    ) -> &UpdateStatistics {
        match update_type {
            UpdateType::Full => &self.full,
            UpdateType::Incremental => &self.incremental,
        }
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let full = self.full.snapshot();
        let incremental = self.incremental.snapshot();
        StatisticsSnapshot {
            any: full.combine(&incremental),
            full,
            incremental,
            dump: self.dump.snapshot(),
            documents_current_count: self.documents_current_count.load(Ordering::Relaxed),
        }
    }
}

impl UpdateStatistics {
    fn snapshot(&self) -> UpdateStatisticsSnapshot {
        UpdateStatisticsSnapshot {
            update_attempt_count: self.update_attempt_count.load(Ordering::Relaxed),
            update_no_changes_count: self.update_no_changes_count.load(Ordering::Relaxed),
            update_failures_count: self.update_failures_count.load(Ordering::Relaxed),
            documents_read_count: self.documents_read_count.load(Ordering::Relaxed),
            documents_parse_failures_count: self
                .documents_parse_failures_count
                .load(Ordering::Relaxed),
            last_update_start_time_us: self.last_update_start_time.load(Ordering::Relaxed),
            last_successful_update_start_time_us: self
                .last_successful_update_start_time
                .load(Ordering::Relaxed),
            last_update_duration_ms: self.last_update_duration_ms.load(Ordering::Relaxed),
        }
    }
}

impl DumpStatistics {
    fn snapshot(&self) -> DumpStatisticsSnapshot {
        DumpStatisticsSnapshot {
            is_loaded: self.is_loaded.load(Ordering::Relaxed),
            is_current_from_dump: self.is_current_from_dump.load(Ordering::Relaxed),
            load_duration_ms: self.load_duration_ms.load(Ordering::Relaxed),
            last_written_size: self.last_written_size.load(Ordering::Relaxed),
            last_nontrivial_write_duration_ms: self
                .last_nontrivial_write_duration_ms
                .load(Ordering::Relaxed),
            last_nontrivial_write_start_time_us: self
                .last_nontrivial_write_start_time
                .load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time rendering for the metrics exporter.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatisticsSnapshot {
    pub full: UpdateStatisticsSnapshot,
    pub incremental: UpdateStatisticsSnapshot,
    /// Combined view over both update kinds
    pub any: UpdateStatisticsSnapshot,
    pub dump: DumpStatisticsSnapshot,
    pub documents_current_count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpdateStatisticsSnapshot {
    pub update_attempt_count: u64,
    pub update_no_changes_count: u64,
    pub update_failures_count: u64,
    pub documents_read_count: u64,
    pub documents_parse_failures_count: u64,
    pub last_update_start_time_us: u64,
    pub last_successful_update_start_time_us: u64,
    pub last_update_duration_ms: u64,
}

impl UpdateStatisticsSnapshot {
    fn combine(
        &self,
        other: &UpdateStatisticsSnapshot,
    ) -> UpdateStatisticsSnapshot {
        UpdateStatisticsSnapshot {
            update_attempt_count: self.update_attempt_count + other.update_attempt_count,
            update_no_changes_count: self.update_no_changes_count + other.update_no_changes_count,
            update_failures_count: self.update_failures_count + other.update_failures_count,
            documents_read_count: self.documents_read_count + other.documents_read_count,
            documents_parse_failures_count: self.documents_parse_failures_count
                + other.documents_parse_failures_count,
            last_update_start_time_us: self
                .last_update_start_time_us
                .max(other.last_update_start_time_us),
            last_successful_update_start_time_us: self
                .last_successful_update_start_time_us
                .max(other.last_successful_update_start_time_us),
            last_update_duration_ms: self
                .last_update_duration_ms
                .max(other.last_update_duration_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DumpStatisticsSnapshot {
    pub is_loaded: bool,
    pub is_current_from_dump: bool,
    pub load_duration_ms: u64,
    pub last_written_size: u64,
    pub last_nontrivial_write_duration_ms: u64,
    pub last_nontrivial_write_start_time_us: u64,
}

/// Scoped bookkeeping for one update attempt.
///
/// Opening the scope records the attempt; the user capability finishes it
/// with the document count on success. Dropping an unfinished scope counts
/// the attempt as failed, so every exit path (error return, cancellation)
/// is accounted for.
pub struct UpdateStatisticsScope<'a> {
    statistics: &'a Statistics,
    update: &'a UpdateStatistics,
    started_at: Instant,
    finished: bool,
}

impl<'a> UpdateStatisticsScope<'a> {
    pub(crate) fn new(
        statistics: &'a Statistics,
        update_type: UpdateType,
    ) -> Self {
        let update = statistics.for_update_type(update_type);
        update.update_attempt_count.fetch_add(1, Ordering::Relaxed);
        update.last_update_start_time.store(
            time::to_micros(SystemTime::now()),
            Ordering::Relaxed,
        );
        Self {
            statistics,
            update,
            started_at: Instant::now(),
            finished: false,
        }
    }

    pub fn increase_documents_read_count(
        &self,
        count: u64,
    ) {
        self.update
            .documents_read_count
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn increase_documents_parse_failures(
        &self,
        count: u64,
    ) {
        self.update
            .documents_parse_failures_count
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Marks the attempt successful and publishes the current document
    /// count.
    pub fn finish(
        &mut self,
        documents_count: u64,
    ) {
        self.statistics
            .documents_current_count
            .store(documents_count, Ordering::Relaxed);
        self.finish_inner();
    }

    /// Marks the attempt successful without touching cache contents.
    pub fn finish_no_changes(&mut self) {
        self.update
            .update_no_changes_count
            .fetch_add(1, Ordering::Relaxed);
        self.finish_inner();
    }

    fn finish_inner(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.update.last_successful_update_start_time.store(
            self.update.last_update_start_time.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );
        self.update.last_update_duration_ms.store(
            self.started_at.elapsed().as_millis() as u64,
            Ordering::Relaxed,
        );
    }
}

impl Drop for UpdateStatisticsScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.update
                .update_failures_count
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

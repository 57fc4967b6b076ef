//! The capability set a user cache plugs into the engine.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::DumpError;
use crate::DumpReader;
use crate::DumpWriter;
use crate::Result;
use crate::UpdateStatisticsScope;

/// Kind of refresh performed against the authoritative source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    /// Rebuild cache contents from scratch
    Full,
    /// Apply only the changes since the last update
    Incremental,
}

impl UpdateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateType::Full => "full",
            UpdateType::Incremental => "incremental",
        }
    }
}

/// Everything one update attempt may observe and report.
pub struct UpdateContext<'a> {
    /// The refresh kind the engine chose
    pub update_type: UpdateType,
    /// Wall-clock moment of the most recent successful update; `None` for
    /// a cache that has never loaded
    pub last_update: Option<SystemTime>,
    /// Wall-clock moment this attempt is stamped with on success
    pub now: SystemTime,
    modified: &'a AtomicBool,
    stats: UpdateStatisticsScope<'a>,
}

impl<'a> UpdateContext<'a> {
    pub(crate) fn new(
        update_type: UpdateType,
        last_update: Option<SystemTime>,
        now: SystemTime,
        modified: &'a AtomicBool,
        stats: UpdateStatisticsScope<'a>,
    ) -> Self {
        Self {
            update_type,
            last_update,
            now,
            modified,
            stats,
        }
    }

    /// Signals that this update changed cache contents. Without it the
    /// engine treats the contents as untouched and turns the next dump
    /// into a rename of the previous record.
    pub fn on_cache_modified(&self) {
        self.modified.store(true, Ordering::SeqCst);
    }

    /// Statistics scope of this attempt; finish it on success.
    pub fn stats(&mut self) -> &mut UpdateStatisticsScope<'a> {
        &mut self.stats
    }
}

/// The per-cache contract: a user-defined in-memory structure rebuilt from
/// an external authoritative source.
///
/// `write_to` and `read_from` are required exactly when dumps are enabled
/// for the cache; the defaults fail loudly so a dump-enabled cache without
/// them is caught the first time a dump is attempted.
#[async_trait]
pub trait Cache: Send + Sync + 'static {
    /// Refreshes the cache from the authoritative source. Report errors by
    /// returning them; signal content changes via
    /// [`UpdateContext::on_cache_modified`] and finish
    /// [`UpdateContext::stats`] on success.
    async fn update(
        &self,
        ctx: &mut UpdateContext<'_>,
    ) -> Result<()>;

    /// Periodic maintenance outside the update path.
    async fn cleanup(&self) {}

    /// Serializes current contents into a dump record. Only stream bytes
    /// into the writer; the engine creates it and finalizes it after this
    /// returns, so do not call [`DumpWriter::finish`]. Return
    /// [`DumpError::EmptyCache`] to abort the dump gracefully when there
    /// is nothing to persist.
    async fn write_to(
        &self,
        writer: &mut dyn DumpWriter,
    ) -> Result<()> {
        let _ = writer;
        Err(DumpError::Unimplemented.into())
    }

    /// Restores contents from a dump record. Only read bytes out of the
    /// reader; the engine finalizes it after this returns.
    async fn read_from(
        &self,
        reader: &mut dyn DumpReader,
    ) -> Result<()> {
        let _ = reader;
        Err(DumpError::Unimplemented.into())
    }
}

//! The central state machine governing one cache's lifecycle: periodic and
//! forced updates, dump writes and bumps, dump loads at startup, and
//! start/stop coordination.

mod state;
pub(crate) use state::*;


use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::SystemTime;

use tokio::sync::watch;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;
use tracing::Instrument;

use crate::utils::time;
use crate::AllowedUpdateTypes;
use crate::Cache;
use crate::CacheConfig;
use crate::CacheConfigPatch;
use crate::CacheControl;
use crate::ConfigView;
use crate::DumpCodec;
use crate::DumpError;
use crate::DumpStore;
use crate::Error;
use crate::FileDumpCodec;
use crate::FirstUpdateMode;
use crate::PeriodicTask;
use crate::Result;
use crate::Statistics;
use crate::StatisticsSnapshot;
use crate::TaskFlags;
use crate::TaskSettings;
use crate::UpdateContext;
use crate::UpdateStatisticsScope;
use crate::UpdateType;

/// Start-time behavior switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartFlags {
    /// Skip the synchronous first update; ignored when periodic updates
    /// are disabled, because some components require caches to be updated
    /// at least once
    pub no_first_update: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DumpType {
    /// Respect `dump.min_interval` since the last committed record
    HonorInterval,
    /// Dump regardless of the interval
    Forced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DumpOperation {
    NewDump,
    BumpTime,
}

/// Cheap-to-clone handle of one cache's refresh engine. All clones share
/// the same state; background tasks hold clones of the handle.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    name: String,
    static_config: CacheConfig,
    config: ConfigView,
    cache: Arc<dyn Cache>,
    codec: Arc<dyn DumpCodec>,
    store: DumpStore,
    statistics: Statistics,
    update: Mutex<UpdateState>,
    control: Arc<CacheControl>,
    /// Sampled from the control at construction, in component order
    periodic_update_enabled: bool,
    is_running: AtomicBool,
    force_next_update_full: AtomicBool,
    cache_modified: AtomicBool,
    /// `update_time` of the most recent committed dump record, micros
    /// since epoch, advanced with atomic-max only
    last_dumped_update: AtomicU64,
    update_task: PeriodicTask,
    cleanup_task: PeriodicTask,
    task_flags: StdMutex<TaskFlags>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if self.is_running.load(Ordering::SeqCst) {
            error!(
                cache = %self.name,
                "cache engine is being destroyed while periodic updates are still running; \
                 call stop() before dropping the last handle"
            );
            debug_assert!(false, "CacheEngine::stop() was not called");
        }
    }
}

impl CacheEngine {
    /// Creates an inert engine with the default file-backed codec.
    pub fn new(
        name: impl Into<String>,
        config: CacheConfig,
        cache: Arc<dyn Cache>,
        control: Arc<CacheControl>,
    ) -> Result<Self> {
        Self::with_codec(name, config, cache, Arc::new(FileDumpCodec), control)
    }

    /// Creates an inert engine with a custom dump codec.
    pub fn with_codec(
        name: impl Into<String>,
        config: CacheConfig,
        cache: Arc<dyn Cache>,
        codec: Arc<dyn DumpCodec>,
        control: Arc<CacheControl>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let store = DumpStore::new(&config.dump.dir, config.dump.max_count);
        let periodic_update_enabled = control.periodic_updates_enabled();

        Ok(Self {
            inner: Arc::new(EngineInner {
                update_task: PeriodicTask::new(format!("update-task/{name}")),
                cleanup_task: PeriodicTask::new(format!("cleanup-task/{name}")),
                config: ConfigView::new(config.clone()),
                static_config: config,
                cache,
                codec,
                store,
                statistics: Statistics::default(),
                update: Mutex::new(UpdateState::default()),
                control,
                periodic_update_enabled,
                is_running: AtomicBool::new(false),
                force_next_update_full: AtomicBool::new(false),
                cache_modified: AtomicBool::new(false),
                last_dumped_update: AtomicU64::new(time::NEVER_MICROS),
                task_flags: StdMutex::new(TaskFlags {
                    chaotic: true,
                    critical: true,
                    now: false,
                }),
                name,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn statistics(&self) -> &Statistics {
        &self.inner.statistics
    }

    pub fn statistics_snapshot(&self) -> StatisticsSnapshot {
        self.inner.statistics.snapshot()
    }

    pub fn allowed_update_types(&self) -> AllowedUpdateTypes {
        self.inner.config.read().allowed_update_types
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    /// Assertion-channel check for components that require a started cache.
    pub fn assert_periodic_update_started(&self) {
        if !self.is_running() {
            error!(
                cache = %self.inner.name,
                "cache engine has been constructed without calling start()"
            );
            debug_assert!(false, "CacheEngine::start() was not called");
        }
    }

    /// Exactly-once transition into the running state.
    ///
    /// Attempts a dump load, then a synchronous first update per the
    /// configured policy, then arms the periodic update and cleanup tasks.
    /// Any error unwinds the transition and propagates.
    pub async fn start(
        &self,
        flags: StartFlags,
    ) -> Result<()> {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match self.start_inner(flags).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // The periodic tasks were not armed; only the transition
                // needs to unwind.
                self.inner.is_running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn start_inner(
        &self,
        flags: StartFlags,
    ) -> Result<()> {
        // Registered here so that test-hook invalidators observe caches in
        // the order their components start.
        self.inner.control.register(self)?;
        match self.start_registered(flags).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.control.deregister(&self.inner.name);
                Err(e)
            }
        }
    }

    async fn start_registered(
        &self,
        flags: StartFlags,
    ) -> Result<()> {
        let config = self.inner.config.read();

        let dump_loaded = self.load_from_dump().await;

        let skip_first_update = (dump_loaded && config.first_update_mode == FirstUpdateMode::Skip)
            || (flags.no_first_update && self.inner.periodic_update_enabled);

        if !skip_first_update {
            let span = info_span!("first-update", cache = %self.inner.name);
            if let Err(e) = self.do_periodic_update().instrument(span).await {
                if dump_loaded && config.first_update_mode != FirstUpdateMode::Required {
                    error!(
                        cache = %self.inner.name,
                        error = %e,
                        "failed to update cache after loading a dump, going on with the \
                         contents loaded from the dump"
                    );
                } else if self.inner.static_config.allow_first_update_failure {
                    error!(
                        cache = %self.inner.name,
                        error = %e,
                        "failed to update cache for the first time, leaving it empty"
                    );
                } else {
                    error!(
                        cache = %self.inner.name,
                        error = %e,
                        "failed to update cache for the first time"
                    );
                    return Err(e);
                }
            }
        }

        // After loading a dump with only-incremental updates, no full
        // update would ever wash out corrupted dump contents, even across
        // restarts. Schedule a single immediate full update.
        if dump_loaded
            && config.allowed_update_types == AllowedUpdateTypes::OnlyIncremental
            && config.force_full_second_update
        {
            self.inner.force_next_update_full.store(true, Ordering::SeqCst);
            self.inner
                .task_flags
                .lock()
                .expect("task flags lock poisoned")
                .now = true;
        }

        if self.inner.periodic_update_enabled {
            let engine = self.clone();
            self.inner.update_task.start(
                self.periodic_task_settings(&config),
                move || {
                    let engine = engine.clone();
                    async move { engine.do_periodic_update().await }
                },
            );

            let engine = self.clone();
            self.inner.cleanup_task.start(
                TaskSettings::new(config.cleanup_interval()),
                move || {
                    let engine = engine.clone();
                    async move { engine.do_cleanup().await }
                },
            );
        }

        Ok(())
    }

    /// Exactly-once transition out of the running state.
    ///
    /// Stops the periodic tasks, then cancels and awaits any in-flight
    /// dump task. Never raises; step failures are logged.
    pub async fn stop(&self) {
        if !self.inner.is_running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.inner.update_task.stop().await;
        self.inner.cleanup_task.stop().await;
        self.inner.control.deregister(&self.inner.name);

        let mut state = self.inner.update.lock().await;
        if let Some(task) = state.dump_task.take() {
            if !task.is_finished() {
                warn!(cache = %self.inner.name, "stopping an in-flight dump task");
                task.request_cancel();
            }
            if let Err(e) = task.join().await {
                error!(cache = %self.inner.name, error = %e, "error in the dump task of the cache");
            }
        }
    }

    /// Forced update (test hook). The requested type is taken verbatim,
    /// except that only-full caches upgrade an incremental request to full.
    pub async fn update(
        &self,
        update_type: UpdateType,
    ) -> Result<()> {
        let mut state = self.inner.update.lock().await;
        let config = self.inner.config.read();

        let update_type = if config.allowed_update_types == AllowedUpdateTypes::OnlyFull {
            UpdateType::Full
        } else {
            update_type
        };

        match self.do_update(update_type, &mut state).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.dump_async_if_needed(DumpType::HonorInterval, &mut state, &config)
                    .await;
                Err(e)
            }
        }
    }

    /// Forces a dump and waits for it to land on disk (test hook).
    pub async fn dump_sync_debug(&self) {
        let mut state = self.inner.update.lock().await;
        let config = self.inner.config.read();

        self.dump_async_if_needed(DumpType::Forced, &mut state, &config)
            .await;
        if let Some(task) = state.dump_task.take() {
            if let Err(e) = task.join().await {
                error!(cache = %self.inner.name, error = %e, "error in the dump task of the cache");
            }
        }
    }

    /// Applies a dynamic-config patch (or reverts to the static config)
    /// and pushes the new schedule to the periodic tasks. In-flight ticks
    /// keep the snapshot they already acquired.
    pub fn set_config(
        &self,
        patch: Option<&CacheConfigPatch>,
    ) {
        let effective = match patch {
            Some(patch) => self.inner.static_config.merge_with(patch),
            None => self.inner.static_config.clone(),
        };
        self.inner.config.assign(effective);

        let config = self.inner.config.read();
        self.inner
            .update_task
            .set_settings(self.periodic_task_settings(&config));
        self.inner
            .cleanup_task
            .set_settings(TaskSettings::new(config.cleanup_interval()));
    }

    fn periodic_task_settings(
        &self,
        config: &CacheConfig,
    ) -> TaskSettings {
        let flags = *self.inner.task_flags.lock().expect("task flags lock poisoned");
        TaskSettings::new(config.update_interval())
            .with_jitter(config.update_jitter())
            .with_flags(flags)
    }

    /// One tick of the periodic update task; also the synchronous first
    /// update.
    async fn do_periodic_update(&self) -> Result<()> {
        let mut state = self.inner.update.lock().await;
        let config = self.inner.config.read();

        // The update is full regardless of the allowed types if the cache
        // is still empty or a forced full was scheduled at start.
        let force_full_update = self.inner.force_next_update_full.swap(false, Ordering::SeqCst)
            || state.last_update.is_none();

        let update_type = if force_full_update {
            UpdateType::Full
        } else {
            match config.allowed_update_types {
                AllowedUpdateTypes::OnlyFull => UpdateType::Full,
                AllowedUpdateTypes::OnlyIncremental => UpdateType::Incremental,
                AllowedUpdateTypes::FullAndIncremental => {
                    let full_due = match state.last_full_update {
                        Some(last_full) => {
                            Instant::now().duration_since(last_full)
                                >= config.full_update_interval()
                        }
                        None => true,
                    };
                    if full_due {
                        UpdateType::Full
                    } else {
                        UpdateType::Incremental
                    }
                }
            }
        };

        match self.do_update(update_type, &mut state).await {
            Ok(()) => {
                self.dump_async_if_needed(DumpType::HonorInterval, &mut state, &config)
                    .await;
                Ok(())
            }
            Err(e) => {
                warn!(cache = %self.inner.name, error = %e, "error while updating cache");
                self.dump_async_if_needed(DumpType::HonorInterval, &mut state, &config)
                    .await;
                Err(e)
            }
        }
    }

    /// Drives the user update capability and records its outcome.
    async fn do_update(
        &self,
        update_type: UpdateType,
        state: &mut UpdateState,
    ) -> Result<()> {
        let steady_now = Instant::now();
        let update_type_str = update_type.as_str();
        info!(cache = %self.inner.name, update_type = update_type_str, "updating cache");

        let system_now = time::system_now();
        let scope = UpdateStatisticsScope::new(&self.inner.statistics, update_type);
        let mut ctx = UpdateContext::new(
            update_type,
            state.last_update,
            system_now,
            &self.inner.cache_modified,
            scope,
        );

        let span = info_span!(
            "cache-update",
            cache = %self.inner.name,
            update_type = update_type_str
        );
        self.inner.cache.update(&mut ctx).instrument(span).await?;
        drop(ctx);
        info!(cache = %self.inner.name, update_type = update_type_str, "updated cache");

        state.last_update = Some(system_now);
        if self.inner.cache_modified.swap(false, Ordering::SeqCst) {
            state.last_modifying_update = Some(system_now);
        }
        if update_type == UpdateType::Full {
            state.last_full_update = Some(steady_now);
        }
        self.inner
            .statistics
            .dump
            .is_current_from_dump
            .store(false, Ordering::Relaxed);
        Ok(())
    }

    fn should_dump(
        &self,
        dump_type: DumpType,
        state: &UpdateState,
        config: &CacheConfig,
    ) -> bool {
        if !config.dump.enabled {
            debug!(cache = %self.inner.name, "cache dump skipped, dumps are disabled");
            return false;
        }

        let Some(last_update) = state.last_update else {
            debug!(cache = %self.inner.name, "cache dump skipped, the cache has not loaded yet");
            return false;
        };

        if dump_type == DumpType::HonorInterval {
            let last_dumped = self.inner.last_dumped_update.load(Ordering::SeqCst);
            let threshold = time::to_micros(last_update)
                .saturating_sub(config.dump.min_interval().as_micros() as u64);
            if last_dumped > threshold {
                debug!(
                    cache = %self.inner.name,
                    "cache dump skipped, the dump interval has not passed yet"
                );
                return false;
            }
        }

        // Prevent concurrent cache dumps from accumulating and slowing
        // everything down.
        if state
            .dump_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            info!(
                cache = %self.inner.name,
                "cache dump skipped, a previous dump operation is in progress"
            );
            return false;
        }

        true
    }

    async fn dump_async_if_needed(
        &self,
        dump_type: DumpType,
        state: &mut UpdateState,
        config: &CacheConfig,
    ) {
        if !self.should_dump(dump_type, state, config) {
            return;
        }

        let last_dumped = self.inner.last_dumped_update.load(Ordering::SeqCst);
        if time::to_micros_opt(state.last_modifying_update) <= last_dumped {
            // Nothing has changed since the last committed record;
            // renaming it to the new update time is enough.
            debug!(
                cache = %self.inner.name,
                "cache contents unchanged since the last dump, bumping the record time"
            );
            self.dump_async(DumpOperation::BumpTime, state).await;
        } else {
            self.dump_async(DumpOperation::NewDump, state).await;
        }
    }

    async fn dump_async(
        &self,
        operation: DumpOperation,
        state: &mut UpdateState,
    ) {
        debug_assert!(
            state
                .dump_task
                .as_ref()
                .map_or(true, DumpTaskHandle::is_finished),
            "another cache dump task is already running"
        );

        if let Some(previous) = state.dump_task.take() {
            if let Err(e) = previous.join().await {
                error!(
                    cache = %self.inner.name,
                    error = %e,
                    "unexpected error from the previous cache dump"
                );
            }
        }

        // Records are stamped with the update time they are current as of.
        let Some(new_update_time) = state.last_update else {
            debug!(
                cache = %self.inner.name,
                "cache dump skipped, the cache has not loaded yet"
            );
            return;
        };
        let old_update_time =
            time::from_micros_opt(self.inner.last_dumped_update.load(Ordering::SeqCst));

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine
                .run_dump_task(operation, old_update_time, new_update_time, cancel_rx)
                .await
        });
        state.dump_task = Some(DumpTaskHandle::new(handle, cancel_tx));
    }

    /// Dump task body; runs off the update path on the runtime's
    /// filesystem-bound workers.
    async fn run_dump_task(
        self,
        operation: DumpOperation,
        old_update_time: Option<SystemTime>,
        new_update_time: SystemTime,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> bool {
        let span = info_span!("serialize-dump", cache = %self.inner.name);
        let work = async {
            match operation {
                DumpOperation::NewDump => self.do_dump(new_update_time).await,
                DumpOperation::BumpTime => match old_update_time {
                    Some(old) => self.inner.store.bump(old, new_update_time).await,
                    None => false,
                },
            }
        }
        .instrument(span);

        let cancelled = async move {
            let was_cancelled = cancel_rx.wait_for(|cancelled| *cancelled).await.is_ok();
            if !was_cancelled {
                // The engine dropped the handle without cancelling
                std::future::pending::<()>().await;
            }
        };

        let success = tokio::select! {
            success = work => success,
            _ = cancelled => {
                warn!(cache = %self.inner.name, "cache dump task cancelled");
                return false;
            }
        };

        if success {
            self.inner
                .last_dumped_update
                .fetch_max(time::to_micros(new_update_time), Ordering::SeqCst);
        }
        success
    }

    async fn do_dump(
        &self,
        update_time: SystemTime,
    ) -> bool {
        let dump_start = Instant::now();
        let start_time = SystemTime::now();

        let size = match self.write_dump(update_time).await {
            Ok(size) => size,
            Err(Error::Dump(DumpError::EmptyCache)) => {
                // should_dump verified a successful update happened, but
                // the cache could have been cleared forcefully in between.
                warn!(cache = %self.inner.name, "could not dump cache, because it is empty");
                return false;
            }
            Err(e) => {
                error!(
                    cache = %self.inner.name,
                    error = %e,
                    "error while serializing a cache dump"
                );
                return false;
            }
        };

        if let Err(e) = self.inner.store.cleanup().await {
            error!(
                cache = %self.inner.name,
                error = %e,
                "error while cleaning up old cache dumps"
            );
        }

        let dump = &self.inner.statistics.dump;
        dump.last_written_size.store(size, Ordering::Relaxed);
        dump.last_nontrivial_write_duration_ms
            .store(dump_start.elapsed().as_millis() as u64, Ordering::Relaxed);
        dump.last_nontrivial_write_start_time
            .store(time::to_micros(start_time), Ordering::Relaxed);
        true
    }

    async fn write_dump(
        &self,
        update_time: SystemTime,
    ) -> Result<u64> {
        let record = self.inner.store.register_new(update_time).await?;
        let mut writer = self.inner.codec.create_writer(&record.path).await?;
        self.inner.cache.write_to(writer.as_mut()).await?;
        writer.finish().await?;
        let metadata = tokio::fs::metadata(&record.path)
            .await
            .map_err(DumpError::Io)?;
        Ok(metadata.len())
    }

    /// Restores cache contents from the latest dump record, if any.
    /// Failures are logged and mapped to "no dump available".
    async fn load_from_dump(&self) -> bool {
        let mut state = self.inner.update.lock().await;
        let config = self.inner.config.read();
        let load_start = Instant::now();

        if !config.dump.enabled {
            debug!(cache = %self.inner.name, "dump load skipped, dumps are disabled");
            return false;
        }

        let span = info_span!("load-from-dump", cache = %self.inner.name);
        let update_time = match self.read_latest_dump().instrument(span).await {
            Ok(Some(update_time)) => update_time,
            Ok(None) => return false,
            Err(e) => {
                error!(
                    cache = %self.inner.name,
                    error = %e,
                    "error while loading a cache dump"
                );
                return false;
            }
        };

        info!(cache = %self.inner.name, "loaded a cache dump");
        state.last_update = Some(update_time);
        state.last_modifying_update = Some(update_time);
        self.inner
            .last_dumped_update
            .fetch_max(time::to_micros(update_time), Ordering::SeqCst);

        let dump = &self.inner.statistics.dump;
        dump.is_loaded.store(true, Ordering::Relaxed);
        dump.is_current_from_dump.store(true, Ordering::Relaxed);
        dump.load_duration_ms
            .store(load_start.elapsed().as_millis() as u64, Ordering::Relaxed);
        true
    }

    async fn read_latest_dump(&self) -> Result<Option<SystemTime>> {
        let Some(record) = self.inner.store.latest().await? else {
            return Ok(None);
        };
        let mut reader = self.inner.codec.create_reader(&record.path).await?;
        self.inner.cache.read_from(reader.as_mut()).await?;
        reader.finish().await?;
        Ok(Some(record.update_time))
    }

    /// Cleanup tick: drops retired config snapshots and runs the user
    /// maintenance capability.
    async fn do_cleanup(&self) -> Result<()> {
        self.inner.config.cleanup_stale_snapshots();
        self.inner.cache.cleanup().await;
        Ok(())
    }
}

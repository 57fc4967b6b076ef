//! Periodic-task bridge.
//!
//! Wraps a spawned tokio loop behind the start/stop/set-settings contract
//! the engine drives. Iterations run strictly sequentially; a slow
//! iteration delays the next tick instead of overlapping it.


use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::Result;

/// Scheduling flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFlags {
    /// Randomize the first delay so that caches constructed together do
    /// not tick together
    pub chaotic: bool,
    /// Iteration failures are reported at error level
    pub critical: bool,
    /// Run the first iteration immediately
    pub now: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSettings {
    pub period: Duration,
    pub jitter: Duration,
    pub flags: TaskFlags,
}

impl TaskSettings {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            jitter: Duration::ZERO,
            flags: TaskFlags::default(),
        }
    }

    pub fn with_jitter(
        mut self,
        jitter: Duration,
    ) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_flags(
        mut self,
        flags: TaskFlags,
    ) -> Self {
        self.flags = flags;
        self
    }

    /// Delay before the first iteration
    fn first_delay(&self) -> Duration {
        if self.flags.now {
            return Duration::ZERO;
        }
        if self.flags.chaotic {
            let period_ms = self.period.as_millis().max(1) as u64;
            let delay_ms = rand::thread_rng().gen_range(period_ms / 2..=period_ms);
            return Duration::from_millis(delay_ms);
        }
        self.next_delay()
    }

    /// Period with uniform jitter applied
    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.period;
        }
        let jitter_ms = self.jitter.as_millis() as u64;
        let offset_ms = rand::thread_rng().gen_range(0..=jitter_ms * 2);
        let base = self.period.saturating_sub(self.jitter);
        base + Duration::from_millis(offset_ms)
    }
}

struct RunningTask {
    handle: JoinHandle<()>,
    stop_tx: watch::Sender<bool>,
    settings_tx: watch::Sender<TaskSettings>,
}

/// A named periodic task. Inert until `start`; restartable after `stop`.
#[derive(Debug)]
pub struct PeriodicTask {
    name: String,
    running: Mutex<Option<RunningTask>>,
}

impl std::fmt::Debug for RunningTask {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RunningTask").finish_non_exhaustive()
    }
}

impl PeriodicTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: Mutex::new(None),
        }
    }

    /// Spawns the periodic loop. A second `start` without an intervening
    /// `stop` is a programmer error and is ignored with an error log.
    pub fn start<F, Fut>(
        &self,
        settings: TaskSettings,
        callback: F,
    ) where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut running = self.running.lock().expect("periodic task lock poisoned");
        if running.is_some() {
            error!(task = %self.name, "periodic task is already running");
            debug_assert!(false, "PeriodicTask::start called twice");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let (settings_tx, settings_rx) = watch::channel(settings);
        let name = self.name.clone();
        let handle = tokio::spawn(run_loop(name, settings_rx, stop_rx, callback));

        *running = Some(RunningTask {
            handle,
            stop_tx,
            settings_tx,
        });
    }

    /// Signals the loop to stop and waits for the in-flight iteration, if
    /// any, to complete. No-op when not running.
    pub async fn stop(&self) {
        let task = {
            let mut running = self.running.lock().expect("periodic task lock poisoned");
            running.take()
        };
        let Some(task) = task else {
            return;
        };

        let _ = task.stop_tx.send(true);
        if let Err(e) = task.handle.await {
            error!(task = %self.name, error = %e, "periodic task did not shut down cleanly");
        }
    }

    /// Publishes new settings; the loop picks them up for the next wait.
    /// The in-flight wait keeps its old settings snapshot.
    pub fn set_settings(
        &self,
        settings: TaskSettings,
    ) {
        let running = self.running.lock().expect("periodic task lock poisoned");
        if let Some(task) = running.as_ref() {
            let _ = task.settings_tx.send(settings);
        } else {
            debug!(task = %self.name, "settings update for a stopped periodic task");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("periodic task lock poisoned")
            .is_some()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            if let Some(task) = running.take() {
                // Engines stop their tasks before dropping; aborting here
                // keeps a leaked task from ticking forever.
                let _ = task.stop_tx.send(true);
                task.handle.abort();
            }
        }
    }
}

async fn run_loop<F, Fut>(
    name: String,
    mut settings_rx: watch::Receiver<TaskSettings>,
    mut stop_rx: watch::Receiver<bool>,
    callback: F,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut first = true;
    loop {
        let settings = settings_rx.borrow_and_update().clone();
        let delay = if first {
            settings.first_delay()
        } else {
            settings.next_delay()
        };
        first = false;

        tokio::select! {
            _ = stop_rx.changed() => {
                debug!(task = %name, "periodic task stopped");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if let Err(e) = callback().await {
            if settings.flags.critical {
                error!(task = %name, error = %e, "periodic task iteration failed");
            } else {
                warn!(task = %name, error = %e, "periodic task iteration failed");
            }
        }

        if *stop_rx.borrow() {
            debug!(task = %name, "periodic task stopped");
            return;
        }
    }
}

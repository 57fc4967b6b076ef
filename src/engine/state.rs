use std::time::SystemTime;

use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Mutable per-cache bookkeeping, protected by the engine's update mutex.
///
/// Invariants: `last_modifying_update <= last_update`; while `last_update`
/// is `None` no dump may be written; while `dump_task` holds an unfinished
/// handle no new dump task may be started.
#[derive(Debug, Default)]
pub(crate) struct UpdateState {
    /// Wall-clock moment of the most recent successful update
    pub(crate) last_update: Option<SystemTime>,
    /// Wall-clock moment of the most recent update that changed contents
    pub(crate) last_modifying_update: Option<SystemTime>,
    /// Monotonic moment of the most recent successful full update
    pub(crate) last_full_update: Option<Instant>,
    /// At-most-one in-flight dump task
    pub(crate) dump_task: Option<DumpTaskHandle>,
}

/// Handle of a background dump task. Cancellation is cooperative: the task
/// observes the request at its next suspension point.
#[derive(Debug)]
pub(crate) struct DumpTaskHandle {
    handle: JoinHandle<bool>,
    cancel_tx: watch::Sender<bool>,
}

impl DumpTaskHandle {
    pub(crate) fn new(
        handle: JoinHandle<bool>,
        cancel_tx: watch::Sender<bool>,
    ) -> Self {
        Self { handle, cancel_tx }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn request_cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Awaits the task and consumes its result. An `Err` means the task
    /// panicked or was aborted, never a dump failure (those return false).
    pub(crate) async fn join(self) -> Result<bool, JoinError> {
        self.handle.await
    }
}

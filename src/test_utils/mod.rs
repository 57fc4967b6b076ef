//! Shared components for the engine's unit tests: a configurable cache
//! backed by an in-memory document list, and logger setup.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::Cache;
use crate::DumpError;
use crate::DumpReader;
use crate::DumpWriter;
use crate::Error;
use crate::Result;
use crate::UpdateContext;
use crate::UpdateType;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

#[derive(Debug, Default)]
struct TestCacheState {
    documents: Vec<String>,
    /// Pending documents applied by the next update
    source: Vec<String>,
    updates: Vec<UpdateType>,
    read_from_dump_count: u32,
    fail_updates: bool,
    modify_on_update: bool,
    empty_dump: bool,
    dump_delay: Option<Duration>,
}

/// A cache of plain string documents with injectable behavior: update
/// failures, modification signalling, empty dumps and slow dump writes.
#[derive(Debug, Default)]
pub struct TestCache {
    state: Mutex<TestCacheState>,
}

impl TestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages documents the next update pulls in, marking it modifying.
    pub fn stage_documents(
        &self,
        documents: Vec<String>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.source = documents;
    }

    pub fn set_fail_updates(
        &self,
        fail: bool,
    ) {
        self.state.lock().unwrap().fail_updates = fail;
    }

    /// Every update reports modified contents even without staged
    /// documents.
    pub fn set_modify_on_update(
        &self,
        modify: bool,
    ) {
        self.state.lock().unwrap().modify_on_update = modify;
    }

    pub fn set_empty_dump(
        &self,
        empty: bool,
    ) {
        self.state.lock().unwrap().empty_dump = empty;
    }

    pub fn set_dump_delay(
        &self,
        delay: Duration,
    ) {
        self.state.lock().unwrap().dump_delay = Some(delay);
    }

    pub fn documents(&self) -> Vec<String> {
        self.state.lock().unwrap().documents.clone()
    }

    pub fn updates(&self) -> Vec<UpdateType> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn read_from_dump_count(&self) -> u32 {
        self.state.lock().unwrap().read_from_dump_count
    }
}

#[async_trait]
impl Cache for TestCache {
    async fn update(
        &self,
        ctx: &mut UpdateContext<'_>,
    ) -> Result<()> {
        let documents_count = {
            let mut state = self.state.lock().unwrap();
            state.updates.push(ctx.update_type);
            if state.fail_updates {
                return Err(Error::update("authoritative source unavailable"));
            }

            let staged = std::mem::take(&mut state.source);
            let modified = !staged.is_empty() || state.modify_on_update;
            if ctx.update_type == UpdateType::Full {
                state.documents = staged;
            } else {
                state.documents.extend(staged);
            }
            if modified {
                ctx.on_cache_modified();
            }
            state.documents.len() as u64
        };

        ctx.stats().increase_documents_read_count(documents_count);
        ctx.stats().finish(documents_count);
        Ok(())
    }

    async fn write_to(
        &self,
        writer: &mut dyn DumpWriter,
    ) -> Result<()> {
        let (documents, delay) = {
            let state = self.state.lock().unwrap();
            if state.empty_dump {
                return Err(DumpError::EmptyCache.into());
            }
            (state.documents.clone(), state.dump_delay)
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }

        writer.write(documents.join("\n").as_bytes()).await
    }

    async fn read_from(
        &self,
        reader: &mut dyn DumpReader,
    ) -> Result<()> {
        let data = reader.read_to_end().await?;
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| DumpError::Codec(format!("dump is not valid utf-8: {e}")))?;

        let mut state = self.state.lock().unwrap();
        state.documents = if text.is_empty() {
            Vec::new()
        } else {
            text.lines().map(str::to_owned).collect()
        };
        state.read_from_dump_count += 1;
        Ok(())
    }
}

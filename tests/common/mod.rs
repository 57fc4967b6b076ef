//! Shared fixtures for the end-to-end scenarios: a key-value cache built
//! purely on the public API, refreshed from a mutable in-memory source.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use recache::Cache;
use recache::DumpError;
use recache::DumpReader;
use recache::DumpWriter;
use recache::Result;
use recache::UpdateContext;
use recache::UpdateType;

static LOGGER_INIT: once_cell::sync::Lazy<()> = once_cell::sync::Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    *LOGGER_INIT;
}

#[derive(Debug, Default)]
struct Inner {
    /// The authoritative source; entries not yet pulled into the cache
    pending: BTreeMap<String, String>,
    entries: BTreeMap<String, String>,
    updates: Vec<UpdateType>,
}

/// A cache of key-value pairs. Updates drain the staged source entries;
/// an update with nothing staged reports unchanged contents.
#[derive(Debug, Default)]
pub struct KvCache {
    inner: Mutex<Inner>,
}

impl KvCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(
        &self,
        key: &str,
        value: &str,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.pending.insert(key.to_owned(), value.to_owned());
    }

    pub fn entries(&self) -> BTreeMap<String, String> {
        self.inner.lock().unwrap().entries.clone()
    }

    pub fn updates(&self) -> Vec<UpdateType> {
        self.inner.lock().unwrap().updates.clone()
    }
}

#[async_trait]
impl Cache for KvCache {
    async fn update(
        &self,
        ctx: &mut UpdateContext<'_>,
    ) -> Result<()> {
        let count = {
            let mut inner = self.inner.lock().unwrap();
            inner.updates.push(ctx.update_type);

            let staged = std::mem::take(&mut inner.pending);
            let read = staged.len() as u64;
            let refreshed = if ctx.update_type == UpdateType::Full {
                staged
            } else {
                let mut merged = inner.entries.clone();
                merged.extend(staged);
                merged
            };
            if refreshed != inner.entries {
                inner.entries = refreshed;
                ctx.on_cache_modified();
            }
            ctx.stats().increase_documents_read_count(read);
            inner.entries.len() as u64
        };
        ctx.stats().finish(count);
        Ok(())
    }

    async fn write_to(
        &self,
        writer: &mut dyn DumpWriter,
    ) -> Result<()> {
        let entries = self.inner.lock().unwrap().entries.clone();
        if entries.is_empty() {
            return Err(DumpError::EmptyCache.into());
        }
        for (key, value) in entries {
            writer.write(format!("{key}\t{value}\n").as_bytes()).await?;
        }
        Ok(())
    }

    async fn read_from(
        &self,
        reader: &mut dyn DumpReader,
    ) -> Result<()> {
        let data = reader.read_to_end().await?;
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| DumpError::Codec(format!("dump is not valid utf-8: {e}")))?;

        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let (key, value) = line
                .split_once('\t')
                .ok_or_else(|| DumpError::Codec(format!("malformed dump line: {line:?}")))?;
            entries.insert(key.to_owned(), value.to_owned());
        }

        self.inner.lock().unwrap().entries = entries;
        Ok(())
    }
}

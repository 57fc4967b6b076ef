//! Process-wide registry of running cache engines.
//!
//! Test harnesses use it to disable periodic updates and drive refreshes
//! and dump writes synchronously; engines register themselves on start in
//! component construction order and deregister on stop.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;

use crate::CacheEngine;
use crate::LifecycleError;
use crate::Result;
use crate::UpdateType;

pub struct CacheControl {
    periodic_updates_enabled: AtomicBool,
    caches: DashMap<String, CacheEngine>,
}

impl CacheControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            periodic_updates_enabled: AtomicBool::new(true),
            caches: DashMap::new(),
        })
    }

    /// With periodic updates disabled, engines skip arming their periodic
    /// tasks and a harness drives ticks through [`CacheControl::invalidate`].
    /// Takes effect for engines constructed after the call.
    pub fn set_periodic_updates_enabled(
        &self,
        enabled: bool,
    ) {
        self.periodic_updates_enabled.store(enabled, Ordering::SeqCst);
    }

    pub(crate) fn periodic_updates_enabled(&self) -> bool {
        self.periodic_updates_enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn register(
        &self,
        engine: &CacheEngine,
    ) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.caches.entry(engine.name().to_string()) {
            Entry::Occupied(_) => {
                Err(LifecycleError::DuplicateName(engine.name().to_string()).into())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(engine.clone());
                Ok(())
            }
        }
    }

    pub(crate) fn deregister(
        &self,
        name: &str,
    ) {
        self.caches.remove(name);
    }

    fn find(
        &self,
        name: &str,
    ) -> Result<CacheEngine> {
        self.caches
            .get(name)
            .map(|engine| engine.clone())
            .ok_or_else(|| LifecycleError::NotStarted(name.to_string()).into())
    }

    /// Forces a synchronous update of one cache.
    pub async fn invalidate(
        &self,
        name: &str,
        update_type: UpdateType,
    ) -> Result<()> {
        self.find(name)?.update(update_type).await
    }

    /// Forces a synchronous update of every registered cache, in name
    /// order.
    pub async fn invalidate_all(
        &self,
        update_type: UpdateType,
    ) -> Result<()> {
        let mut engines: Vec<CacheEngine> = self
            .caches
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        engines.sort_by(|a, b| a.name().cmp(b.name()));

        for engine in engines {
            engine.update(update_type).await?;
        }
        Ok(())
    }

    /// Forces a dump of one cache and waits for it to land on disk.
    pub async fn write_cache_dumps(
        &self,
        name: &str,
    ) -> Result<()> {
        self.find(name)?.dump_sync_debug().await;
        Ok(())
    }
}

//! # recache
//!
//! A periodic cache refresh engine with warm-restart dumps.
//!
//! Each cache is a user-defined in-memory structure rebuilt from an
//! external authoritative source. The engine schedules full and
//! incremental refreshes, persists snapshots to disk so that restarts
//! begin with warm state, reloads those snapshots at startup, surfaces
//! statistics, and coordinates cleanly with component start/stop and test
//! harnesses.
//!
//! ## Features
//! - **Refresh policies**: full-only, incremental-only, or incremental
//!   with periodic promotion to full
//! - **Warm restarts**: dump records are loaded before the first update
//! - **Cheap dumps**: unchanged contents bump the existing record instead
//!   of rewriting it
//! - **Observability**: per-cache statistics with a Prometheus exporter
//! - **Hot reload**: the dynamic subset of tunables applies without
//!   restarts
//!
//! ## Quick Start
//! ```no_run
//! use std::sync::Arc;
//!
//! use recache::AllowedUpdateTypes;
//! use recache::Cache;
//! use recache::CacheConfig;
//! use recache::CacheControl;
//! use recache::CacheEngine;
//! use recache::Result;
//! use recache::StartFlags;
//! use recache::UpdateContext;
//!
//! struct UserIndex;
//!
//! #[async_trait::async_trait]
//! impl Cache for UserIndex {
//!     async fn update(&self, ctx: &mut UpdateContext<'_>) -> Result<()> {
//!         // refresh from the authoritative source ...
//!         ctx.on_cache_modified();
//!         ctx.stats().finish(1);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let control = CacheControl::new();
//!     let config = CacheConfig {
//!         allowed_update_types: AllowedUpdateTypes::OnlyFull,
//!         ..Default::default()
//!     };
//!     let engine = CacheEngine::new("user-index", config, Arc::new(UserIndex), control)?;
//!     engine.start(StartFlags::default()).await?;
//!     // ... serve traffic ...
//!     engine.stop().await;
//!     Ok(())
//! }
//! ```

mod cache;
mod control;
mod dump;
mod engine;
mod errors;
mod scheduler;

pub mod config;
pub mod metrics;

pub use cache::*;
pub use config::*;
pub use control::*;
pub use dump::*;
pub use engine::*;
pub use errors::*;
pub use metrics::*;
pub use scheduler::*;

mod utils;

//-----------------------------------------------------------
// Test utils
#[cfg(test)]
#[doc(hidden)]
pub mod test_utils;

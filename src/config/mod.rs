//! Configuration management for the cache refresh engine.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Runtime patching of the dynamic subset
mod cache;
mod view;
pub use cache::*;
pub use view::*;

#[cfg(test)]
mod cache_test;
#[cfg(test)]
mod view_test;

//---
use std::env;

use config::Config;
use config::Environment;
use config::File;

use crate::Result;

impl CacheConfig {
    /// Creates a new configuration with hierarchical override support.
    ///
    /// Configuration sources are merged in the following order (later
    /// sources override earlier ones):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable
    /// 3. Environment variables with `RECACHE__` prefix (highest priority)
    ///
    /// # Example
    /// ```ignore
    /// // Load with default values only
    /// let cfg = CacheConfig::new()?;
    ///
    /// // Load with config file and environment variables
    /// std::env::set_var("CONFIG_PATH", "config/cache.toml");
    /// std::env::set_var("RECACHE__UPDATE_INTERVAL_IN_MS", "60000");
    /// let cfg = CacheConfig::new()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path));
        }

        builder = builder.add_source(
            Environment::with_prefix("RECACHE")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

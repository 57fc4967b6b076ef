use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Which refresh strategies the periodic tick may choose from.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AllowedUpdateTypes {
    /// Every update rebuilds the cache from scratch
    OnlyFull,
    /// Every update applies only the changes since the last one
    OnlyIncremental,
    /// Incremental updates, promoted to full once `full_update_interval`
    /// has elapsed since the last full update
    #[default]
    FullAndIncremental,
}

/// Policy for the synchronous update performed at engine start.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FirstUpdateMode {
    /// Start fails unless the first update succeeds
    #[default]
    Required,
    /// Dump contents are good enough if the first update fails
    BestEffort,
    /// No synchronous first update when a dump was loaded
    Skip,
}

/// Dump persistence settings. `dir` and `max_count` are static; the rest is
/// part of the dynamic subset.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DumpConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory holding this cache's dump records. One engine instance per
    /// directory; concurrent processes sharing it are undefined.
    #[serde(default)]
    pub dir: String,

    /// Lower bound between consecutive on-disk dumps on the
    /// interval-honoring path
    #[serde(default)]
    pub min_interval_in_ms: u64,

    /// How many newest dump records `cleanup` retains
    #[serde(default = "default_max_dump_count")]
    pub max_count: usize,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: String::new(),
            min_interval_in_ms: 0,
            max_count: default_max_dump_count(),
        }
    }
}

impl DumpConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_in_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.enabled && self.dir.is_empty() {
            return Err(Error::InvalidConfig(
                "dump.dir must be set when dump.enabled is true".into(),
            ));
        }

        if self.enabled && self.max_count == 0 {
            return Err(Error::InvalidConfig(
                "dump.max_count must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

fn default_max_dump_count() -> usize {
    1
}

/// Per-cache tunables. Everything except `allow_first_update_failure`,
/// `dump.dir` and `dump.max_count` belongs to the dynamic subset and may be
/// replaced at runtime through [`CacheConfigPatch`].
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    /// Periodic refresh interval
    #[serde(default = "default_update_interval")]
    pub update_interval_in_ms: u64,

    /// Uniform jitter applied around each tick; defaults to a tenth of the
    /// update interval when absent
    #[serde(default)]
    pub update_jitter_in_ms: Option<u64>,

    /// With `FullAndIncremental`, threshold past which an incremental
    /// update is promoted to a full one
    #[serde(default)]
    pub full_update_interval_in_ms: u64,

    #[serde(default)]
    pub allowed_update_types: AllowedUpdateTypes,

    #[serde(default)]
    pub first_update_mode: FirstUpdateMode,

    /// Static only: tolerate a failed first update and continue with an
    /// empty cache
    #[serde(default)]
    pub allow_first_update_failure: bool,

    /// After loading a dump with `OnlyIncremental`, schedule one immediate
    /// full update to wash out potentially corrupted dump contents
    #[serde(default = "default_force_full_second_update")]
    pub force_full_second_update: bool,

    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_in_ms: u64,

    #[serde(default)]
    pub dump: DumpConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            update_interval_in_ms: default_update_interval(),
            update_jitter_in_ms: None,
            full_update_interval_in_ms: 0,
            allowed_update_types: AllowedUpdateTypes::default(),
            first_update_mode: FirstUpdateMode::default(),
            allow_first_update_failure: false,
            force_full_second_update: default_force_full_second_update(),
            cleanup_interval_in_ms: default_cleanup_interval(),
            dump: DumpConfig::default(),
        }
    }
}

fn default_update_interval() -> u64 {
    5_000
}
fn default_force_full_second_update() -> bool {
    true
}
// in ms
fn default_cleanup_interval() -> u64 {
    10_000
}

impl CacheConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_in_ms)
    }

    /// Configured jitter, or a tenth of the update interval
    pub fn update_jitter(&self) -> Duration {
        match self.update_jitter_in_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.update_interval() / 10,
        }
    }

    pub fn full_update_interval(&self) -> Duration {
        Duration::from_millis(self.full_update_interval_in_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_in_ms)
    }

    /// Validates tunable combinations
    pub fn validate(&self) -> Result<()> {
        if self.update_interval_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "update_interval_in_ms cannot be 0".into(),
            ));
        }

        if self.allowed_update_types == AllowedUpdateTypes::FullAndIncremental
            && self.full_update_interval_in_ms == 0
        {
            return Err(Error::InvalidConfig(
                "full_update_interval_in_ms must be set for full-and-incremental".into(),
            ));
        }

        if self.cleanup_interval_in_ms == 0 {
            return Err(Error::InvalidConfig(
                "cleanup_interval_in_ms cannot be 0".into(),
            ));
        }

        self.dump.validate()?;

        Ok(())
    }

    /// Produces the effective config for a dynamic patch, leaving the
    /// static-only fields untouched.
    pub fn merge_with(&self, patch: &CacheConfigPatch) -> CacheConfig {
        let mut merged = self.clone();
        if let Some(v) = patch.update_interval_in_ms {
            merged.update_interval_in_ms = v;
        }
        if let Some(v) = patch.update_jitter_in_ms {
            merged.update_jitter_in_ms = Some(v);
        }
        if let Some(v) = patch.full_update_interval_in_ms {
            merged.full_update_interval_in_ms = v;
        }
        if let Some(v) = patch.allowed_update_types {
            merged.allowed_update_types = v;
        }
        if let Some(v) = patch.first_update_mode {
            merged.first_update_mode = v;
        }
        if let Some(v) = patch.force_full_second_update {
            merged.force_full_second_update = v;
        }
        if let Some(v) = patch.cleanup_interval_in_ms {
            merged.cleanup_interval_in_ms = v;
        }
        if let Some(v) = patch.dumps_enabled {
            merged.dump.enabled = v;
        }
        if let Some(v) = patch.min_dump_interval_in_ms {
            merged.dump.min_interval_in_ms = v;
        }
        merged
    }
}

/// Dynamic subset published by the external configuration source. Absent
/// fields keep their static values.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CacheConfigPatch {
    pub update_interval_in_ms: Option<u64>,
    pub update_jitter_in_ms: Option<u64>,
    pub full_update_interval_in_ms: Option<u64>,
    pub allowed_update_types: Option<AllowedUpdateTypes>,
    pub first_update_mode: Option<FirstUpdateMode>,
    pub force_full_second_update: Option<bool>,
    pub cleanup_interval_in_ms: Option<u64>,
    pub dumps_enabled: Option<bool>,
    pub min_dump_interval_in_ms: Option<u64>,
}

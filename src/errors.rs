//! Cache Refresh Engine Error Hierarchy
//!
//! Defines error types for the refresh/dump engine, categorized by
//! operational concern: configuration, user updates, dump persistence and
//! lifecycle misuse.

use std::path::PathBuf;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Semantic configuration validation failures
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failures raised by the user update capability
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// Failures while persisting or restoring cache dumps
    #[error(transparent)]
    Dump(#[from] DumpError),

    /// Engine lifecycle misuse
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

impl Error {
    /// Wraps an arbitrary user error raised from the update capability.
    pub fn update<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Update(UpdateError::Failed(source.into()))
    }
}

/// Failures of the authoritative-source refresh performed by the user cache.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Cache update failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The external source returned data the cache could not interpret
    #[error("Cache update failed to parse source data: {0}")]
    Parse(String),
}

/// Failures of dump serialization, restoration and directory maintenance.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// Raised by the user `write_to` capability when the cache holds no
    /// documents despite a successful update. The dump is aborted
    /// gracefully and the engine continues.
    #[error("Cache is empty")]
    EmptyCache,

    /// Dumps are enabled for the cache, but the cache provides neither
    /// `write_to` nor `read_from`.
    #[error("Cache dump is enabled but unimplemented; provide write_to and read_from")]
    Unimplemented,

    #[error("Dump I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Filesystem failure bound to a concrete dump path
    #[error("Dump path error at {path}: {source}")]
    Path {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// User serialization or deserialization failure
    #[error("Dump codec error: {0}")]
    Codec(String),

    /// A writer was dropped or reused after `finish`
    #[error("Dump writer already finished")]
    WriterFinished,
}

/// Programmer errors in engine lifecycle management. These are reported
/// through the assertion channel (`debug_assert!` plus an error log) and
/// surfaced as errors rather than crashing in production.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Cache '{0}' is already registered")]
    DuplicateName(String),

    #[error("Periodic updates of cache '{0}' have not been started")]
    NotStarted(String),
}

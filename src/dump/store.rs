use std::path::PathBuf;
use std::time::SystemTime;

use tokio::fs;
use tracing::debug;
use tracing::warn;

use crate::dump::DumpPathManager;
use crate::DumpError;
use crate::Result;

/// One finalized dump on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRecord {
    /// The `update_time` encoded in the file name
    pub update_time: SystemTime,
    /// Disambiguates records sharing `update_time`
    pub seq: u32,
    pub path: PathBuf,
}

/// Owns one cache's on-disk dump directory.
///
/// All operations are filesystem-bound and are only invoked from dump
/// tasks, never inline on an update tick. The directory is owned by a
/// single engine instance; concurrent processes touching it are undefined.
#[derive(Debug)]
pub struct DumpStore {
    paths: DumpPathManager,
    /// How many newest records `cleanup` retains
    max_count: usize,
}

impl DumpStore {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        max_count: usize,
    ) -> Self {
        Self {
            paths: DumpPathManager::new(base_dir.into()),
            max_count,
        }
    }

    /// The newest finalized record, ordered by (`update_time`, `seq`).
    pub async fn latest(&self) -> Result<Option<DumpRecord>> {
        let mut records = self.scan().await?;
        records.sort_by_key(|record| (record.update_time, record.seq));
        Ok(records.pop())
    }

    /// Allocates the path for a new record at `update_time`, creating the
    /// dump directory on first use. The file itself is written by the
    /// codec through a temporary sibling.
    pub async fn register_new(
        &self,
        update_time: SystemTime,
    ) -> Result<DumpRecord> {
        fs::create_dir_all(&self.paths.base_dir)
            .await
            .map_err(|source| DumpError::Path {
                path: self.paths.base_dir.clone(),
                source,
            })?;

        let seq = self
            .scan()
            .await?
            .into_iter()
            .filter(|record| record.update_time == update_time)
            .map(|record| record.seq + 1)
            .max()
            .unwrap_or(0);

        Ok(DumpRecord {
            update_time,
            seq,
            path: self.paths.dump_path(update_time, seq),
        })
    }

    /// Renames the record at `old_time` to a name at `new_time` without
    /// rewriting its bytes. The rename is atomic against concurrent
    /// `latest()` readers. Returns false when no record exists at
    /// `old_time` or the rename fails.
    pub async fn bump(
        &self,
        old_time: SystemTime,
        new_time: SystemTime,
    ) -> bool {
        let old = match self.scan().await {
            Ok(mut records) => {
                records.retain(|record| record.update_time == old_time);
                records.sort_by_key(|record| record.seq);
                records.pop()
            }
            Err(e) => {
                warn!(error = %e, "failed to scan dump directory for bump");
                return false;
            }
        };

        let Some(old) = old else {
            debug!(?old_time, "no dump record to bump");
            return false;
        };

        let new_path = self.paths.dump_path(new_time, 0);
        match fs::rename(&old.path, &new_path).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    from = %old.path.display(),
                    to = %new_path.display(),
                    error = %e,
                    "failed to bump dump record"
                );
                false
            }
        }
    }

    /// Prunes to the retention count and removes leftover temporary files
    /// from interrupted writes. Runs only from within a dump task, so any
    /// temporary file present here is an orphan.
    pub async fn cleanup(&self) -> Result<()> {
        self.remove_tmp_files().await?;

        let mut records = self.scan().await?;
        records.sort_by_key(|record| (record.update_time, record.seq));
        let prune_count = records.len().saturating_sub(self.max_count);
        for record in records.into_iter().take(prune_count) {
            debug!(path = %record.path.display(), "pruning old dump record");
            fs::remove_file(&record.path)
                .await
                .map_err(|source| DumpError::Path {
                    path: record.path,
                    source,
                })?;
        }
        Ok(())
    }

    /// Enumerates finalized records, skipping temporary and foreign files.
    async fn scan(&self) -> Result<Vec<DumpRecord>> {
        let mut entries = match fs::read_dir(&self.paths.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(DumpError::Path {
                    path: self.paths.base_dir.clone(),
                    source,
                }
                .into())
            }
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(DumpError::Io)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            match DumpPathManager::parse_dump_file_name(name) {
                Some((update_time, seq)) => records.push(DumpRecord {
                    update_time,
                    seq,
                    path: entry.path(),
                }),
                None => {
                    debug!(name, "skipping foreign file in dump directory");
                }
            }
        }
        Ok(records)
    }

    async fn remove_tmp_files(&self) -> Result<()> {
        let mut entries = match fs::read_dir(&self.paths.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(DumpError::Path {
                    path: self.paths.base_dir.clone(),
                    source,
                }
                .into())
            }
        };

        while let Some(entry) = entries.next_entry().await.map_err(DumpError::Io)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if DumpPathManager::is_tmp_file_name(name) {
                debug!(name, "removing orphaned temporary dump file");
                fs::remove_file(entry.path())
                    .await
                    .map_err(DumpError::Io)?;
            }
        }
        Ok(())
    }
}

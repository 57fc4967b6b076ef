//! The writer/reader pair the engine streams dumps through.
//!
//! The engine never interprets dump contents. The user cache serializes
//! itself into a [`DumpWriter`] and restores itself from a [`DumpReader`];
//! a [`DumpCodec`] factory binds both to a concrete byte transport. The
//! crate ships [`FileDumpCodec`], a buffered file transport with
//! atomic-rename finalization.

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use bytes::BytesMut;
use tokio::fs;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::io::BufWriter;

use crate::dump::DumpPathManager;
use crate::DumpError;
use crate::Result;

/// Streaming serialization target for one dump record.
///
/// The engine owns the writer's lifecycle: it creates one per record,
/// passes it to the cache's `write_to`, and calls `finish` itself once
/// serialization returns. Finishing twice is an error.
#[async_trait]
pub trait DumpWriter: Send {
    async fn write(
        &mut self,
        data: &[u8],
    ) -> Result<()>;

    /// Flushes and commits the record. A record that was never finished
    /// is never visible to readers.
    async fn finish(&mut self) -> Result<()>;
}

/// Streaming deserialization source for one dump record.
///
/// Mirrors [`DumpWriter`]: the engine creates the reader, hands it to the
/// cache's `read_from`, and calls `finish` itself afterwards.
#[async_trait]
pub trait DumpReader: Send {
    /// Next chunk of the record, or `None` at end of file.
    async fn read_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Convenience for caches that restore from a single buffer.
    async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut data = BytesMut::new();
        while let Some(chunk) = self.read_chunk().await? {
            data.extend_from_slice(&chunk);
        }
        Ok(data.freeze())
    }

    async fn finish(&mut self) -> Result<()>;
}

/// Abstract factory binding writers and readers to a byte transport.
#[async_trait]
pub trait DumpCodec: Send + Sync {
    async fn create_writer(
        &self,
        path: &Path,
    ) -> Result<Box<dyn DumpWriter>>;

    async fn create_reader(
        &self,
        path: &Path,
    ) -> Result<Box<dyn DumpReader>>;
}

/// Default file-backed codec. Writes go to a `.tmp` sibling and are
/// renamed into place on `finish`, so an interrupted write never leaves a
/// partial record visible to the store.
#[derive(Debug, Default)]
pub struct FileDumpCodec;

#[async_trait]
impl DumpCodec for FileDumpCodec {
    async fn create_writer(
        &self,
        path: &Path,
    ) -> Result<Box<dyn DumpWriter>> {
        let tmp_path = DumpPathManager::tmp_path(path);
        let file = File::create(&tmp_path)
            .await
            .map_err(|source| DumpError::Path {
                path: tmp_path.clone(),
                source,
            })?;
        Ok(Box::new(FileDumpWriter {
            inner: BufWriter::new(file),
            tmp_path,
            final_path: path.to_path_buf(),
            finished: false,
        }))
    }

    async fn create_reader(
        &self,
        path: &Path,
    ) -> Result<Box<dyn DumpReader>> {
        let file = File::open(path).await.map_err(|source| DumpError::Path {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(FileDumpReader {
            inner: BufReader::new(file),
        }))
    }
}

struct FileDumpWriter {
    inner: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    finished: bool,
}

#[async_trait]
impl DumpWriter for FileDumpWriter {
    async fn write(
        &mut self,
        data: &[u8],
    ) -> Result<()> {
        if self.finished {
            return Err(DumpError::WriterFinished.into());
        }
        self.inner.write_all(data).await.map_err(DumpError::Io)?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Err(DumpError::WriterFinished.into());
        }
        self.finished = true;

        self.inner.flush().await.map_err(DumpError::Io)?;
        self.inner.get_ref().sync_all().await.map_err(DumpError::Io)?;
        fs::rename(&self.tmp_path, &self.final_path)
            .await
            .map_err(|source| DumpError::Path {
                path: self.final_path.clone(),
                source,
            })?;
        Ok(())
    }
}

const READ_CHUNK_SIZE: usize = 64 * 1024;

struct FileDumpReader {
    inner: BufReader<File>,
}

#[async_trait]
impl DumpReader for FileDumpReader {
    async fn read_chunk(&mut self) -> Result<Option<Bytes>> {
        let mut buf = BytesMut::zeroed(READ_CHUNK_SIZE);
        let read = self.inner.read(&mut buf).await.map_err(DumpError::Io)?;
        if read == 0 {
            return Ok(None);
        }
        buf.truncate(read);
        Ok(Some(buf.freeze()))
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

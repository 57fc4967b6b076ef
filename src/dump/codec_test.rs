use tempfile::tempdir;
use tokio::fs;

use crate::DumpCodec;
use crate::DumpError;
use crate::Error;
use crate::FileDumpCodec;

#[tokio::test]
async fn test_write_finish_read_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("2024-08-02T00-00-00.000000-0");
    let codec = FileDumpCodec;

    let mut writer = codec.create_writer(&path).await.unwrap();
    writer.write(b"hello ").await.unwrap();
    writer.write(b"dumps").await.unwrap();
    writer.finish().await.unwrap();

    let mut reader = codec.create_reader(&path).await.unwrap();
    let data = reader.read_to_end().await.unwrap();
    reader.finish().await.unwrap();
    assert_eq!(&data[..], b"hello dumps");
}

#[tokio::test]
async fn test_unfinished_writer_leaves_no_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("2024-08-02T00-00-00.000000-0");
    let codec = FileDumpCodec;

    let mut writer = codec.create_writer(&path).await.unwrap();
    writer.write(b"partial").await.unwrap();
    drop(writer);

    assert!(!path.exists());
    // The temporary sibling remains for cleanup to collect
    let mut tmp_count = 0;
    let mut entries = fs::read_dir(dir.path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        assert!(entry.file_name().to_string_lossy().ends_with(".tmp"));
        tmp_count += 1;
    }
    assert_eq!(tmp_count, 1);
}

#[tokio::test]
async fn test_write_after_finish_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("2024-08-02T00-00-00.000000-0");
    let codec = FileDumpCodec;

    let mut writer = codec.create_writer(&path).await.unwrap();
    writer.finish().await.unwrap();

    assert!(matches!(
        writer.write(b"late").await,
        Err(Error::Dump(DumpError::WriterFinished))
    ));
    assert!(matches!(
        writer.finish().await,
        Err(Error::Dump(DumpError::WriterFinished))
    ));
}

#[tokio::test]
async fn test_reader_streams_in_chunks() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("2024-08-02T00-00-00.000000-0");
    let codec = FileDumpCodec;

    let payload = vec![7u8; 150 * 1024];
    let mut writer = codec.create_writer(&path).await.unwrap();
    writer.write(&payload).await.unwrap();
    writer.finish().await.unwrap();

    let mut reader = codec.create_reader(&path).await.unwrap();
    let mut total = 0;
    let mut chunks = 0;
    while let Some(chunk) = reader.read_chunk().await.unwrap() {
        total += chunk.len();
        chunks += 1;
    }
    assert_eq!(total, payload.len());
    assert!(chunks > 1);
}

#[tokio::test]
async fn test_reader_on_missing_record_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing");
    assert!(matches!(
        FileDumpCodec.create_reader(&path).await,
        Err(Error::Dump(DumpError::Path { .. }))
    ));
}

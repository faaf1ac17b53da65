use super::{BlobSink, BlobStore, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

/// Blob store backed by a single flat directory.
///
/// The root must already exist and be writable; see [`LocalBlobStore::ensure_root`].
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root (and parents) if it does not exist yet.
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidName { name: name.to_string() });
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn create(&self, name: &str) -> Result<Box<dyn BlobSink>, StorageError> {
        let path = self.blob_path(name)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::AlreadyExists => StorageError::AlreadyExists { name: name.to_string() },
                _ => StorageError::Io {
                    name: name.to_string(),
                    source,
                },
            })?;

        debug!(path = %path.display(), "Created blob");

        Ok(Box::new(LocalBlobSink {
            name: name.to_string(),
            writer: BufWriter::new(file),
            written: 0,
        }))
    }
}

struct LocalBlobSink {
    name: String,
    writer: BufWriter<File>,
    written: u64,
}

impl LocalBlobSink {
    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            name: self.name.clone(),
            source,
        }
    }
}

#[async_trait]
impl BlobSink for LocalBlobSink {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        if let Err(e) = self.writer.write_all(chunk).await {
            return Err(self.io_error(e));
        }
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<u64, StorageError> {
        let mut sink = self;
        if let Err(e) = sink.writer.flush().await {
            return Err(sink.io_error(e));
        }
        if let Err(e) = sink.writer.get_mut().sync_all().await {
            return Err(sink.io_error(e));
        }
        debug!(name = %sink.name, size_bytes = sink.written, "Finished blob");
        Ok(sink.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn put(store: &LocalBlobStore, name: &str, chunks: &[&[u8]]) -> Result<u64, StorageError> {
        let mut sink = store.create(name).await?;
        for chunk in chunks {
            sink.write(chunk).await?;
        }
        sink.finish().await
    }

    #[tokio::test]
    async fn test_write_blob_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let size = put(&store, "abc.bin", &[&[0x01, 0x02], &[0x03]]).await.unwrap();

        assert_eq!(size, 3);
        let stored = tokio::fs::read(dir.path().join("abc.bin")).await.unwrap();
        assert_eq!(stored, vec![0x01, 0x02, 0x03]);
    }

    #[tokio::test]
    async fn test_write_empty_blob() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let size = put(&store, "empty", &[]).await.unwrap();

        assert_eq!(size, 0);
        let meta = tokio::fs::metadata(dir.path().join("empty")).await.unwrap();
        assert_eq!(meta.len(), 0);
    }

    #[tokio::test]
    async fn test_large_blob_spans_buffer() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let chunks: Vec<&[u8]> = payload.chunks(7919).collect();
        let size = put(&store, "big", &chunks).await.unwrap();

        assert_eq!(size, payload.len() as u64);
        assert_eq!(tokio::fs::read(dir.path().join("big")).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_existing_blob_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());
        tokio::fs::write(dir.path().join("taken.png"), b"original").await.unwrap();

        let err = store.create("taken.png").await.err().unwrap();

        assert!(matches!(err, StorageError::AlreadyExists { .. }));
        assert_eq!(tokio::fs::read(dir.path().join("taken.png")).await.unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_missing_root_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("does-not-exist"));

        let err = store.create("a.png").await.err().unwrap();

        assert!(matches!(err, StorageError::Io { .. }));
    }

    #[tokio::test]
    async fn test_names_cannot_leave_root() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());

        for name in ["", ".", "..", "../escape", "nested/file", "back\\slash"] {
            let err = store.create(name).await.err().unwrap();
            assert!(matches!(err, StorageError::InvalidName { .. }), "{name:?} accepted");
        }
    }

    #[tokio::test]
    async fn test_ensure_root_creates_directory() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("public").join("images"));

        store.ensure_root().await.unwrap();

        assert!(store.root().is_dir());
        put(&store, "x.txt", &[b"hi"]).await.unwrap();
    }
}

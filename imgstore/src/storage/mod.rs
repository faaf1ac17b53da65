//! Blob storage for uploaded files.
//!
//! Storage is a write-only sink: the upload handler asks a [`BlobStore`] for a [`BlobSink`]
//! under a freshly generated name, pushes chunks into it as they arrive off the wire, and
//! finishes it. Nothing in the service reads or deletes blobs through this interface; stored
//! files are served back by a static file layer mounted on the router.
//!
//! - [`naming`]: storage name generation
//! - [`local`]: flat directory implementation

pub mod local;
pub mod naming;

use async_trait::async_trait;
use thiserror::Error as ThisError;

pub use local::LocalBlobStore;

/// A blob that has been completely written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Name of the blob in the store
    pub storage_name: String,
    /// Extension carried over from the client's file name, including the leading `.`
    pub extension: String,
    pub size_bytes: u64,
}

#[derive(ThisError, Debug)]
pub enum StorageError {
    /// A blob with this name already exists in the store
    #[error("blob {name} already exists")]
    AlreadyExists { name: String },

    /// The name would escape the flat storage root
    #[error("invalid blob name {name:?}")]
    InvalidName { name: String },

    /// Underlying I/O failure (disk full, permissions, missing root)
    #[error("storage I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A destination for blob bytes.
#[async_trait]
pub trait BlobStore: std::fmt::Debug + Send + Sync {
    /// Create a new, empty blob called `name`.
    ///
    /// Must fail with [`StorageError::AlreadyExists`] rather than replace an existing blob.
    async fn create(&self, name: &str) -> Result<Box<dyn BlobSink>, StorageError>;
}

/// An open blob being written.
#[async_trait]
pub trait BlobSink: Send {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError>;

    /// Flush everything written so far and return the blob's size in bytes.
    async fn finish(self: Box<Self>) -> Result<u64, StorageError>;
}

//! Test utilities for handler and router tests.

use crate::config::Config;
use crate::storage::{BlobSink, BlobStore, LocalBlobStore, StorageError};
use crate::{AppState, build_router};
use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn create_test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.storage.root = root.to_path_buf();
    config.storage.create_root = false;
    config
}

/// Test server storing uploads in `root`, with no delegated routes.
pub async fn create_test_app(root: &Path) -> TestServer {
    create_test_app_with_config(create_test_config(root)).await
}

pub async fn create_test_app_with_config(config: Config) -> TestServer {
    let store = Arc::new(LocalBlobStore::new(&config.storage.root));
    create_test_app_with_store(config, store).await
}

pub async fn create_test_app_with_store(config: Config, blob_store: Arc<dyn BlobStore>) -> TestServer {
    create_test_app_with_routes(config, blob_store, Router::new()).await
}

pub async fn create_test_app_with_routes(config: Config, blob_store: Arc<dyn BlobStore>, delegated: Router) -> TestServer {
    let state = AppState::builder().config(config).blob_store(blob_store).build();
    let router = build_router(&state, delegated).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

/// Names of all files in a storage root, sorted.
pub fn stored_files(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(root)
        .expect("Failed to read storage root")
        .map(|entry| entry.expect("Failed to read dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Blob store that fails in controlled ways.
#[derive(Debug)]
pub struct FailingBlobStore {
    mode: FailureMode,
    create_calls: AtomicUsize,
}

#[derive(Debug)]
enum FailureMode {
    /// `create` succeeds, every `write` fails
    OnWrite,
    /// The first `times` calls to `create` report a name collision, then writes go to `inner`
    Collide { times: usize, inner: LocalBlobStore },
}

impl FailingBlobStore {
    pub fn on_write() -> Self {
        Self {
            mode: FailureMode::OnWrite,
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn collide_times(times: usize, root: &Path) -> Self {
        Self {
            mode: FailureMode::Collide {
                times,
                inner: LocalBlobStore::new(root),
            },
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn create(&self, name: &str) -> Result<Box<dyn BlobSink>, StorageError> {
        let previous = self.create_calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            FailureMode::OnWrite => Ok(Box::new(BrokenSink { name: name.to_string() })),
            FailureMode::Collide { times, .. } if previous < *times => Err(StorageError::AlreadyExists { name: name.to_string() }),
            FailureMode::Collide { inner, .. } => inner.create(name).await,
        }
    }
}

struct BrokenSink {
    name: String,
}

#[async_trait]
impl BlobSink for BrokenSink {
    async fn write(&mut self, _chunk: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Io {
            name: self.name.clone(),
            source: std::io::Error::other("No space left on device"),
        })
    }

    async fn finish(self: Box<Self>) -> Result<u64, StorageError> {
        Ok(0)
    }
}

//! Storage gateway over an `opendal` operator.
//!
//! The gateway is built once at process start and cloned into every handler and transfer task.
//! `Operator` is cheap to clone and safe for concurrent use.

use std::io;

use bytes::Bytes;
use eyre::Result;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use opendal::layers::{RetryLayer, TimeoutLayer, TracingLayer};
use opendal::services::{Fs, Memory, Webhdfs, S3};
use opendal::{Builder, ErrorKind, Operator, Writer};
use serde::Deserialize;
use tracing::debug;

use crate::utils::{ensure_end_slash, join_path};

/// Chunk size used when reading source files.
const READ_CHUNK_SIZE: usize = 8 * 1024 * 1024;
/// Max number of concurrent stat calls issued while listing a directory.
const STAT_CONCURRENCY: usize = 16;

/// Live byte stream read from a storage file. Dropping it closes the file.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Storage backend options.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum StorageOpts {
    /// HDFS through its WebHDFS REST gateway.
    Webhdfs {
        /// Namenode http endpoint, e.g. `http://namenode:9870`.
        endpoint: String,
        #[serde(default = "default_root")]
        root: String,
        /// Delegation token, if the cluster requires one.
        #[serde(default)]
        delegation: Option<String>,
    },
    /// Local filesystem.
    Fs { root: String },
    /// S3 compatible object storage.
    S3 {
        url: String,
        region: String,
        bucket: String,
        #[serde(default = "default_root")]
        root: String,
    },
    /// Process-local memory. Contents are lost on exit.
    Memory,
}

fn default_root() -> String {
    "/".to_string()
}

/// One entry of a directory listing.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FileEntry {
    /// File name without directory.
    pub name: String,
    /// Full path of the entry, as `dir/name`.
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Build an operator from backend options.
///
/// # Errors
/// Returns error if the backend options are invalid.
pub fn build_operator(opts: &StorageOpts) -> Result<Operator> {
    match opts {
        StorageOpts::Webhdfs {
            endpoint,
            root,
            delegation,
        } => {
            let mut builder = Webhdfs::default().endpoint(endpoint).root(root);
            if let Some(delegation) = delegation {
                builder = builder.delegation(delegation);
            }
            finish(builder)
        }
        StorageOpts::Fs { root } => finish(Fs::default().root(root)),
        StorageOpts::S3 {
            url,
            region,
            bucket,
            root,
        } => finish(
            S3::default()
                .endpoint(url)
                .region(region)
                .bucket(bucket)
                .root(root),
        ),
        StorageOpts::Memory => finish(Memory::default()),
    }
}

fn finish(builder: impl Builder) -> Result<Operator> {
    Ok(Operator::new(builder)?
        .layer(RetryLayer::new())
        .layer(TimeoutLayer::new())
        .layer(TracingLayer)
        .finish())
}

/// Cluster namespace operations consumed by the bridge.
#[derive(Debug, Clone)]
pub struct StorageGateway {
    op: Operator,
}

impl StorageGateway {
    #[must_use]
    pub const fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Build a gateway from backend options.
    ///
    /// # Errors
    /// Returns error if the backend options are invalid.
    pub fn from_opts(opts: &StorageOpts) -> Result<Self> {
        Ok(Self::new(build_operator(opts)?))
    }

    #[must_use]
    pub const fn operator(&self) -> &Operator {
        &self.op
    }

    /// List direct children of `dir`, with file sizes.
    ///
    /// The listing is all or nothing: any failure, including a failure to stat one of the
    /// listed files, fails the whole call.
    ///
    /// # Errors
    /// Returns error if the directory can't be listed.
    pub async fn list_dir(&self, dir: &str) -> opendal::Result<Vec<FileEntry>> {
        let dir_path = ensure_end_slash(dir);
        let listed = self.op.list(&dir_path).await?;
        if listed.is_empty() {
            // Some backends report a missing directory as an empty one.
            self.op.stat(&dir_path).await?;
        }

        let children = listed
            .into_iter()
            .filter(|entry| entry.path().trim_matches('/') != dir_path.trim_matches('/'));
        let entries: Vec<FileEntry> = futures::stream::iter(children)
            .map(|entry| async move {
                let name = entry.name().trim_end_matches('/').to_string();
                let path = join_path(dir, &name);
                if entry.metadata().is_dir() {
                    return Ok(FileEntry {
                        name,
                        path,
                        size: 0,
                        is_dir: true,
                    });
                }
                // Listings don't carry content length on every backend.
                let size = self.op.stat(entry.path()).await?.content_length();
                Ok::<_, opendal::Error>(FileEntry {
                    name,
                    path,
                    size,
                    is_dir: false,
                })
            })
            .buffered(STAT_CONCURRENCY)
            .try_collect()
            .await?;

        debug!(dir, entries = entries.len(), "listed directory");
        Ok(entries)
    }

    /// Open a read stream on `path`.
    ///
    /// # Errors
    /// Returns error if the file can't be opened.
    pub async fn open_read(&self, path: &str) -> opendal::Result<ByteStream> {
        let reader = self.op.reader_with(path).chunk(READ_CHUNK_SIZE).await?;
        let stream = reader.into_bytes_stream(..).await?;
        Ok(stream.boxed())
    }

    /// Create `path` for writing, replacing any existing content.
    ///
    /// # Errors
    /// Returns error if the file can't be created.
    pub async fn open_write(&self, path: &str) -> opendal::Result<Writer> {
        self.op.writer(path).await
    }

    /// Create `dir` and all missing parents.
    ///
    /// # Errors
    /// Returns error if the directory can't be created.
    pub async fn mkdir_all(&self, dir: &str) -> opendal::Result<()> {
        match self.op.create_dir(&ensure_end_slash(dir)).await {
            // Flat namespaces have no directories to create.
            Err(e) if e.kind() == ErrorKind::Unsupported => Ok(()),
            res => res,
        }
    }
}

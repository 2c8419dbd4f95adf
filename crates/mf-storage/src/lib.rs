//! mf-storage: the media store.
//!
//! Blobs are written once through a [`BlobWriter`] (append during upload,
//! then [`BlobWriter::seal`]) and are read back by byte range afterwards.
//! A sealed blob never changes, so any number of concurrent range readers
//! is safe.

pub mod fs;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use mf_core::{BlobRef, Result};
use tokio::io::AsyncRead;

pub use fs::FsMediaStore;

/// A readable byte stream over part of a sealed blob.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Result of sealing a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlob {
    pub blob_ref: BlobRef,
    pub size: u64,
}

/// An in-progress blob. Dropping it without sealing leaves an orphaned
/// partial file that the store may clean up later; call [`abort`] instead.
///
/// [`abort`]: BlobWriter::abort
#[async_trait]
pub trait BlobWriter: Send {
    fn blob_ref(&self) -> &BlobRef;

    /// Bytes appended so far.
    fn written(&self) -> u64;

    async fn append(&mut self, chunk: &[u8]) -> Result<()>;

    /// Flush, make durable, and publish the blob under its reference.
    async fn seal(self: Box<Self>) -> Result<SealedBlob>;

    /// Discard everything written so far.
    async fn abort(self: Box<Self>) -> Result<()>;
}

/// Durable blob storage keyed by [`BlobRef`].
///
/// Missing blobs surface as `Error::NotFound`, other I/O failures as
/// `Error::StorageUnavailable`.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Start writing a new blob.
    async fn create(&self) -> Result<Box<dyn BlobWriter>>;

    /// Observed size of a sealed blob.
    async fn size(&self, blob: &BlobRef) -> Result<u64>;

    /// Stream `len` bytes starting at `start`.
    async fn open_range(&self, blob: &BlobRef, start: u64, len: u64) -> Result<BlobReader>;

    /// Read up to `len` bytes starting at `offset` into memory.
    async fn read_at(&self, blob: &BlobRef, offset: u64, len: usize) -> Result<Bytes>;

    /// Release a blob. Removing a blob that does not exist is not an error.
    async fn remove(&self, blob: &BlobRef) -> Result<()>;
}

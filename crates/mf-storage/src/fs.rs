//! Filesystem-backed media store.
//!
//! Layout under the root directory:
//!
//! ```text
//! <root>/.partial/<uuid>.part   blobs still being written
//! <root>/<aa>/<uuid>            sealed blobs, sharded by the first two hex digits
//! ```
//!
//! Sealing fsyncs the partial file and renames it into place, so a sealed
//! path only ever holds complete content.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use mf_core::{BlobRef, Error, Result};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

use crate::{BlobReader, BlobWriter, MediaStore, SealedBlob};

const PARTIAL_DIR: &str = ".partial";

/// Media store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(PARTIAL_DIR))
            .await
            .map_err(|e| Error::storage(format!("cannot create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a blob reference to its sealed path.
    ///
    /// References are store-generated UUIDs; anything else is rejected so a
    /// reference can never address a path outside the root.
    fn blob_path(&self, blob: &BlobRef) -> Result<PathBuf> {
        let uuid = Uuid::parse_str(blob.as_str())
            .map_err(|_| Error::not_found("blob", blob))?;
        let name = uuid.to_string();
        Ok(self.root.join(&name[..2]).join(name))
    }

    async fn open_sealed(&self, blob: &BlobRef) -> Result<(File, u64)> {
        let path = self.blob_path(blob)?;
        let file = File::open(&path).await.map_err(|e| map_io(blob, e))?;
        let size = file.metadata().await.map_err(|e| map_io(blob, e))?.len();
        Ok((file, size))
    }
}

fn map_io(blob: &BlobRef, e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::not_found("blob", blob)
    } else {
        Error::storage(format!("blob {blob}: {e}"))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn create(&self) -> Result<Box<dyn BlobWriter>> {
        let id = Uuid::new_v4().to_string();
        let blob_ref = BlobRef::new(id.clone());
        let partial = self.root.join(PARTIAL_DIR).join(format!("{id}.part"));
        let file = File::create(&partial)
            .await
            .map_err(|e| Error::storage(format!("cannot create {}: {e}", partial.display())))?;
        let sealed = self.blob_path(&blob_ref)?;

        tracing::debug!(blob = %blob_ref, "blob write started");
        Ok(Box::new(FsBlobWriter {
            blob_ref,
            file,
            partial,
            sealed,
            written: 0,
        }))
    }

    async fn size(&self, blob: &BlobRef) -> Result<u64> {
        let path = self.blob_path(blob)?;
        let meta = fs::metadata(&path).await.map_err(|e| map_io(blob, e))?;
        Ok(meta.len())
    }

    async fn open_range(&self, blob: &BlobRef, start: u64, len: u64) -> Result<BlobReader> {
        let (mut file, size) = self.open_sealed(blob).await?;
        if start.checked_add(len).map_or(true, |end| end > size) {
            return Err(Error::RangeNotSatisfiable { total: size });
        }
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| map_io(blob, e))?;
        Ok(Box::pin(file.take(len)))
    }

    async fn read_at(&self, blob: &BlobRef, offset: u64, len: usize) -> Result<Bytes> {
        let (mut file, size) = self.open_sealed(blob).await?;
        if offset >= size {
            return Ok(Bytes::new());
        }
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| map_io(blob, e))?;
        let want = (len as u64).min(size - offset);
        let mut buf = Vec::with_capacity(want as usize);
        file.take(want)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| map_io(blob, e))?;
        Ok(Bytes::from(buf))
    }

    async fn remove(&self, blob: &BlobRef) -> Result<()> {
        let path = self.blob_path(blob)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(blob = %blob, "blob removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(blob, e)),
        }
    }
}

struct FsBlobWriter {
    blob_ref: BlobRef,
    file: File,
    partial: PathBuf,
    sealed: PathBuf,
    written: u64,
}

#[async_trait]
impl BlobWriter for FsBlobWriter {
    fn blob_ref(&self) -> &BlobRef {
        &self.blob_ref
    }

    fn written(&self) -> u64 {
        self.written
    }

    async fn append(&mut self, chunk: &[u8]) -> Result<()> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| Error::storage(format!("write to blob {}: {e}", self.blob_ref)))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn seal(self: Box<Self>) -> Result<SealedBlob> {
        let FsBlobWriter {
            blob_ref,
            mut file,
            partial,
            sealed,
            written,
        } = *self;

        let storage_err = |e: std::io::Error| Error::storage(format!("seal blob {blob_ref}: {e}"));
        file.flush().await.map_err(storage_err)?;
        file.sync_all().await.map_err(storage_err)?;
        drop(file);

        if let Some(parent) = sealed.parent() {
            fs::create_dir_all(parent).await.map_err(storage_err)?;
        }
        fs::rename(&partial, &sealed).await.map_err(storage_err)?;

        tracing::debug!(blob = %blob_ref, size = written, "blob sealed");
        Ok(SealedBlob {
            blob_ref,
            size: written,
        })
    }

    async fn abort(self: Box<Self>) -> Result<()> {
        let FsBlobWriter {
            blob_ref,
            file,
            partial,
            ..
        } = *self;
        drop(file);
        match fs::remove_file(&partial).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!("abort blob {blob_ref}: {e}"))),
        }
    }
}

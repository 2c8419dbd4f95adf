//! Container probing over the media store.
//!
//! [`probe_blob`] sniffs the leading bytes to identify the container. For
//! ISO BMFF files it then walks the top-level boxes with ranged reads (the
//! `moov` box may sit before or after `mdat`) and parses `moov` for
//! duration, dimensions, codec, and frame rate. Other recognised containers
//! report the container only.

pub mod bmff;
pub mod signature;

use mf_core::{BlobRef, Container, Result};
use mf_storage::MediaStore;

use self::bmff::{fourcc_str, read_box_header, MovieInfo};

/// Bytes read for signature detection.
pub const SNIFF_LEN: usize = 1024;

/// Upper bound on the `moov` box we are willing to load.
const MAX_MOOV_BYTES: u64 = 64 * 1024 * 1024;

/// What the probe learned about a payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub container: Container,
    pub movie: MovieInfo,
}

/// Why probing failed.
#[derive(Debug)]
pub enum ProbeError {
    /// The payload is not a recognised container or is malformed.
    Unsupported(String),
    /// The media store could not be read.
    Store(mf_core::Error),
}

impl From<mf_core::Error> for ProbeError {
    fn from(e: mf_core::Error) -> Self {
        ProbeError::Store(e)
    }
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeError::Unsupported(msg) => f.write_str(msg),
            ProbeError::Store(e) => write!(f, "cannot read media: {e}"),
        }
    }
}

/// Probe a sealed blob of `size` bytes.
pub async fn probe_blob(
    store: &dyn MediaStore,
    blob: &BlobRef,
    size: u64,
) -> std::result::Result<ProbeReport, ProbeError> {
    let head = store.read_at(blob, 0, SNIFF_LEN).await?;
    let container = signature::sniff(&head)
        .ok_or_else(|| ProbeError::Unsupported("unrecognised container signature".into()))?;

    let movie = match container {
        Container::Mp4 | Container::Mov => read_movie(store, blob, size).await?,
        _ => MovieInfo::default(),
    };

    Ok(ProbeReport { container, movie })
}

async fn read_movie(
    store: &dyn MediaStore,
    blob: &BlobRef,
    size: u64,
) -> std::result::Result<MovieInfo, ProbeError> {
    let mut offset = 0u64;
    while offset + 8 <= size {
        let raw = store.read_at(blob, offset, 16).await?;
        let header = read_box_header(&mut raw.as_ref())
            .map_err(|e| ProbeError::Unsupported(format!("bad box header at {offset}: {e}")))?
            .ok_or_else(|| ProbeError::Unsupported(format!("truncated box header at {offset}")))?;

        let box_size = if header.size == 0 { size - offset } else { header.size };
        let end = offset
            .checked_add(box_size)
            .filter(|&end| box_size >= header.header_size && end <= size)
            .ok_or_else(|| {
                ProbeError::Unsupported(format!(
                    "box {} at {offset} has invalid size {box_size}",
                    fourcc_str(&header.box_type)
                ))
            })?;

        if &header.box_type == b"moov" {
            let content_len = box_size - header.header_size;
            if content_len > MAX_MOOV_BYTES {
                return Err(ProbeError::Unsupported(format!(
                    "moov box of {content_len} bytes exceeds the probe limit"
                )));
            }
            let body = read_exact_at(store, blob, offset + header.header_size, content_len as usize).await?;
            return bmff::parse_moov(&body)
                .map_err(|e| ProbeError::Unsupported(format!("malformed moov: {e}")));
        }

        offset = end;
    }

    Err(ProbeError::Unsupported("no moov box found".into()))
}

async fn read_exact_at(store: &dyn MediaStore, blob: &BlobRef, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    while buf.len() < len {
        let chunk = store.read_at(blob, offset + buf.len() as u64, len - buf.len()).await?;
        if chunk.is_empty() {
            return Err(mf_core::Error::storage(format!("blob {blob} ended early")));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

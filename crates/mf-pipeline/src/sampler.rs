//! Content sampling for analysis input.
//!
//! A fixed number of evenly spaced windows is read from the payload. The
//! windows feed a SHA-256 digest and a byte-entropy estimate, which together
//! form the [`AnalysisSample`] handed to the classifier. The same payload
//! and settings always yield the same sample.

use mf_core::BlobRef;
use mf_storage::MediaStore;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Summary of the sampled content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSample {
    /// Hex SHA-256 over all sampled windows, in order.
    pub digest: String,
    pub bytes_sampled: u64,
    pub windows: usize,
    /// Shannon entropy of the sampled bytes, in bits per byte.
    pub entropy: f64,
}

/// Offsets and lengths of the windows to read from a payload of `size` bytes.
pub fn plan_windows(size: u64, count: usize, window: usize) -> Vec<(u64, usize)> {
    let count = count.max(1) as u64;
    let window = window.max(1) as u64;

    if size == 0 {
        return Vec::new();
    }
    if size <= count * window {
        return vec![(0, size as usize)];
    }
    if count == 1 {
        return vec![(0, window as usize)];
    }

    let step = (size - window) / (count - 1);
    (0..count).map(|i| (i * step, window as usize)).collect()
}

/// Read the planned windows and summarise them.
pub async fn sample_blob(
    store: &dyn MediaStore,
    blob: &BlobRef,
    size: u64,
    count: usize,
    window: usize,
) -> Result<AnalysisSample, String> {
    let plan = plan_windows(size, count, window);
    if plan.is_empty() {
        return Err("payload is empty".into());
    }

    let mut hasher = Sha256::new();
    let mut histogram = [0u64; 256];
    let mut total = 0u64;

    for &(offset, len) in &plan {
        let bytes = store
            .read_at(blob, offset, len)
            .await
            .map_err(|e| format!("read window at {offset}: {e}"))?;
        if bytes.len() != len {
            return Err(format!(
                "short read at {offset}: wanted {len} bytes, got {}",
                bytes.len()
            ));
        }
        hasher.update(&bytes);
        for &b in bytes.iter() {
            histogram[b as usize] += 1;
        }
        total += bytes.len() as u64;
    }

    Ok(AnalysisSample {
        digest: hex::encode(hasher.finalize()),
        bytes_sampled: total,
        windows: plan.len(),
        entropy: entropy(&histogram, total),
    })
}

fn entropy(histogram: &[u64; 256], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let bits: f64 = histogram
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum();
    (bits * 10_000.0).round() / 10_000.0
}

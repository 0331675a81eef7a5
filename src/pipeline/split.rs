//! Chunk planning: derive size-bounded PDF parts via pdfium.
//!
//! Drive refuses to convert (and therefore OCR) files above ~10 MB, so an
//! oversized input is split into page-range sub-documents of roughly half
//! that size. An input already under the limit is passed through untouched —
//! one chunk referencing the original path, no copy, no temp file.
//!
//! ## Why spawn_blocking?
//!
//! pdfium wraps a C++ library with thread-local state that is not safe to
//! call from async contexts. `tokio::task::spawn_blocking` moves the page
//! copying onto the blocking thread pool so the Tokio workers never stall
//! on CPU-bound PDF work.
//!
//! Every derived part path is registered with the [`ResourceTracker`]
//! before its bytes are written, so a failure mid-split cannot leak files.

use crate::config::ConversionConfig;
use crate::error::DriveOcrError;
use crate::resources::ResourceTracker;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Plan the run's ordered chunk sources.
///
/// Returns either `[input]` (already under the conversion limit) or the
/// derived part paths in original page order.
pub async fn plan_chunks(
    input: &Path,
    config: &ConversionConfig,
    tracker: &ResourceTracker,
) -> Result<Vec<PathBuf>, DriveOcrError> {
    let meta = tokio::fs::metadata(input)
        .await
        .map_err(|_| DriveOcrError::FileNotFound {
            path: input.to_path_buf(),
        })?;
    let size_mb = meta.len() as f64 / 1_000_000.0;

    if size_mb <= config.convert_limit_mb {
        debug!(
            "{} is {:.1} MB, under the {} MB conversion limit; no split",
            input.display(),
            size_mb,
            config.convert_limit_mb
        );
        return Ok(vec![input.to_path_buf()]);
    }

    let path = input.to_path_buf();
    let target_mb = config.chunk_target_mb;
    let tracker = tracker.clone();

    tokio::task::spawn_blocking(move || split_blocking(&path, size_mb, target_mb, &tracker))
        .await
        .map_err(|e| DriveOcrError::Internal(format!("Split task panicked: {}", e)))?
}

/// Blocking implementation of the page-range split.
fn split_blocking(
    input: &Path,
    size_mb: f64,
    target_mb: f64,
    tracker: &ResourceTracker,
) -> Result<Vec<PathBuf>, DriveOcrError> {
    let pdfium = Pdfium::default();

    let source = pdfium
        .load_pdf_from_file(input, None)
        .map_err(|e| DriveOcrError::CorruptPdf {
            path: input.to_path_buf(),
            detail: format!("{:?}", e),
        })?;

    let page_count = source.pages().len() as usize;
    let per_part = pages_per_part(size_mb, page_count, target_mb);
    let ranges = part_ranges(page_count, per_part);
    info!(
        "Splitting {:.1} MB / {} pages into {} parts of ≤{} pages",
        size_mb,
        page_count,
        ranges.len(),
        per_part
    );

    let tmp = std::env::temp_dir();
    let pid = std::process::id();
    let mut parts = Vec::with_capacity(ranges.len());

    for (i, &(start, end)) in ranges.iter().enumerate() {
        let part_path = tmp.join(format!(
            "driveocr-{pid}-part{i:03}-pages{}-{}.pdf",
            start + 1,
            end + 1
        ));
        // Register before writing: a failure below must not leak the path.
        tracker.add_local(part_path.clone());

        let mut part = pdfium
            .create_new_pdf()
            .map_err(|e| DriveOcrError::SplitFailed {
                detail: format!("{:?}", e),
            })?;
        part.pages_mut()
            .copy_pages_from_document(
                &source,
                &format!("{}-{}", start + 1, end + 1),
                0,
            )
            .map_err(|e| DriveOcrError::SplitFailed {
                detail: format!("pages {}-{}: {:?}", start + 1, end + 1, e),
            })?;
        part.save_to_file(&part_path)
            .map_err(|e| DriveOcrError::SplitFailed {
                detail: format!("writing {}: {:?}", part_path.display(), e),
            })?;

        debug!(
            "wrote part {} (pages {}-{}) to {}",
            i,
            start + 1,
            end + 1,
            part_path.display()
        );
        parts.push(part_path);
    }

    Ok(parts)
}

/// Pages per derived part so each part lands near `target_mb`.
///
/// Assumes pages are roughly uniform in size, as the original input's
/// average is the only information available before splitting.
pub fn pages_per_part(size_mb: f64, page_count: usize, target_mb: f64) -> usize {
    if page_count == 0 {
        return 1;
    }
    let mb_per_page = size_mb / page_count as f64;
    ((target_mb / mb_per_page).round() as usize).max(1)
}

/// Inclusive 0-indexed page ranges covering `[0, page_count)` exactly once,
/// in order, with no overlap.
pub fn part_ranges(page_count: usize, per_part: usize) -> Vec<(usize, usize)> {
    let per = per_part.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < page_count {
        let end = (start + per - 1).min(page_count.saturating_sub(1));
        ranges.push((start, end));
        start = end + 1;
    }
    ranges
}

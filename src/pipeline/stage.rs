//! The per-chunk three-stage driver: upload, OCR copy, export.
//!
//! Intentionally thin — admission control and result collection live in the
//! scheduler; this module only advances one chunk through its stages,
//! keeps the chunk's shared state current for the status aggregator, and
//! registers every resource it creates with the tracker the moment the
//! resource exists.

use crate::config::ConversionConfig;
use crate::error::DriveOcrError;
use crate::job::{Chunk, ChunkStage};
use crate::remote::{RemoteId, RemoteStore, DOCX_MIME, GOOGLE_DOC_MIME};
use crate::resources::ResourceTracker;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Drive one chunk through `Uploading → Converting → Downloading → Done`.
///
/// On any stage failure the chunk is marked `Failed` and the error
/// propagates — fail-fast for the whole run. Resources created before the
/// failure (the uploaded object, the converted object, the output path) are
/// already registered for teardown.
pub async fn process_chunk(
    remote: &Arc<dyn RemoteStore>,
    folder: &RemoteId,
    chunk: &Chunk,
    tracker: &ResourceTracker,
    config: &ConversionConfig,
) -> Result<PathBuf, DriveOcrError> {
    let start = Instant::now();
    let result = run_stages(remote, folder, chunk, tracker, config).await;

    match &result {
        Ok(output) => {
            chunk.state.set_stage(ChunkStage::Done);
            debug!(
                "chunk {} done in {:?} → {}",
                chunk.index,
                start.elapsed(),
                output.display()
            );
        }
        Err(e) => {
            let stage = chunk.state.stage();
            chunk.state.set_stage(ChunkStage::Failed);
            warn!("chunk {} failed while {}: {}", chunk.index, stage, e);
        }
    }

    result
}

async fn run_stages(
    remote: &Arc<dyn RemoteStore>,
    folder: &RemoteId,
    chunk: &Chunk,
    tracker: &ResourceTracker,
    config: &ConversionConfig,
) -> Result<PathBuf, DriveOcrError> {
    // ── Upload ───────────────────────────────────────────────────────────
    chunk.state.set_stage(ChunkStage::Uploading);
    chunk.state.set_upload_percent(0);
    let state = Arc::clone(&chunk.state);
    let uploaded = remote
        .upload_file(&chunk.source, folder, &move |pct| {
            state.set_upload_percent(pct)
        })
        .await
        .map_err(|e| stage_failed(chunk.index, ChunkStage::Uploading, e))?;
    tracker.add_remote(uploaded.clone());
    debug!("chunk {} uploaded as {}", chunk.index, uploaded);

    // ── Convert (OCR) ────────────────────────────────────────────────────
    chunk.state.set_stage(ChunkStage::Converting);
    let converted = remote
        .copy_with_transform(
            &uploaded,
            GOOGLE_DOC_MIME,
            folder,
            config.ocr_language.as_deref(),
        )
        .await
        .map_err(|e| stage_failed(chunk.index, ChunkStage::Converting, e))?;
    tracker.add_remote(converted.clone());
    debug!("chunk {} converted as {}", chunk.index, converted);

    // ── Download ─────────────────────────────────────────────────────────
    chunk.state.set_stage(ChunkStage::Downloading);
    let dest = export_dest(folder, &chunk.source, chunk.index);
    // Register before streaming so a partial download still gets removed.
    tracker.add_local(dest.clone());
    remote
        .export_to_file(&converted, DOCX_MIME, &dest)
        .await
        .map_err(|e| stage_failed(chunk.index, ChunkStage::Downloading, e))?;

    Ok(dest)
}

fn stage_failed(chunk: usize, stage: ChunkStage, source: DriveOcrError) -> DriveOcrError {
    DriveOcrError::StageFailed {
        chunk,
        stage,
        detail: source.to_string(),
    }
}

/// Where a chunk's exported DOCX lands while the run is in flight.
///
/// The scratch-folder id is folded into the name so two converters in the
/// same process never race on the same path, even for identically-named
/// inputs.
fn export_dest(folder: &RemoteId, source: &std::path::Path, index: usize) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("part");
    let run: String = folder
        .0
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    std::env::temp_dir().join(format!(
        "driveocr-{}-{}-{}-out{:03}.docx",
        std::process::id(),
        run,
        stem,
        index
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn export_dest_is_scoped_to_the_run() {
        let source = Path::new("/tmp/scan.pdf");
        let a = export_dest(&RemoteId::from("folderA"), source, 0);
        let b = export_dest(&RemoteId::from("folderB"), source, 0);
        assert_ne!(a, b, "same input in two runs must not share a path");

        // Same run, different chunks stay distinct too.
        let a1 = export_dest(&RemoteId::from("folderA"), source, 1);
        assert_ne!(a, a1);
    }

    #[test]
    fn export_dest_tolerates_odd_folder_ids_and_sources() {
        let dest = export_dest(&RemoteId::from("x/../y"), Path::new(".."), 2);
        let name = dest.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("driveocr-"), "got: {name}");
        assert!(name.ends_with("-out002.docx"), "got: {name}");
        assert!(!name.contains('/'), "got: {name}");
    }
}

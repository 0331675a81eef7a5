//! Error types for the driveocr library.
//!
//! The conversion pipeline is deliberately fail-fast: correctness of the
//! merged DOCX requires every chunk to succeed, so any stage failure on any
//! chunk is fatal to the whole run. There is therefore a single error enum —
//! no per-chunk "partial success" type. The one class of failure that is
//! tolerated (logged, never surfaced) is a teardown-phase deletion failure,
//! because teardown must always run to completion; those never appear here.

use crate::job::ChunkStage;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the driveocr library.
#[derive(Debug, Error)]
pub enum DriveOcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{}'\nCheck the path exists and is readable.", .path.display())]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{}'\nTry: chmod +r {path:?}", .path.display())]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{}'\nFirst bytes: {magic:?}", .path.display())]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Split errors ──────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf", .path.display())]
    CorruptPdf { path: PathBuf, detail: String },

    /// Splitting the PDF into size-bounded parts failed.
    #[error("Failed to split PDF into parts: {detail}")]
    SplitFailed { detail: String },

    // ── Remote-service errors ─────────────────────────────────────────────
    /// The Drive API (or any other remote store) returned an error.
    #[error("Drive API error during {op}: {detail}")]
    RemoteApi { op: &'static str, detail: String },

    /// A chunk pipeline failed at one of its three stages.
    ///
    /// Fatal for the whole run: the merged output requires every chunk.
    #[error("Chunk {chunk} failed while {stage}: {detail}")]
    StageFailed {
        chunk: usize,
        stage: ChunkStage,
        detail: String,
    },

    // ── Auth errors ───────────────────────────────────────────────────────
    /// Credentials could not be loaded or a token could not be obtained.
    #[error("Google authentication failed: {detail}\nCheck your credentials file and token file.")]
    AuthFailed { detail: String },

    // ── Merge / output errors ─────────────────────────────────────────────
    /// Combining the per-chunk DOCX parts failed.
    #[error("Failed to merge DOCX parts: {detail}")]
    MergeFailed { detail: String },

    /// Could not create or write the final output file.
    #[error("Failed to write output file '{}': {source}", .path.display())]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

//! # driveocr
//!
//! OCR-convert large PDFs to DOCX through Google Drive.
//!
//! ## Why this crate?
//!
//! Drive performs OCR when a PDF is copied as a Google Doc, but refuses
//! files over its conversion size limit. This crate works around the limit:
//! it splits an oversized PDF into page-range parts under the limit, runs
//! each part through upload → OCR copy → DOCX export concurrently, then
//! splices the exported parts back into a single DOCX in page order. Every
//! temporary artifact — local part files, uploaded objects, the remote
//! scratch folder — is deleted exactly once at the end of the run, whether
//! it succeeded, failed, or was interrupted.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Validate  magic-byte and size check
//!  ├─ 2. Split     page-range parts via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Upload    resumable Drive upload, per-part progress   ┐
//!  ├─ 4. Convert   files.copy as Google Doc (this runs OCR)    ├ per chunk,
//!  ├─ 5. Download  streamed DOCX export                        ┘ bounded by
//!  │                                                             a semaphore
//!  ├─ 6. Merge     splice part bodies into one DOCX, page order kept
//!  └─ 7. Teardown  delete local parts, remote objects, scratch folder
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use driveocr::{Authenticator, ConversionConfig, Converter, DriveClient};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = Authenticator::load(
//!         Path::new("credentials.json"),
//!         Path::new("token.json"),
//!     )?;
//!     let config = ConversionConfig::builder()
//!         .ocr_language("en")
//!         .build()?;
//!     let converter = Converter::new(Arc::new(DriveClient::new(auth)?), config);
//!     let stats = converter
//!         .convert_to_file(Path::new("scan.pdf"), Path::new("scan.docx"))
//!         .await?;
//!     eprintln!("{} chunks in {} ms", stats.chunk_count, stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `driveocr` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! driveocr = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod config;
pub mod convert;
pub mod drive;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod remote;
pub mod resources;
pub mod scheduler;
pub mod status;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::Authenticator;
pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{Converter, RunStats};
pub use drive::DriveClient;
pub use error::DriveOcrError;
pub use job::{Chunk, ChunkStage, Job};
pub use remote::{RemoteId, RemoteStore, DOCX_MIME, FOLDER_MIME, GOOGLE_DOC_MIME};
pub use resources::ResourceTracker;
pub use status::{NoopStatusObserver, StatusObserver, StatusSnapshot};

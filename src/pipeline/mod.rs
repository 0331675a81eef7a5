//! Pipeline stages for PDF-to-DOCX conversion through Drive.
//!
//! Each submodule implements exactly one transformation step. Keeping
//! stages separate makes each independently testable and lets us swap
//! implementations (e.g. a different remote store) without touching the
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ split ──▶ stage × N ──▶ merge
//! (PDF)   (pdfium)  (upload/OCR/    (DOCX body
//!                    export, per     splice, index
//!                    chunk)          order)
//! ```
//!
//! 1. [`split`] — derive size-bounded chunk files; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 2. [`stage`] — drive one chunk through the three remote stages; the only
//!    module with per-chunk network I/O
//! 3. [`merge`] — combine per-chunk DOCX parts into one document in original
//!    index order

pub mod merge;
pub mod split;
pub mod stage;

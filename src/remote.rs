//! The remote storage/conversion boundary.
//!
//! Everything the pipeline needs from Google Drive (or a stand-in during
//! tests) is expressed as the [`RemoteStore`] trait: create and delete a
//! scratch folder, upload an object with progress events, copy it with a
//! format transform (this is the step that performs OCR), stream an export,
//! and delete objects during teardown.
//!
//! The core treats every remote failure identically — fail-fast for the run,
//! warn-and-continue during teardown — so the trait surfaces one error type
//! and no retry hooks.

use crate::error::DriveOcrError;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Drive's folder pseudo-MIME type.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Copying an uploaded PDF to this MIME type triggers Drive's OCR.
pub const GOOGLE_DOC_MIME: &str = "application/vnd.google-apps.document";

/// Export target for the converted result.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Opaque identity of a remote object or folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteId(pub String);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(s: &str) -> Self {
        RemoteId(s.to_string())
    }
}

impl From<String> for RemoteId {
    fn from(s: String) -> Self {
        RemoteId(s)
    }
}

/// Upload progress sink: called with a percentage in `0..=100`,
/// monotonically non-decreasing, final value 100 on success.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

/// The remote storage/conversion service the pipeline runs against.
///
/// Implemented by [`crate::drive::DriveClient`] for the real Drive v3 API
/// and by scripted in-memory stores in the integration tests.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a folder to hold the run's temporary remote objects.
    async fn create_folder(&self, name: &str) -> Result<RemoteId, DriveOcrError>;

    /// Delete the scratch folder (teardown only).
    async fn delete_folder(&self, id: &RemoteId) -> Result<(), DriveOcrError>;

    /// Upload a local file into `parent`, reporting transfer progress.
    async fn upload_file(
        &self,
        path: &Path,
        parent: &RemoteId,
        progress: ProgressFn<'_>,
    ) -> Result<RemoteId, DriveOcrError>;

    /// Copy an uploaded object into `parent` as `target_mime`, applying the
    /// remote transform. For Drive, copying a PDF as a Google Doc runs OCR;
    /// `ocr_language` is an optional two-letter hint passed through unchanged.
    async fn copy_with_transform(
        &self,
        id: &RemoteId,
        target_mime: &str,
        parent: &RemoteId,
        ocr_language: Option<&str>,
    ) -> Result<RemoteId, DriveOcrError>;

    /// Stream an export of the object as `export_mime` to a local path.
    async fn export_to_file(
        &self,
        id: &RemoteId,
        export_mime: &str,
        dest: &Path,
    ) -> Result<(), DriveOcrError>;

    /// Delete a single remote object (teardown only).
    async fn delete_file(&self, id: &RemoteId) -> Result<(), DriveOcrError>;
}

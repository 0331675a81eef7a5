//! Configuration for a PDF-to-DOCX conversion run.
//!
//! All behaviour is controlled through [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to thread the same config through the planner, scheduler, and
//! status aggregator, and to diff two runs to understand why they behaved
//! differently.

use crate::error::DriveOcrError;
use crate::status::StatusObserver;
use std::fmt;
use std::sync::Arc;

/// Configuration for a conversion run.
///
/// Built via [`ConversionConfig::builder()`] or
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use driveocr::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .concurrency(4)
///     .ocr_language("en")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Largest input (in MB) Drive will convert in one piece. Default: 10.0.
    ///
    /// Drive refuses to convert files above roughly 10 MB to a Google Doc,
    /// which is the step that performs OCR. Inputs at or below this limit are
    /// submitted whole; larger inputs are split first.
    pub convert_limit_mb: f64,

    /// Target size (in MB) of each derived chunk when splitting. Default: 5.0.
    ///
    /// Half the conversion limit leaves headroom for pages that compress
    /// worse than the document average, so a derived part never itself trips
    /// the limit.
    pub chunk_target_mb: f64,

    /// Number of chunks allowed in the remote pipeline at once. Default: 10.
    ///
    /// The three remote stages are network-bound, not CPU-bound. Ten in
    /// flight keeps the Drive API busy without tripping its per-user rate
    /// limits; lower this if you see HTTP 403 rate-limit errors.
    pub concurrency: usize,

    /// Cadence of status-line updates in milliseconds. Default: 500.
    pub status_interval_ms: u64,

    /// Two-letter OCR language hint passed through to Drive unchanged.
    /// If None, Drive detects the language itself.
    pub ocr_language: Option<String>,

    /// Name of the remote scratch folder holding the run's uploaded and
    /// converted objects. Deleted during teardown. Default: "driveocr-scratch".
    pub scratch_folder_name: String,

    /// Receiver for periodic status snapshots. If None, no sampling task
    /// is spawned.
    pub status_observer: Option<Arc<dyn StatusObserver>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            convert_limit_mb: 10.0,
            chunk_target_mb: 5.0,
            concurrency: 10,
            status_interval_ms: 500,
            ocr_language: None,
            scratch_folder_name: "driveocr-scratch".to_string(),
            status_observer: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("convert_limit_mb", &self.convert_limit_mb)
            .field("chunk_target_mb", &self.chunk_target_mb)
            .field("concurrency", &self.concurrency)
            .field("status_interval_ms", &self.status_interval_ms)
            .field("ocr_language", &self.ocr_language)
            .field("scratch_folder_name", &self.scratch_folder_name)
            .field(
                "status_observer",
                &self.status_observer.as_ref().map(|_| "<dyn StatusObserver>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn convert_limit_mb(mut self, mb: f64) -> Self {
        self.config.convert_limit_mb = mb;
        self
    }

    pub fn chunk_target_mb(mut self, mb: f64) -> Self {
        self.config.chunk_target_mb = mb;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn status_interval_ms(mut self, ms: u64) -> Self {
        self.config.status_interval_ms = ms.max(50);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = Some(lang.into());
        self
    }

    pub fn scratch_folder_name(mut self, name: impl Into<String>) -> Self {
        self.config.scratch_folder_name = name.into();
        self
    }

    pub fn status_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.config.status_observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, DriveOcrError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(DriveOcrError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(c.chunk_target_mb > 0.0) {
            return Err(DriveOcrError::InvalidConfig(format!(
                "Chunk target size must be positive, got {}",
                c.chunk_target_mb
            )));
        }
        if c.chunk_target_mb > c.convert_limit_mb {
            return Err(DriveOcrError::InvalidConfig(format!(
                "Chunk target ({} MB) exceeds the conversion limit ({} MB)",
                c.chunk_target_mb, c.convert_limit_mb
            )));
        }
        if c.scratch_folder_name.is_empty() {
            return Err(DriveOcrError::InvalidConfig(
                "Scratch folder name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_drive_limits() {
        let c = ConversionConfig::default();
        assert_eq!(c.convert_limit_mb, 10.0);
        assert_eq!(c.chunk_target_mb, 5.0);
        assert_eq!(c.concurrency, 10);
        assert_eq!(c.status_interval_ms, 500);
        assert!(c.ocr_language.is_none());
    }

    #[test]
    fn concurrency_is_floored_at_one() {
        let c = ConversionConfig::builder().concurrency(0).build().unwrap();
        assert_eq!(c.concurrency, 1);
    }

    #[test]
    fn chunk_target_above_limit_is_rejected() {
        let err = ConversionConfig::builder()
            .convert_limit_mb(10.0)
            .chunk_target_mb(12.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, DriveOcrError::InvalidConfig(_)));
    }

    #[test]
    fn builder_sets_language_hint() {
        let c = ConversionConfig::builder()
            .ocr_language("he")
            .build()
            .unwrap();
        assert_eq!(c.ocr_language.as_deref(), Some("he"));
    }
}

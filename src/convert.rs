//! The conversion lifecycle: plan → schedule → merge → teardown.
//!
//! [`Converter`] owns the run's wiring: the remote store, the config, and
//! the [`ResourceTracker`]. The tracker handle is exposed so a host binary
//! can trigger the same teardown from a signal handler; the one-shot latch
//! inside the tracker guarantees that the signal path, the error path, and
//! normal completion between them produce exactly one cleanup pass.

use crate::config::ConversionConfig;
use crate::error::DriveOcrError;
use crate::job::Job;
use crate::pipeline::{merge, split};
use crate::remote::RemoteStore;
use crate::resources::ResourceTracker;
use crate::scheduler;
use crate::status::StatusSnapshot;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    /// Number of chunks the input was processed as.
    pub chunk_count: usize,
    /// Time spent planning/splitting, in milliseconds.
    pub split_duration_ms: u64,
    /// Time spent in the remote pipelines, in milliseconds.
    pub pipeline_duration_ms: u64,
    /// Wall-clock time for the whole run, in milliseconds.
    pub total_duration_ms: u64,
    /// Where the merged document was written.
    pub output: PathBuf,
}

/// One conversion run's wiring: remote store + config + resource tracker.
pub struct Converter {
    remote: Arc<dyn RemoteStore>,
    config: ConversionConfig,
    tracker: ResourceTracker,
}

impl Converter {
    pub fn new(remote: Arc<dyn RemoteStore>, config: ConversionConfig) -> Self {
        Self {
            remote,
            config,
            tracker: ResourceTracker::new(),
        }
    }

    /// Handle to the run's resource set, for signal-driven teardown.
    pub fn tracker(&self) -> ResourceTracker {
        self.tracker.clone()
    }

    /// The remote store this converter runs against.
    pub fn remote(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.remote)
    }

    /// Convert `input` (a PDF) into a DOCX at `output`.
    ///
    /// Teardown runs before this returns, on success and on every error
    /// path; the final output file itself is never tracked, so it survives.
    pub async fn convert_to_file(
        &self,
        input: &Path,
        output: &Path,
    ) -> Result<RunStats, DriveOcrError> {
        let result = self.run(input, output).await;
        if self.tracker.teardown(self.remote.as_ref()).await {
            info!("cleanup complete");
        }
        result
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<RunStats, DriveOcrError> {
        let total_start = Instant::now();
        validate_input(input)?;
        info!("Starting conversion: {}", input.display());

        // ── Remote scratch folder ────────────────────────────────────────
        let folder = self
            .remote
            .create_folder(&self.config.scratch_folder_name)
            .await?;
        self.tracker.set_scratch_folder(folder.clone());
        debug!("scratch folder created: {folder}");

        // ── Plan chunks ──────────────────────────────────────────────────
        let split_start = Instant::now();
        let sources = split::plan_chunks(input, &self.config, &self.tracker).await?;
        let split_duration_ms = split_start.elapsed().as_millis() as u64;
        info!("Processing {} chunks", sources.len());

        let job = Arc::new(Job::new(sources, self.config.concurrency));
        if let Some(obs) = &self.config.status_observer {
            obs.on_run_start(job.len());
        }

        // ── Status sampling ──────────────────────────────────────────────
        let ticker = self.config.status_observer.clone().map(|obs| {
            let job = Arc::clone(&job);
            let interval_ms = self.config.status_interval_ms;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
                loop {
                    interval.tick().await;
                    obs.on_tick(&StatusSnapshot::capture(&job));
                }
            })
        });

        // ── Run the chunk pipelines ──────────────────────────────────────
        let pipeline_start = Instant::now();
        let outputs =
            scheduler::run_pipelines(&self.remote, &folder, &job, &self.tracker, &self.config)
                .await;
        if let Some(t) = ticker {
            t.abort();
        }
        if let Some(obs) = &self.config.status_observer {
            obs.on_run_complete(&StatusSnapshot::capture(&job));
        }
        let outputs = outputs?;
        let pipeline_duration_ms = pipeline_start.elapsed().as_millis() as u64;

        // ── Merge (or direct-copy) ───────────────────────────────────────
        info!("All chunks ready; assembling final document");
        finalize_outputs(&outputs, output).await?;

        let stats = RunStats {
            chunk_count: job.len(),
            split_duration_ms,
            pipeline_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            output: output.to_path_buf(),
        };
        info!(
            "Conversion complete: {} chunks, {}ms total → {}",
            stats.chunk_count,
            stats.total_duration_ms,
            output.display()
        );
        Ok(stats)
    }
}

/// Check the input exists, is readable, and carries the `%PDF` magic.
fn validate_input(path: &Path) -> Result<(), DriveOcrError> {
    if !path.exists() {
        return Err(DriveOcrError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    match std::fs::File::open(path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(DriveOcrError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DriveOcrError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(_) => Err(DriveOcrError::FileNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Write the final artifact from the ordered chunk outputs.
///
/// A single chunk degrades to a direct copy — the format-specific merge is
/// not invoked. Writes go to a temp sibling first, then rename, so a crash
/// never leaves a partial file at the destination.
pub async fn finalize_outputs(outputs: &[PathBuf], dest: &Path) -> Result<(), DriveOcrError> {
    if outputs.is_empty() {
        return Err(DriveOcrError::Internal(
            "no chunk outputs to finalize".into(),
        ));
    }

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DriveOcrError::OutputWriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let tmp = dest.with_extension("docx.tmp");

    if outputs.len() == 1 {
        tokio::fs::copy(&outputs[0], &tmp).await.map_err(|e| {
            DriveOcrError::OutputWriteFailed {
                path: dest.to_path_buf(),
                source: e,
            }
        })?;
    } else {
        let parts = outputs.to_vec();
        let tmp_clone = tmp.clone();
        tokio::task::spawn_blocking(move || merge::merge_docx(&parts, &tmp_clone))
            .await
            .map_err(|e| DriveOcrError::Internal(format!("Merge task panicked: {}", e)))??;
    }

    tokio::fs::rename(&tmp, dest)
        .await
        .map_err(|e| DriveOcrError::OutputWriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

    Ok(())
}

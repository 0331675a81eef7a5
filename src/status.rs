//! Status aggregation: one line summarising a concurrently-mutating run.
//!
//! The aggregator is purely observational. It samples each chunk's atomic
//! stage and upload percentage on its own timer — decoupling reporting
//! cadence from I/O event cadence — and never influences scheduling.
//!
//! # Why an observer trait instead of printing directly?
//!
//! The library should not know whether the host renders to a dumb terminal,
//! an indicatif bar, or a log file. Callers inject an
//! [`Arc<dyn StatusObserver>`] via
//! [`crate::config::ConversionConfigBuilder::status_observer`]; the run loop
//! calls it at a fixed cadence (default every 500 ms). The trait is
//! `Send + Sync` because sampling runs on its own spawned task.

use crate::job::{ChunkStage, Job};
use std::fmt;

/// A point-in-time view of aggregate run progress.
///
/// Captured lock-free from the job's atomics; by the time it is rendered the
/// underlying chunks may already have moved on, which is fine for a display
/// refreshed twice a second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Total number of chunks in the run.
    pub total: usize,
    /// Chunks past admission and not yet finished.
    pub active: usize,
    /// Chunks currently uploading.
    pub uploading: usize,
    /// Mean upload percentage across currently-uploading chunks.
    /// 0 when no chunk is uploading (never NaN).
    pub mean_upload_percent: u8,
    /// Chunks currently in the remote OCR conversion.
    pub converting: usize,
    /// Chunks currently exporting/downloading their converted result.
    pub downloading: usize,
    /// Chunks fully done.
    pub finished: usize,
    /// Chunks that failed (at most one before the run aborts).
    pub failed: usize,
}

impl StatusSnapshot {
    /// Sample the job's current state.
    pub fn capture(job: &Job) -> Self {
        let mut snapshot = StatusSnapshot {
            total: job.len(),
            active: job.active_count(),
            uploading: 0,
            mean_upload_percent: 0,
            converting: 0,
            downloading: 0,
            finished: 0,
            failed: 0,
        };

        let mut percent_sum: u32 = 0;
        for chunk in job.chunks() {
            match chunk.state.stage() {
                ChunkStage::Pending => {}
                ChunkStage::Uploading => {
                    snapshot.uploading += 1;
                    percent_sum += u32::from(chunk.state.upload_percent());
                }
                ChunkStage::Converting => snapshot.converting += 1,
                ChunkStage::Downloading => snapshot.downloading += 1,
                ChunkStage::Done => snapshot.finished += 1,
                ChunkStage::Failed => snapshot.failed += 1,
            }
        }

        if snapshot.uploading > 0 {
            snapshot.mean_upload_percent = (percent_sum / snapshot.uploading as u32) as u8;
        }

        snapshot
    }

    /// True once every chunk has reached a terminal stage.
    pub fn is_settled(&self) -> bool {
        self.finished + self.failed == self.total
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processing: {}% uploaded, {} on OCR, {} downloading, {}/{} finished",
            self.active,
            self.mean_upload_percent,
            self.converting,
            self.downloading,
            self.finished,
            self.total,
        )
    }
}

/// Called by the run loop as it samples progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`; ticks arrive
/// from a spawned sampling task.
pub trait StatusObserver: Send + Sync {
    /// Called once after chunk planning, before any pipeline starts.
    fn on_run_start(&self, chunk_count: usize) {
        let _ = chunk_count;
    }

    /// Called on every sampling tick while pipelines are in flight.
    fn on_tick(&self, snapshot: &StatusSnapshot) {
        let _ = snapshot;
    }

    /// Called once after every pipeline has finished (or the run failed).
    fn on_run_complete(&self, snapshot: &StatusSnapshot) {
        let _ = snapshot;
    }
}

/// A no-op implementation for callers that don't need status events.
pub struct NoopStatusObserver;

impl StatusObserver for NoopStatusObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use std::path::PathBuf;

    fn job_of(n: usize) -> Job {
        Job::new(
            (0..n).map(|i| PathBuf::from(format!("/tmp/{i}.pdf"))).collect(),
            10,
        )
    }

    #[test]
    fn empty_upload_set_renders_zero_percent() {
        let job = job_of(3);
        let snap = StatusSnapshot::capture(&job);
        assert_eq!(snap.uploading, 0);
        assert_eq!(snap.mean_upload_percent, 0);
        let line = snap.to_string();
        assert!(line.contains("0% uploaded"), "got: {line}");
    }

    #[test]
    fn mean_upload_percent_averages_only_uploaders() {
        let job = job_of(4);
        job.chunks()[0].state.set_stage(ChunkStage::Uploading);
        job.chunks()[0].state.set_upload_percent(40);
        job.chunks()[1].state.set_stage(ChunkStage::Uploading);
        job.chunks()[1].state.set_upload_percent(80);
        job.chunks()[2].state.set_stage(ChunkStage::Converting);
        job.chunks()[3].state.set_stage(ChunkStage::Done);

        let snap = StatusSnapshot::capture(&job);
        assert_eq!(snap.uploading, 2);
        assert_eq!(snap.mean_upload_percent, 60);
        assert_eq!(snap.converting, 1);
        assert_eq!(snap.finished, 1);
    }

    #[test]
    fn settled_when_all_terminal() {
        let job = job_of(2);
        job.chunks()[0].state.set_stage(ChunkStage::Done);
        job.chunks()[1].state.set_stage(ChunkStage::Failed);
        let snap = StatusSnapshot::capture(&job);
        assert!(snap.is_settled());
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn display_matches_expected_shape() {
        let job = job_of(5);
        job.chunks()[0].state.set_stage(ChunkStage::Converting);
        job.chunks()[1].state.set_stage(ChunkStage::Downloading);
        job.chunks()[2].state.set_stage(ChunkStage::Done);
        let line = StatusSnapshot::capture(&job).to_string();
        assert!(line.contains("1 on OCR"), "got: {line}");
        assert!(line.contains("1 downloading"), "got: {line}");
        assert!(line.contains("1/5 finished"), "got: {line}");
    }
}

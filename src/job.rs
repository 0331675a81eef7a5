//! Chunk and job state shared between the scheduler and the status line.
//!
//! One [`Chunk`] is one unit of work: a size-bounded slice of the input PDF
//! (or the whole input, when it is already under the conversion limit) that
//! travels through upload → OCR copy → export independently of its siblings.
//!
//! Mutation is single-writer by construction: only the pipeline task that
//! owns a chunk's index ever advances its stage or upload percentage. The
//! status aggregator reads the same fields concurrently, so both live in
//! atomics rather than behind a lock — the aggregator samples on its own
//! timer and never blocks a pipeline task.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

/// Where a chunk currently is in its three-stage remote pipeline.
///
/// Advances monotonically `Pending → Uploading → Converting → Downloading →
/// Done`, except that any stage may transition to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkStage {
    Pending = 0,
    Uploading = 1,
    Converting = 2,
    Downloading = 3,
    Done = 4,
    Failed = 5,
}

impl ChunkStage {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ChunkStage::Pending,
            1 => ChunkStage::Uploading,
            2 => ChunkStage::Converting,
            3 => ChunkStage::Downloading,
            4 => ChunkStage::Done,
            _ => ChunkStage::Failed,
        }
    }
}

impl fmt::Display for ChunkStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChunkStage::Pending => "pending",
            ChunkStage::Uploading => "uploading",
            ChunkStage::Converting => "converting",
            ChunkStage::Downloading => "downloading",
            ChunkStage::Done => "done",
            ChunkStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The concurrently-readable slice of a chunk's state.
///
/// `upload_percent` is meaningful only while the stage is `Uploading`.
#[derive(Debug)]
pub struct ChunkState {
    stage: AtomicU8,
    upload_percent: AtomicU8,
}

impl ChunkState {
    pub fn new() -> Self {
        Self {
            stage: AtomicU8::new(ChunkStage::Pending as u8),
            upload_percent: AtomicU8::new(0),
        }
    }

    pub fn stage(&self) -> ChunkStage {
        ChunkStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    pub fn set_stage(&self, stage: ChunkStage) {
        self.stage.store(stage as u8, Ordering::Release);
    }

    pub fn upload_percent(&self) -> u8 {
        self.upload_percent.load(Ordering::Acquire)
    }

    pub fn set_upload_percent(&self, percent: u8) {
        self.upload_percent
            .store(percent.min(100), Ordering::Release);
    }
}

impl Default for ChunkState {
    fn default() -> Self {
        Self::new()
    }
}

/// One unit of work: a source PDF slice plus its live pipeline state.
///
/// Cloning shares the state (the `Arc`), which is how the scheduler hands
/// a chunk to its owning task while the aggregator keeps reading it.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position in the original page order; stable identity used to
    /// reassemble outputs regardless of completion order.
    pub index: usize,
    /// Path to this chunk's input (a derived temp file, or the original).
    pub source: PathBuf,
    /// Shared with the status aggregator.
    pub state: Arc<ChunkState>,
}

impl Chunk {
    pub fn new(index: usize, source: PathBuf) -> Self {
        Self {
            index,
            source,
            state: Arc::new(ChunkState::new()),
        }
    }
}

/// Aggregate state for one conversion run.
///
/// Constructed once per run by the lifecycle controller and threaded
/// explicitly to the scheduler and the status aggregator — no globals.
#[derive(Debug)]
pub struct Job {
    chunks: Vec<Chunk>,
    active: Arc<AtomicUsize>,
    cap: usize,
}

impl Job {
    /// Build a job from the planner's ordered chunk sources.
    ///
    /// Indices are dense over `[0, n)` in source order; the chunk sequence
    /// never grows or shrinks after this point.
    pub fn new(sources: Vec<PathBuf>, cap: usize) -> Self {
        let chunks = sources
            .into_iter()
            .enumerate()
            .map(|(index, source)| Chunk::new(index, source))
            .collect();
        Self {
            chunks,
            active: Arc::new(AtomicUsize::new(0)),
            cap,
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Maximum number of chunks allowed past admission at once.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Count of chunks currently past admission and not yet finished.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Handle for the scheduler's admission bookkeeping.
    pub(crate) fn active_handle(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }
}

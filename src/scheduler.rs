//! The pipeline scheduler: bounded concurrency, order-preserving collection.
//!
//! One task is spawned per chunk. Admission is a counting semaphore of
//! `concurrency` permits: a chunk leaves `Pending` only while fewer than the
//! cap are active, and the permit is held for the chunk's whole pipeline, so
//! at no instant are more than the cap in flight. Pipelines complete in any
//! order; results are written into a slot keyed by the chunk's original
//! index, so the caller always consumes outputs in ascending index order.
//!
//! Failure is fail-fast: the first chunk error aborts every remaining task
//! and fails the run. Resources the aborted chunks had already created are
//! registered with the tracker and get deleted during teardown; remote calls
//! that were in flight at abort time are not waited for.

use crate::config::ConversionConfig;
use crate::error::DriveOcrError;
use crate::job::Job;
use crate::pipeline::stage;
use crate::remote::{RemoteId, RemoteStore};
use crate::resources::ResourceTracker;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Run every chunk pipeline and return the outputs in original index order.
pub async fn run_pipelines(
    remote: &Arc<dyn RemoteStore>,
    folder: &RemoteId,
    job: &Job,
    tracker: &ResourceTracker,
    config: &ConversionConfig,
) -> Result<Vec<PathBuf>, DriveOcrError> {
    let semaphore = Arc::new(Semaphore::new(job.cap()));
    let active = job.active_handle();
    let mut tasks: JoinSet<Result<(usize, PathBuf), DriveOcrError>> = JoinSet::new();

    info!(
        "scheduling {} chunk pipelines, at most {} concurrent",
        job.len(),
        job.cap()
    );

    for chunk in job.chunks() {
        let chunk = chunk.clone();
        let remote = Arc::clone(remote);
        let folder = folder.clone();
        let tracker = tracker.clone();
        let config = config.clone();
        let semaphore = Arc::clone(&semaphore);
        let active = Arc::clone(&active);

        tasks.spawn(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| DriveOcrError::Internal("admission semaphore closed".into()))?;
            active.fetch_add(1, Ordering::AcqRel);
            debug!("chunk {} admitted", chunk.index);

            let result = stage::process_chunk(&remote, &folder, &chunk, &tracker, &config).await;

            active.fetch_sub(1, Ordering::AcqRel);
            drop(permit);
            result.map(|output| (chunk.index, output))
        });
    }

    let mut outputs: Vec<Option<PathBuf>> = vec![None; job.len()];

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok((index, output))) => {
                outputs[index] = Some(output);
            }
            Ok(Err(e)) => {
                // First failure wins; abandon the rest of the run.
                tasks.abort_all();
                return Err(e);
            }
            Err(join_err) if join_err.is_cancelled() => {}
            Err(join_err) => {
                tasks.abort_all();
                return Err(DriveOcrError::Internal(format!(
                    "chunk task panicked: {join_err}"
                )));
            }
        }
    }

    outputs
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.ok_or_else(|| DriveOcrError::Internal(format!("chunk {i} produced no output")))
        })
        .collect()
}

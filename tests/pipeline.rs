//! End-to-end pipeline tests against a scripted in-memory remote store.
//!
//! The scripted store never talks to the network: upload delays are set per
//! chunk so completion order differs from submission order, and stage
//! failures can be injected at the OCR copy step.

use async_trait::async_trait;
use driveocr::{
    ChunkStage, ConversionConfig, Converter, DriveOcrError, Job, RemoteId, RemoteStore,
    ResourceTracker,
};
use driveocr::remote::ProgressFn;
use driveocr::scheduler::run_pipelines;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Chunk sources carry a numeric suffix (`ord0.pdf`, `cap3.pdf`, …); the
/// store keys its script off that index. Uploads become `up-{i}`, OCR
/// copies become `doc-{i}`, and exports write `content-{i}` to the
/// destination file.
struct ScriptedRemote {
    /// Per-chunk upload delay in milliseconds, indexed by chunk index.
    upload_delays_ms: Vec<u64>,
    /// Inject a failure at the OCR copy step for this chunk index.
    fail_convert_for: Option<usize>,
    /// Chunks currently between upload start and export end.
    active: AtomicUsize,
    max_active: AtomicUsize,
    deleted_files: Mutex<Vec<String>>,
    deleted_folders: AtomicUsize,
}

impl ScriptedRemote {
    fn new(upload_delays_ms: Vec<u64>) -> Arc<Self> {
        Arc::new(Self {
            upload_delays_ms,
            fail_convert_for: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            deleted_files: Mutex::new(Vec::new()),
            deleted_folders: AtomicUsize::new(0),
        })
    }

    fn failing_at(upload_delays_ms: Vec<u64>, chunk: usize) -> Arc<Self> {
        let mut remote = Self::new(upload_delays_ms);
        Arc::get_mut(&mut remote).unwrap().fail_convert_for = Some(chunk);
        remote
    }

    fn deleted_files(&self) -> Vec<String> {
        self.deleted_files.lock().unwrap().clone()
    }
}

fn index_of(name: &str) -> usize {
    name.trim_start_matches(|b: char| !b.is_ascii_digit())
        .parse()
        .expect("scripted names carry an index")
}

#[async_trait]
impl RemoteStore for ScriptedRemote {
    async fn create_folder(&self, _name: &str) -> Result<RemoteId, DriveOcrError> {
        Ok(RemoteId::from("folder-1"))
    }

    async fn delete_folder(&self, _id: &RemoteId) -> Result<(), DriveOcrError> {
        self.deleted_folders.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_file(
        &self,
        path: &Path,
        _parent: &RemoteId,
        progress: ProgressFn<'_>,
    ) -> Result<RemoteId, DriveOcrError> {
        let idx = index_of(path.file_stem().unwrap().to_str().unwrap());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        progress(0);
        let delay = self.upload_delays_ms.get(idx).copied().unwrap_or(10);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        progress(100);
        Ok(RemoteId(format!("up-{idx}")))
    }

    async fn copy_with_transform(
        &self,
        id: &RemoteId,
        _target_mime: &str,
        _parent: &RemoteId,
        _ocr_language: Option<&str>,
    ) -> Result<RemoteId, DriveOcrError> {
        let idx = index_of(&id.0);
        if self.fail_convert_for == Some(idx) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(DriveOcrError::RemoteApi {
                op: "files.copy",
                detail: "scripted conversion failure".into(),
            });
        }
        Ok(RemoteId(format!("doc-{idx}")))
    }

    async fn export_to_file(
        &self,
        id: &RemoteId,
        _export_mime: &str,
        dest: &Path,
    ) -> Result<(), DriveOcrError> {
        let idx = index_of(&id.0);
        tokio::fs::write(dest, format!("content-{idx}"))
            .await
            .map_err(|e| DriveOcrError::Internal(e.to_string()))?;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_file(&self, id: &RemoteId) -> Result<(), DriveOcrError> {
        self.deleted_files.lock().unwrap().push(id.0.clone());
        Ok(())
    }
}

fn sources(dir: &Path, prefix: &str, n: usize) -> Vec<PathBuf> {
    (0..n).map(|i| dir.join(format!("{prefix}{i}.pdf"))).collect()
}

fn config() -> ConversionConfig {
    ConversionConfig::builder().build().unwrap()
}

#[tokio::test]
async fn outputs_follow_index_order_not_completion_order() {
    // Chunk 2 finishes first, chunk 1 last.
    let remote = ScriptedRemote::new(vec![300, 600, 50]);
    let store: Arc<dyn RemoteStore> = remote.clone();
    let dir = tempfile::tempdir().unwrap();
    let job = Job::new(sources(dir.path(), "ord", 3), 3);
    let tracker = ResourceTracker::new();
    let folder = RemoteId::from("folder-1");

    let outputs = run_pipelines(&store, &folder, &job, &tracker, &config())
        .await
        .unwrap();

    assert_eq!(outputs.len(), 3);
    for (i, path) in outputs.iter().enumerate() {
        let body = tokio::fs::read_to_string(path).await.unwrap();
        assert_eq!(body, format!("content-{i}"), "slot {i} holds {body}");
    }
    for chunk in job.chunks() {
        assert_eq!(chunk.state.stage(), ChunkStage::Done);
    }

    assert!(tracker.teardown(store.as_ref()).await);
}

#[tokio::test]
async fn concurrency_never_exceeds_the_cap() {
    let remote = ScriptedRemote::new(vec![50; 5]);
    let store: Arc<dyn RemoteStore> = remote.clone();
    let dir = tempfile::tempdir().unwrap();
    let job = Job::new(sources(dir.path(), "cap", 5), 2);
    let tracker = ResourceTracker::new();
    let folder = RemoteId::from("folder-1");

    let config = ConversionConfig::builder().concurrency(2).build().unwrap();
    run_pipelines(&store, &folder, &job, &tracker, &config)
        .await
        .unwrap();

    assert_eq!(remote.max_active.load(Ordering::SeqCst), 2);
    tracker.teardown(store.as_ref()).await;
}

#[tokio::test]
async fn first_failure_aborts_the_run_and_leaves_resources_tracked() {
    // Chunk 0 uploads well before chunk 1 reaches its failing OCR copy, so
    // its remote object is registered by the time the run aborts.
    let remote = ScriptedRemote::failing_at(vec![5, 60, 400], 1);
    let store: Arc<dyn RemoteStore> = remote.clone();
    let dir = tempfile::tempdir().unwrap();
    let job = Job::new(sources(dir.path(), "abort", 3), 3);
    let tracker = ResourceTracker::new();
    let folder = RemoteId::from("folder-1");

    let err = run_pipelines(&store, &folder, &job, &tracker, &config())
        .await
        .unwrap_err();
    match err {
        DriveOcrError::StageFailed { chunk, stage, .. } => {
            assert_eq!(chunk, 1);
            assert_eq!(stage, ChunkStage::Converting);
        }
        other => panic!("expected StageFailed, got {other}"),
    }
    assert_eq!(job.chunks()[1].state.stage(), ChunkStage::Failed);

    // Both the failed chunk's upload and the aborted peer's upload were
    // registered before the failure, so teardown deletes them.
    let tracked = tracker.remote_ids();
    assert!(tracked.contains(&RemoteId::from("up-1")));
    assert!(
        tracked.contains(&RemoteId::from("up-0")),
        "peer upload must be tracked, got {tracked:?}"
    );
    tracker.teardown(store.as_ref()).await;
    let deleted = remote.deleted_files();
    assert!(deleted.contains(&"up-1".to_string()));
    assert!(deleted.contains(&"up-0".to_string()), "got {deleted:?}");
}

#[tokio::test]
async fn converter_run_cleans_up_everything_on_success() {
    let remote = ScriptedRemote::new(vec![10]);
    let store: Arc<dyn RemoteStore> = remote.clone();
    let dir = tempfile::tempdir().unwrap();

    // Small enough to skip splitting; the single chunk is the input itself.
    let input = dir.path().join("ok0.pdf");
    tokio::fs::write(&input, b"%PDF-1.4\nscripted body\n")
        .await
        .unwrap();
    let output = dir.path().join("out.docx");

    let converter = Converter::new(store, config());
    let stats = converter.convert_to_file(&input, &output).await.unwrap();

    assert_eq!(stats.chunk_count, 1);
    // Single part: the export is copied as-is, the merger never runs.
    let body = tokio::fs::read_to_string(&output).await.unwrap();
    assert_eq!(body, "content-0");

    // Teardown ran exactly once: scratch folder gone, a second attempt
    // latches out.
    assert_eq!(remote.deleted_folders.load(Ordering::SeqCst), 1);
    assert!(!converter.tracker().teardown(remote.as_ref() as &dyn RemoteStore).await);
    assert_eq!(remote.deleted_folders.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_run_writes_no_output_and_still_cleans_up() {
    let remote = ScriptedRemote::failing_at(vec![10], 0);
    let store: Arc<dyn RemoteStore> = remote.clone();
    let dir = tempfile::tempdir().unwrap();

    let input = dir.path().join("bad0.pdf");
    tokio::fs::write(&input, b"%PDF-1.4\nscripted body\n")
        .await
        .unwrap();
    let output = dir.path().join("out.docx");

    let converter = Converter::new(store, config());
    let err = converter.convert_to_file(&input, &output).await.unwrap_err();
    assert!(matches!(err, DriveOcrError::StageFailed { chunk: 0, .. }));

    assert!(!output.exists(), "a failed run must not leave an output file");
    assert_eq!(remote.deleted_folders.load(Ordering::SeqCst), 1);
    // The uploaded object was registered before the failure and got deleted.
    assert!(remote.deleted_files().contains(&"up-0".to_string()));
}

#[tokio::test]
async fn interrupted_style_teardown_is_idempotent_with_run_teardown() {
    // Mirrors the binary's signal path: two actors race to tear down the
    // same tracker; exactly one wins.
    let remote = ScriptedRemote::new(vec![10, 10]);
    let store: Arc<dyn RemoteStore> = remote.clone();
    let tracker = ResourceTracker::new();
    tracker.add_remote(RemoteId::from("up-0"));
    tracker.set_scratch_folder(RemoteId::from("folder-1"));

    let first = tracker.teardown(store.as_ref()).await;
    let second = tracker.teardown(store.as_ref()).await;
    assert!(first);
    assert!(!second);
    assert_eq!(remote.deleted_folders.load(Ordering::SeqCst), 1);
    assert_eq!(remote.deleted_files().len(), 1);
}

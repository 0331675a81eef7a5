//! Resource tracking and one-shot teardown.
//!
//! Every externally-visible allocation a run makes — derived chunk files,
//! downloaded part files, uploaded and converted Drive objects, the remote
//! scratch folder — is registered here the moment it exists, before any
//! later failure can leak it. Teardown is a single best-effort pass over
//! everything registered, guarded by a one-shot latch so that normal
//! completion, a fatal error, and a cancellation signal can all request it
//! and only the first actually runs.

use crate::remote::{RemoteId, RemoteStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct ResourceSet {
    local_paths: Vec<PathBuf>,
    remote_ids: Vec<RemoteId>,
    scratch_folder: Option<RemoteId>,
}

/// Cheaply clonable handle to the run's resource set.
///
/// Chunk tasks append concurrently; the set only grows until teardown.
#[derive(Debug, Clone)]
pub struct ResourceTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    set: Mutex<ResourceSet>,
    torn_down: AtomicBool,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                set: Mutex::new(ResourceSet::default()),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Register a local temp path for deletion during teardown.
    pub fn add_local(&self, path: PathBuf) {
        self.inner.set.lock().unwrap().local_paths.push(path);
    }

    /// Register a remote object for deletion during teardown.
    pub fn add_remote(&self, id: RemoteId) {
        self.inner.set.lock().unwrap().remote_ids.push(id);
    }

    /// Register the run's remote scratch folder.
    pub fn set_scratch_folder(&self, id: RemoteId) {
        self.inner.set.lock().unwrap().scratch_folder = Some(id);
    }

    /// Snapshot of registered local paths (primarily for assertions).
    pub fn local_paths(&self) -> Vec<PathBuf> {
        self.inner.set.lock().unwrap().local_paths.clone()
    }

    /// Snapshot of registered remote ids (primarily for assertions).
    pub fn remote_ids(&self) -> Vec<RemoteId> {
        self.inner.set.lock().unwrap().remote_ids.clone()
    }

    /// Remove every tracked resource, best-effort, exactly once per run.
    ///
    /// Individual deletion failures are logged and skipped; a member that
    /// was registered but never actually created is not an error. Returns
    /// `true` if this call performed the pass, `false` if a previous call
    /// already did (or is doing) it.
    pub async fn teardown(&self, remote: &dyn RemoteStore) -> bool {
        if self
            .inner
            .torn_down
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("teardown already performed; skipping");
            return false;
        }

        // Snapshot under the lock, then release it before any awaits.
        let set = {
            let mut guard = self.inner.set.lock().unwrap();
            std::mem::take(&mut *guard)
        };

        info!(
            locals = set.local_paths.len(),
            remotes = set.remote_ids.len(),
            "cleaning up run resources"
        );

        for path in &set.local_paths {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("removed temp file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("temp file {} was never created", path.display());
                }
                Err(e) => warn!("could not remove temp file {}: {}", path.display(), e),
            }
        }

        for id in &set.remote_ids {
            if let Err(e) = remote.delete_file(id).await {
                warn!("could not delete remote object {id}: {e}");
            }
        }

        if let Some(folder) = &set.scratch_folder {
            if let Err(e) = remote.delete_folder(folder).await {
                warn!("could not delete scratch folder {folder}: {e}");
            }
        }

        true
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

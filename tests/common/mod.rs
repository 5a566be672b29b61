//! Fake data-mover engine for end-to-end coordinator tests. Stands in for
//! the real `rclone rcd` process the production facade talks to.

use conveyor::model::FileRecord;
use conveyor::mover::{CopyOutcome, Mover, MoverError};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct FakeMover {
    manifests: Mutex<HashMap<String, Vec<FileRecord>>>,
    always_fail_paths: Mutex<HashSet<String>>,
    copy_log: Mutex<Vec<String>>,
}

impl FakeMover {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_manifest(self, fs: &str, files: Vec<FileRecord>) -> Self {
        self.manifests.lock().unwrap().insert(fs.to_string(), files);
        self
    }

    pub fn fail_path_forever(self, path: &str) -> Self {
        self.always_fail_paths.lock().unwrap().insert(path.to_string());
        self
    }

    pub fn copy_count(&self) -> usize {
        self.copy_log.lock().unwrap().len()
    }

    pub fn copies(&self) -> Vec<String> {
        self.copy_log.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Mover for FakeMover {
    async fn list(&self, fs: &str, _remote: &str, _recursive: bool) -> Result<Vec<FileRecord>, MoverError> {
        Ok(self.manifests.lock().unwrap().get(fs).cloned().unwrap_or_default())
    }

    async fn copy_and_wait_boxed(
        &self,
        _src_fs: &str,
        src_remote: &str,
        _dst_fs: &str,
        _dst_remote: &str,
        _shutdown: &CancellationToken,
    ) -> Result<CopyOutcome, MoverError> {
        self.copy_log.lock().unwrap().push(src_remote.to_string());

        if self.always_fail_paths.lock().unwrap().contains(src_remote) {
            return Ok(CopyOutcome::Failed("simulated transient failure".to_string()));
        }
        Ok(CopyOutcome::Success)
    }
}

pub fn file(path: &str, size: u64) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        name: path.rsplit('/').next().unwrap_or(path).to_string(),
        size,
        mod_time: "2024-01-01T00:00:00Z".to_string(),
        mime_type: None,
        is_dir: false,
    }
}

/// Polls `status()` until the job reaches a terminal state or the overall
/// timeout elapses.
pub async fn wait_for_terminal(coordinator: &conveyor::coordinator::Coordinator, timeout: std::time::Duration) -> conveyor::coordinator::status::StatusSnapshot {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let snap = coordinator.status().await;
        if matches!(snap.status.as_str(), "completed" | "aborted" | "dry_run_complete") {
            return snap;
        }
        if tokio::time::Instant::now() >= deadline {
            return snap;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

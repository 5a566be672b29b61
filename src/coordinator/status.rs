//! Point-in-time job snapshot.

use super::job::{FailedFile, Job, JobStatus};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FailedFileSnapshot {
    pub path: String,
    pub reason: String,
    pub attempts: u32,
}

impl From<&FailedFile> for FailedFileSnapshot {
    fn from(f: &FailedFile) -> Self {
        FailedFileSnapshot {
            path: f.file.path.clone(),
            reason: f.reason.clone(),
            attempts: f.attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub job_id: Option<String>,
    pub status: String,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub total_files: u64,
    pub completed: u64,
    pub failed: u64,
    pub queued: u64,
    pub total_bytes: u64,
    pub transferred_bytes: u64,
    pub progress_percent: f64,
    pub active_workers: u64,
    pub elapsed_seconds: u64,
    pub throughput_mb_s: f64,
    pub failed_files: Vec<FailedFileSnapshot>,
}

impl StatusSnapshot {
    /// Snapshot of the `idle` state: no job has ever run, or the last job
    /// result has not been requested yet.
    pub fn idle() -> Self {
        StatusSnapshot {
            job_id: None,
            status: "idle".to_string(),
            source: None,
            destination: None,
            total_files: 0,
            completed: 0,
            failed: 0,
            queued: 0,
            total_bytes: 0,
            transferred_bytes: 0,
            progress_percent: 0.0,
            active_workers: 0,
            elapsed_seconds: 0,
            throughput_mb_s: 0.0,
            failed_files: Vec::new(),
        }
    }

    /// Computed from a live `Job`; throughput is transferred_bytes /
    /// elapsed / 1e6.
    pub fn from_job(job: &Job) -> Self {
        let elapsed = (chrono::Utc::now() - job.start_time).num_seconds().max(0) as u64;
        let progress_percent = if job.total_bytes == 0 {
            100.0
        } else {
            (job.transferred_bytes as f64 / job.total_bytes as f64) * 100.0
        };
        let throughput_mb_s = if elapsed == 0 {
            0.0
        } else {
            job.transferred_bytes as f64 / elapsed as f64 / 1e6
        };

        StatusSnapshot {
            job_id: Some(job.id.clone()),
            status: status_label(job.status).to_string(),
            source: Some(job.source.clone()),
            destination: Some(job.destination.clone()),
            total_files: job.total_files,
            completed: job.completed.len() as u64,
            failed: job.failed.len() as u64,
            queued: job.queue.len() as u64,
            total_bytes: job.total_bytes,
            transferred_bytes: job.transferred_bytes,
            progress_percent,
            active_workers: job.active_workers.len() as u64,
            elapsed_seconds: elapsed,
            throughput_mb_s,
            failed_files: job.failed.iter().map(FailedFileSnapshot::from).collect(),
        }
    }
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Idle => "idle",
        JobStatus::Running => "running",
        JobStatus::Paused => "paused",
        JobStatus::Completed => "completed",
        JobStatus::Aborted => "aborted",
        JobStatus::DryRunComplete => "dry_run_complete",
    }
}

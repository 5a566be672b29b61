//! Job and work-item data model for the transfer coordinator.

use crate::model::FileRecord;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use uuid::Uuid;

/// `idle -> running -> (paused <-> running)* -> completed | aborted`, with
/// a `dry_run` short-circuit straight to `dry_run_complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Paused,
    Completed,
    Aborted,
    DryRunComplete,
}

impl JobStatus {
    /// A job is terminal iff its status is one of these AND both the
    /// worker set and queue are empty; the latter half lives in
    /// `Job::is_terminal`.
    pub fn is_terminal_status(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Aborted | JobStatus::DryRunComplete)
    }
}

/// `attempts` counts the attempt currently in flight or just reported,
/// starting at 1 for a file's first try and incrementing on each retry.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub file: FileRecord,
    pub attempts: u32,
}

impl WorkItem {
    pub fn new(file: FileRecord) -> Self {
        WorkItem { file, attempts: 1 }
    }
}

/// A file that exhausted its retry budget.
#[derive(Debug, Clone)]
pub struct FailedFile {
    pub file: FileRecord,
    pub reason: String,
    pub attempts: u32,
}

/// User-supplied options to `start`.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub workers: Option<usize>,
    pub dry_run: bool,
    pub largest_first: bool,
    pub enumerate_first: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            workers: None,
            dry_run: false,
            largest_first: true,
            enumerate_first: true,
        }
    }
}

/// A single running or completed coordinator job.
#[derive(Debug)]
pub struct Job {
    pub id: String,
    pub source: String,
    pub destination: String,
    pub status: JobStatus,
    pub options: JobOptions,

    pub queue: VecDeque<WorkItem>,
    /// worker id -> file currently in flight on that worker, if any.
    pub active_workers: std::collections::HashMap<usize, Option<FileRecord>>,

    pub completed: Vec<FileRecord>,
    pub failed: Vec<FailedFile>,
    pub ignored_count: u64,
    pub ghost_linked_count: u64,
    pub lost_to_worker_death_count: u64,

    pub total_files: u64,
    pub total_bytes: u64,
    pub transferred_bytes: u64,

    pub start_time: DateTime<Utc>,
}

impl Job {
    pub fn new(source: String, destination: String, options: JobOptions) -> Self {
        Job {
            id: Uuid::new_v4().to_string(),
            source,
            destination,
            status: JobStatus::Idle,
            options,
            queue: VecDeque::new(),
            active_workers: std::collections::HashMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            ignored_count: 0,
            ghost_linked_count: 0,
            lost_to_worker_death_count: 0,
            total_files: 0,
            total_bytes: 0,
            transferred_bytes: 0,
            start_time: Utc::now(),
        }
    }

    /// Terminal iff status is terminal AND both worker set and queue are
    /// empty.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal_status() && self.active_workers.is_empty() && self.queue.is_empty()
    }

    /// Total accounted for so far across every bucket a file can land in.
    pub fn accounted_for(&self) -> u64 {
        self.completed.len() as u64
            + self.failed.len() as u64
            + self.ignored_count
            + self.ghost_linked_count
            + self.lost_to_worker_death_count
            + self.queue.len() as u64
            + self.active_workers.values().filter(|f| f.is_some()).count() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileRecord;

    fn file(path: &str, size: u64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            name: path.to_string(),
            size,
            mod_time: "2024-01-01T00:00:00Z".into(),
            mime_type: None,
            is_dir: false,
        }
    }

    #[test]
    fn test_new_job_is_idle_and_not_terminal() {
        let job = Job::new("src".into(), "dst".into(), JobOptions::default());
        assert_eq!(job.status, JobStatus::Idle);
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_terminal_requires_empty_queue_and_workers() {
        let mut job = Job::new("src".into(), "dst".into(), JobOptions::default());
        job.status = JobStatus::Completed;
        assert!(job.is_terminal());

        job.queue.push_back(WorkItem::new(file("a.txt", 10)));
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_accounted_for_sums_every_bucket() {
        let mut job = Job::new("src".into(), "dst".into(), JobOptions::default());
        job.completed.push(file("a.txt", 1));
        job.failed.push(FailedFile { file: file("b.txt", 1), reason: "x".into(), attempts: 3 });
        job.ignored_count = 1;
        job.ghost_linked_count = 1;
        job.lost_to_worker_death_count = 1;
        job.queue.push_back(WorkItem::new(file("c.txt", 1)));
        job.active_workers.insert(0, Some(file("d.txt", 1)));

        assert_eq!(job.accounted_for(), 7);
    }
}

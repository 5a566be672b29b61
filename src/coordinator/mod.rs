//! Transfer coordinator — single-job orchestrator: enumerate → classify →
//! queue → dispatch to workers → track completion.
//!
//! Realised as a genuine actor: a `tokio::spawn`ed task owns the one
//! `Job`, consuming commands (public API calls and worker events) off a
//! single `mpsc` channel so every mutation is totally ordered. This is the
//! one component in the crate that uses the actor shape rather than
//! `Arc<RwLock<_>>>`, scaled up from a per-connection task-owns-state
//! pattern to a dedicated command loop instead of a per-connection socket
//! loop.

pub mod job;
pub mod status;

use crate::classify::{self, Ruleset};
use crate::credential::CredentialPool;
use crate::error::CoordinatorError;
use crate::model::{FileRecord, Provider};
use crate::mover::Mover;
use crate::worker::{self, WorkerEvent, WorkerHandle};
use job::{FailedFile, Job, JobOptions, JobStatus, WorkItem};
use status::StatusSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;
const MIN_WORKERS: usize = 1;
const MAX_WORKERS: usize = 32;
/// How long a worker task gets to best-effort stop its in-flight mover job
/// after `shutdown` is cancelled before it's hard-aborted.
const ABORT_GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

enum Message {
    Start {
        source: String,
        destination: String,
        options: JobOptions,
        reply: oneshot::Sender<Result<String, CoordinatorError>>,
    },
    Status {
        reply: oneshot::Sender<StatusSnapshot>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Abort {
        reply: oneshot::Sender<Result<(), CoordinatorError>>,
    },
    Worker(WorkerEvent),
}

/// Clonable handle to the coordinator actor. Every public operation sends
/// a message and awaits a reply, so callers observe total ordering even
/// though the handle itself is freely shareable.
#[derive(Clone)]
pub struct Coordinator {
    tx: mpsc::Sender<Message>,
    status_rx: watch::Receiver<StatusSnapshot>,
}

impl Coordinator {
    pub fn spawn(
        mover: Arc<dyn Mover>,
        pool: CredentialPool,
        ruleset: Ruleset,
        max_retries: u32,
    ) -> Self {
        Self::spawn_with_options(mover, pool, ruleset, max_retries, false)
    }

    /// Like [`Self::spawn`] but also controls whether a file in flight on a
    /// worker that dies unexpectedly is re-queued (`true`) or recorded as
    /// lost (`false`, the default).
    pub fn spawn_with_options(
        mover: Arc<dyn Mover>,
        pool: CredentialPool,
        ruleset: Ruleset,
        max_retries: u32,
        worker_death_requeue: bool,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::idle());

        let actor = Actor {
            mover,
            pool,
            ruleset,
            max_retries: if max_retries == 0 { MAX_RETRIES } else { max_retries },
            worker_death_requeue,
            job: None,
            workers: HashMap::new(),
            self_tx: tx.clone(),
            status_tx,
            shutdown: CancellationToken::new(),
        };

        tokio::spawn(actor.run(rx));

        Coordinator { tx, status_rx }
    }

    pub async fn start(&self, source: String, destination: String, options: JobOptions) -> Result<String, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Start { source, destination, options, reply })
            .await
            .map_err(|_| CoordinatorError::NoActiveJob)?;
        rx.await.map_err(|_| CoordinatorError::NoActiveJob)?
    }

    pub async fn status(&self) -> StatusSnapshot {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Message::Status { reply }).await.is_err() {
            return StatusSnapshot::idle();
        }
        rx.await.unwrap_or_else(|_| StatusSnapshot::idle())
    }

    /// A live-updating view of the current job, for CLI progress polling
    /// without round-tripping through the actor each tick.
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status_rx.clone()
    }

    pub async fn pause(&self) -> Result<(), CoordinatorError> {
        self.roundtrip(Message::Pause).await
    }

    pub async fn resume(&self) -> Result<(), CoordinatorError> {
        self.roundtrip(Message::Resume).await
    }

    pub async fn abort(&self) -> Result<(), CoordinatorError> {
        self.roundtrip(Message::Abort).await
    }

    async fn roundtrip(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), CoordinatorError>>) -> Message,
    ) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| CoordinatorError::NoActiveJob)?;
        rx.await.map_err(|_| CoordinatorError::NoActiveJob)?
    }
}

struct Actor {
    mover: Arc<dyn Mover>,
    pool: CredentialPool,
    ruleset: Ruleset,
    max_retries: u32,
    worker_death_requeue: bool,
    job: Option<Job>,
    workers: HashMap<usize, WorkerHandle>,
    self_tx: mpsc::Sender<Message>,
    status_tx: watch::Sender<StatusSnapshot>,
    shutdown: CancellationToken,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Message::Start { source, destination, options, reply } => {
                    let result = self.handle_start(source, destination, options).await;
                    let _ = reply.send(result);
                }
                Message::Status { reply } => {
                    let snapshot = self.snapshot();
                    let _ = reply.send(snapshot);
                }
                Message::Pause { reply } => {
                    let _ = reply.send(self.handle_pause());
                }
                Message::Resume { reply } => {
                    let _ = reply.send(self.handle_resume());
                }
                Message::Abort { reply } => {
                    let result = self.handle_abort().await;
                    let _ = reply.send(result);
                }
                Message::Worker(event) => self.handle_worker_event(event).await,
            }
            self.publish_status();
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        match &self.job {
            Some(job) => StatusSnapshot::from_job(job),
            None => StatusSnapshot::idle(),
        }
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.snapshot());
    }

    fn handle_pause(&mut self) -> Result<(), CoordinatorError> {
        match &mut self.job {
            Some(job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Paused;
                Ok(())
            }
            // Pausing between the last completion and the terminal
            // transition is idempotent (no-op), not an error.
            Some(job) if job.status == JobStatus::Paused => Ok(()),
            _ => Err(CoordinatorError::NoActiveJob),
        }
    }

    fn handle_resume(&mut self) -> Result<(), CoordinatorError> {
        match &mut self.job {
            Some(job) if job.status == JobStatus::Paused => {
                job.status = JobStatus::Running;
                Ok(())
            }
            _ => Err(CoordinatorError::NoActiveJob),
        }
    }

    async fn handle_abort(&mut self) -> Result<(), CoordinatorError> {
        let Some(job) = &mut self.job else {
            return Err(CoordinatorError::NoActiveJob);
        };
        if !matches!(job.status, JobStatus::Running | JobStatus::Paused) {
            return Err(CoordinatorError::NoActiveJob);
        }

        job.status = JobStatus::Aborted;
        job.queue.clear();

        // Cancelling gives an in-flight copy a chance to best-effort
        // `job/stop` the mover job before its worker task exits.
        self.shutdown.cancel();

        for (_, handle) in self.workers.drain() {
            handle.stop().await;
            let abort_handle = handle.abort_handle.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ABORT_GRACE_PERIOD).await;
                abort_handle.abort();
            });
        }
        if let Some(job) = &mut self.job {
            job.active_workers.clear();
        }

        info!(job_id = %job.id, "job aborted");
        Ok(())
    }

    async fn handle_start(&mut self, source: String, destination: String, options: JobOptions) -> Result<String, CoordinatorError> {
        if let Some(job) = &self.job {
            if !job.is_terminal() {
                return Err(CoordinatorError::TransferInProgress);
            }
        }

        let mut job = Job::new(source.clone(), destination.clone(), options.clone());

        // 1. Enumerate.
        let manifest: Vec<FileRecord> = if options.enumerate_first {
            self.mover
                .list(&source, "", true)
                .await
                .map_err(|e| CoordinatorError::EnumerationFailed(e.to_string()))?
        } else {
            Vec::new()
        };

        // 2. Sort largest-first.
        let mut manifest = manifest;
        if options.largest_first {
            manifest.sort_by(|a, b| b.size.cmp(&a.size));
        }

        // 3. Partition via the classification oracle.
        let partition = classify::partition(manifest.iter().cloned(), self.ruleset);
        job.total_files = partition.transfer.len() as u64 + partition.link.len() as u64;
        job.total_bytes = partition.transfer.iter().map(|f| f.size).sum();
        job.ignored_count = partition.ignore.len() as u64;
        job.ghost_linked_count = partition.link.len() as u64;

        // Ghost-linked files are handed to the (out-of-scope) ghost
        // collaborator synchronously; here that's a no-op placeholder, so
        // they are simply counted as accounted for.
        for (file, _target) in &partition.link {
            let _ = file;
        }

        // 4. Queue in sort order (already largest-first since manifest was sorted).
        job.queue = partition.transfer.into_iter().map(WorkItem::new).collect();

        // 5. Cost warning (not fatal).
        let destination_provider = Provider::from_fs(&destination);
        if let crate::model::Quota::Limited(remaining) = self.pool.total_remaining(&destination_provider).await {
            if job.total_bytes > remaining && remaining > 0 {
                let days_needed = (job.total_bytes as f64 / remaining as f64).ceil();
                warn!(
                    job_id = %job.id,
                    total_bytes = job.total_bytes,
                    remaining,
                    days_needed,
                    "manifest exceeds aggregate daily quota for destination provider"
                );
            }
        }

        // 6. Dry-run short circuit.
        if options.dry_run {
            job.status = JobStatus::DryRunComplete;
            let id = job.id.clone();
            self.job = Some(job);
            return Ok(id);
        }

        // 7. Worker count.
        let credentials_for_dest = self.pool.count_for(&destination_provider).await;
        let worker_count = match options.workers {
            Some(n) => n.clamp(MIN_WORKERS, MAX_WORKERS),
            None => (credentials_for_dest.max(1)).clamp(MIN_WORKERS, MAX_WORKERS),
        };

        job.status = JobStatus::Running;
        let job_id = job.id.clone();
        self.job = Some(job);
        self.shutdown = CancellationToken::new();

        // 8. Spawn workers.
        let (events_tx, mut events_rx) = mpsc::channel(256);
        for worker_id in 0..worker_count {
            let handle = worker::spawn(
                worker_id,
                destination_provider.clone(),
                Arc::clone(&self.mover),
                self.pool.clone(),
                source.clone(),
                destination.clone(),
                events_tx.clone(),
                self.shutdown.clone(),
            );
            self.workers.insert(worker_id, handle);
            if let Some(job) = &mut self.job {
                job.active_workers.insert(worker_id, None);
            }
        }

        // Forward worker events back into the actor's own mailbox so every
        // mutation, worker-originated or not, serialises through `run`.
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if self_tx.send(Message::Worker(event)).await.is_err() {
                    break;
                }
            }
        });

        // 9. Initial dispatch: one item per worker.
        self.dispatch_available();

        Ok(job_id)
    }

    /// Sends queued work items to any worker not currently holding one,
    /// while the job is `running`.
    fn dispatch_available(&mut self) {
        let Some(job) = &mut self.job else { return };
        if job.status != JobStatus::Running {
            return;
        }

        let idle_worker_ids: Vec<usize> = job
            .active_workers
            .iter()
            .filter(|(_, file)| file.is_none())
            .map(|(id, _)| *id)
            .collect();

        for worker_id in idle_worker_ids {
            let Some(item) = job.queue.pop_front() else { break };
            let Some(handle) = self.workers.get(&worker_id) else { continue };
            let file = item.file.clone();
            let tx = handle.tx.clone();
            job.active_workers.insert(worker_id, Some(file));
            let item_for_send = item;
            tokio::spawn(async move {
                let _ = tx.send(crate::worker::WorkerCommand::Job(item_for_send)).await;
            });
        }
    }

    async fn handle_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Completed { worker_id, file, bytes } => {
                if let Some(job) = &mut self.job {
                    job.completed.push(file);
                    job.transferred_bytes += bytes;
                    job.active_workers.insert(worker_id, None);
                }
                self.dispatch_available();
                self.finish_if_terminal();
            }
            WorkerEvent::Failed { worker_id, file, reason, attempts, retryable } => {
                if let Some(job) = &mut self.job {
                    if retryable && attempts < self.max_retries {
                        job.queue.push_front(WorkItem { file, attempts: attempts + 1 });
                    } else {
                        job.failed.push(FailedFile { file, reason, attempts });
                    }
                    job.active_workers.insert(worker_id, None);
                }
                self.dispatch_available();
                self.finish_if_terminal();
            }
            WorkerEvent::QuotaExhausted { worker_id, provider } => {
                info!(worker_id, %provider, "worker reported quota exhaustion");
            }
            WorkerEvent::Idle { .. } => {}
            WorkerEvent::Died { worker_id } => {
                warn!(worker_id, "worker task died unexpectedly");
                if let Some(job) = &mut self.job {
                    if let Some(in_flight) = job.active_workers.remove(&worker_id).flatten() {
                        if self.worker_death_requeue {
                            job.queue.push_front(WorkItem::new(in_flight));
                        } else {
                            job.lost_to_worker_death_count += 1;
                        }
                    }
                }
                self.workers.remove(&worker_id);
                self.dispatch_available();
                self.finish_if_terminal();
            }
        }
    }

    /// Checks whether the job has just become terminal (queue and worker
    /// set both empty) and if so marks it `completed`, tearing down
    /// workers.
    fn finish_if_terminal(&mut self) {
        let should_complete = match &self.job {
            Some(job) if job.status == JobStatus::Running => {
                job.queue.is_empty() && job.active_workers.values().all(|f| f.is_none())
            }
            _ => false,
        };

        if should_complete {
            if let Some(job) = &mut self.job {
                job.status = JobStatus::Completed;
                info!(job_id = %job.id, completed = job.completed.len(), failed = job.failed.len(), "job completed");
            }
            for (_, handle) in self.workers.drain() {
                tokio::spawn(async move {
                    handle.stop().await;
                });
            }
            if let Some(job) = &mut self.job {
                job.active_workers.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialPool;
    use crate::error::MoverError;
    use crate::model::FileRecord;

    struct NoopMover;

    #[async_trait::async_trait]
    impl Mover for NoopMover {
        async fn list(&self, _fs: &str, _remote: &str, _recursive: bool) -> Result<Vec<FileRecord>, MoverError> {
            Ok(Vec::new())
        }

        async fn copy_and_wait_boxed(
            &self,
            _src_fs: &str,
            _src_remote: &str,
            _dst_fs: &str,
            _dst_remote: &str,
            _shutdown: &CancellationToken,
        ) -> Result<CopyOutcome, MoverError> {
            unreachable!("not exercised by these tests")
        }
    }

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

    fn test_actor(worker_death_requeue: bool) -> Actor {
        Actor {
            mover: Arc::new(NoopMover),
            pool: CredentialPool::new(-8),
            ruleset: Ruleset::Default,
            max_retries: 3,
            worker_death_requeue,
            job: Some(Job::new("src".into(), "dst".into(), JobOptions::default())),
            workers: HashMap::new(),
            self_tx: mpsc::channel(1).0,
            status_tx: watch::channel(StatusSnapshot::idle()).0,
            shutdown: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_worker_death_is_recorded_as_lost_by_default() {
        let mut actor = test_actor(false);
        {
            let job = actor.job.as_mut().unwrap();
            job.status = JobStatus::Running;
            job.active_workers.insert(0, Some(file("in_flight.bin", 10)));
        }

        actor.handle_worker_event(WorkerEvent::Died { worker_id: 0 }).await;

        let job = actor.job.as_ref().unwrap();
        assert_eq!(job.lost_to_worker_death_count, 1);
        assert!(job.queue.is_empty());
        assert!(!job.active_workers.contains_key(&0));
    }

    #[tokio::test]
    async fn test_worker_death_requeues_when_enabled() {
        let mut actor = test_actor(true);
        {
            let job = actor.job.as_mut().unwrap();
            job.status = JobStatus::Running;
            job.active_workers.insert(0, Some(file("in_flight.bin", 10)));
        }

        actor.handle_worker_event(WorkerEvent::Died { worker_id: 0 }).await;

        let job = actor.job.as_ref().unwrap();
        assert_eq!(job.lost_to_worker_death_count, 0);
        assert_eq!(job.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_worker_death_with_no_in_flight_file_is_a_noop() {
        let mut actor = test_actor(false);
        {
            let job = actor.job.as_mut().unwrap();
            job.status = JobStatus::Running;
            job.active_workers.insert(0, None);
        }

        actor.handle_worker_event(WorkerEvent::Died { worker_id: 0 }).await;

        let job = actor.job.as_ref().unwrap();
        assert_eq!(job.lost_to_worker_death_count, 0);
    }
}

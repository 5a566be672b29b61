//! Worker — a per-credential loop: pull job, check out quota, invoke the
//! data mover, record usage, report result.

use crate::credential::{Checkout, CredentialPool};
use crate::error::MoverError;
use crate::model::{FileRecord, Provider};
use crate::mover::{CopyOutcome, Mover};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::job::WorkItem;

/// Exponential backoff applied before attempts beyond the first.
const BACKOFF_SCHEDULE_SECS: [u64; 3] = [1, 5, 15];

/// Command pushed from the coordinator to one worker.
#[derive(Debug)]
pub enum WorkerCommand {
    Job(WorkItem),
    Stop,
}

/// Event reported from a worker back to the coordinator.
#[derive(Debug)]
pub enum WorkerEvent {
    Completed { worker_id: usize, file: FileRecord, bytes: u64 },
    Failed { worker_id: usize, file: FileRecord, reason: String, attempts: u32, retryable: bool },
    QuotaExhausted { worker_id: usize, provider: Provider },
    Idle { worker_id: usize },
    /// The worker's task ended in a panic rather than a graceful stop or
    /// shutdown cancellation.
    Died { worker_id: usize },
}

/// Handle a coordinator holds for one spawned worker task.
pub struct WorkerHandle {
    pub id: usize,
    pub provider: Provider,
    pub tx: mpsc::Sender<WorkerCommand>,
    pub abort_handle: tokio::task::AbortHandle,
}

impl WorkerHandle {
    pub async fn send_job(&self, item: WorkItem) -> bool {
        self.tx.send(WorkerCommand::Job(item)).await.is_ok()
    }

    pub async fn stop(&self) {
        let _ = self.tx.send(WorkerCommand::Stop).await;
    }
}

/// Spawns one worker task. `source_fs`/`dest_fs` are the mover's `fs`
/// strings for the transfer's two endpoints.
#[allow(clippy::too_many_arguments)]
pub fn spawn(
    id: usize,
    provider: Provider,
    mover: Arc<dyn Mover>,
    pool: CredentialPool,
    source_fs: String,
    dest_fs: String,
    events_tx: mpsc::Sender<WorkerEvent>,
    shutdown: CancellationToken,
) -> WorkerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(8);

    let join = tokio::spawn(run(
        id,
        provider.clone(),
        mover,
        pool,
        source_fs,
        dest_fs,
        cmd_rx,
        events_tx.clone(),
        shutdown,
    ));
    let abort_handle = join.abort_handle();
    tokio::spawn(monitor_death(id, join, events_tx));

    WorkerHandle {
        id,
        provider,
        tx: cmd_tx,
        abort_handle,
    }
}

/// Watches a worker's join handle and reports an unexpected panic as a
/// `Died` event. A graceful stop or an explicit abort both end the task
/// without panicking, so neither produces an event here.
async fn monitor_death(id: usize, join: tokio::task::JoinHandle<()>, events_tx: mpsc::Sender<WorkerEvent>) {
    if let Err(e) = join.await {
        if e.is_panic() {
            warn!(worker = id, "worker task panicked");
            let _ = events_tx.send(WorkerEvent::Died { worker_id: id }).await;
        }
    }
}

async fn run(
    id: usize,
    provider: Provider,
    mover: Arc<dyn Mover>,
    pool: CredentialPool,
    source_fs: String,
    dest_fs: String,
    mut cmd_rx: mpsc::Receiver<WorkerCommand>,
    events_tx: mpsc::Sender<WorkerEvent>,
    shutdown: CancellationToken,
) {
    debug!(worker = id, %provider, "worker started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(worker = id, "worker stopping on shutdown signal");
                break;
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(WorkerCommand::Job(item)) => {
                        process_item(id, &provider, &mover, &pool, &source_fs, &dest_fs, item, &events_tx, &shutdown).await;
                        let _ = events_tx.send(WorkerEvent::Idle { worker_id: id }).await;
                    }
                    Some(WorkerCommand::Stop) | None => {
                        debug!(worker = id, "worker stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Processes one work item to completion, including quota-park retries and
/// backoff. Reports exactly one of `Completed`/`Failed` unless shutdown
/// interrupts first.
async fn process_item(
    id: usize,
    provider: &Provider,
    mover: &Arc<dyn Mover>,
    pool: &CredentialPool,
    source_fs: &str,
    dest_fs: &str,
    item: WorkItem,
    events_tx: &mpsc::Sender<WorkerEvent>,
    shutdown: &CancellationToken,
) {
    if item.attempts > 1 {
        let idx = (item.attempts as usize - 2).min(BACKOFF_SCHEDULE_SECS.len() - 1);
        tokio::time::sleep(std::time::Duration::from_secs(BACKOFF_SCHEDULE_SECS[idx])).await;
    }

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let checkout = pool.checkout(provider, item.file.size).await;
        let credential_id = match checkout {
            Checkout::Granted(snap) => Some(snap.id),
            Checkout::NoCredentials => None,
            Checkout::QuotaExhausted => {
                let _ = events_tx
                    .send(WorkerEvent::QuotaExhausted { worker_id: id, provider: provider.clone() })
                    .await;
                let wait_secs = pool.time_until_reset(provider).await;
                info!(worker = id, %provider, wait_secs, "parking until quota reset");

                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_secs(wait_secs.max(1))) => {}
                    _ = shutdown.cancelled() => return,
                }
                continue;
            }
        };

        let outcome = mover
            .copy_and_wait_boxed(source_fs, &item.file.path, dest_fs, &item.file.path, shutdown)
            .await;

        match outcome {
            Ok(CopyOutcome::Success) => {
                let bytes = item.file.size;
                if let Some(cred_id) = &credential_id {
                    pool.record_usage(cred_id, bytes).await;
                }
                let _ = events_tx
                    .send(WorkerEvent::Completed { worker_id: id, file: item.file, bytes })
                    .await;
            }
            Ok(CopyOutcome::Failed(reason)) => {
                let _ = events_tx
                    .send(WorkerEvent::Failed { worker_id: id, file: item.file, reason, attempts: item.attempts, retryable: true })
                    .await;
            }
            Err(MoverError::Aborted) => {
                debug!(worker = id, path = %item.file.path, "copy aborted by shutdown");
            }
            Err(e) => {
                let retryable = e.is_transient();
                warn!(worker = id, error = %e, path = %item.file.path, retryable, "copy failed");
                let _ = events_tx
                    .send(WorkerEvent::Failed { worker_id: id, file: item.file, reason: e.to_string(), attempts: item.attempts, retryable })
                    .await;
            }
        }

        return;
    }
}

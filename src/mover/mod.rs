//! Data-mover facade — a thin JSON-RPC client to the external transfer
//! engine. Pure client: it holds no transfer state of its own, only an
//! HTTP connection and timeout/poll configuration.

pub mod types;

use crate::error::MoverError;
use crate::model::FileRecord;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use types::*;

impl From<ListEntry> for FileRecord {
    fn from(e: ListEntry) -> Self {
        FileRecord {
            path: e.path,
            name: e.name,
            size: e.size.max(0) as u64,
            mod_time: e.mod_time,
            mime_type: e.mime_type,
            is_dir: e.is_dir,
        }
    }
}

/// Outcome of an async copy once the mover reports `finished=true`.
#[derive(Debug, Clone)]
pub enum CopyOutcome {
    Success,
    Failed(String),
}

/// The subset of the data-mover facade the coordinator and workers depend
/// on, abstracted so integration tests can swap in a fake engine instead
/// of a live `rclone rcd` process.
#[async_trait::async_trait]
pub trait Mover: Send + Sync {
    async fn list(&self, fs: &str, remote: &str, recursive: bool) -> Result<Vec<FileRecord>, MoverError>;

    /// Copies one file and polls to completion. `shutdown` lets the caller
    /// cancel an in-flight copy; implementations should best-effort stop
    /// the underlying job and return `MoverError::Aborted` rather than
    /// leaving it running unattended.
    async fn copy_and_wait_boxed(
        &self,
        src_fs: &str,
        src_remote: &str,
        dst_fs: &str,
        dst_remote: &str,
        shutdown: &CancellationToken,
    ) -> Result<CopyOutcome, MoverError>;
}

/// Thin JSON-RPC client for the external data-mover process.
pub struct MoverClient {
    http: reqwest::Client,
    base_url: String,
    control_timeout: Duration,
    poll_interval: Duration,
}

impl MoverClient {
    pub fn new(base_url: impl Into<String>, control_timeout_secs: u64, poll_interval_ms: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(control_timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            base_url: base_url.into(),
            control_timeout: Duration::from_secs(control_timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    async fn call<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &Req,
    ) -> Result<Resp, MoverError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), method);

        let response = tokio::time::timeout(self.control_timeout, self.http.post(&url).json(body).send())
            .await
            .map_err(|_| MoverError::Timeout(self.control_timeout))??;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(MoverError::Rpc {
                message: format!("{} returned {}: {}", method, status, text),
            });
        }

        let parsed = response.json::<Resp>().await?;
        Ok(parsed)
    }

    /// `rc/noop` — health check.
    pub async fn noop(&self) -> Result<(), MoverError> {
        let _: serde_json::Value = self.call("rc/noop", &serde_json::json!({})).await?;
        Ok(())
    }

    /// `operations/list` — enumerate a remote tree.
    pub async fn list(&self, fs: &str, remote: &str, recursive: bool) -> Result<Vec<FileRecord>, MoverError> {
        let req = ListRequest {
            fs,
            remote,
            opt: ListOpt { recurse: recursive },
        };
        let resp: ListResponse = self.call("operations/list", &req).await?;
        Ok(resp.list.into_iter().map(FileRecord::from).collect())
    }

    /// `operations/copyfile` with `_async: true` — returns the mover's job id.
    pub async fn copyfile(
        &self,
        src_fs: &str,
        src_remote: &str,
        dst_fs: &str,
        dst_remote: &str,
    ) -> Result<i64, MoverError> {
        let req = CopyFileRequest {
            src_fs,
            src_remote,
            dst_fs,
            dst_remote,
            is_async: true,
        };
        let resp: CopyFileResponse = self.call("operations/copyfile", &req).await?;
        Ok(resp.jobid)
    }

    /// `job/status` — single poll.
    pub async fn job_status(&self, job_id: i64) -> Result<JobStatusResponse, MoverError> {
        self.call("job/status", &JobIdRequest { jobid: job_id }).await
    }

    /// `job/stop` — best-effort cancellation of an in-flight async job.
    pub async fn job_stop(&self, job_id: i64) -> Result<(), MoverError> {
        let _: serde_json::Value = self.call("job/stop", &JobIdRequest { jobid: job_id }).await?;
        Ok(())
    }

    /// `operations/about` — destination capacity.
    pub async fn about(&self, fs: &str) -> Result<AboutResponse, MoverError> {
        self.call("operations/about", &AboutRequest { fs }).await
    }

    /// `operations/publiclink` — used by the ghost-link collaborator (out of scope
    /// here; exposed so that collaborator has something to call).
    pub async fn publiclink(&self, fs: &str, remote: &str) -> Result<String, MoverError> {
        let resp: PublicLinkResponse = self.call("operations/publiclink", &PublicLinkRequest { fs, remote }).await?;
        Ok(resp.url)
    }

    /// `core/stats` — raw stats passthrough.
    pub async fn core_stats(&self) -> Result<serde_json::Value, MoverError> {
        self.call("core/stats", &serde_json::json!({})).await
    }

    /// `operations/hashsum`.
    pub async fn hashsum(&self, fs: &str, remote: &str, algo: &str) -> Result<String, MoverError> {
        let req = HashsumRequest { fs, remote, hash_type: algo };
        let resp: HashsumResponse = self.call("operations/hashsum", &req).await?;
        resp.hashes
            .into_values()
            .next()
            .ok_or_else(|| MoverError::Rpc { message: "hashsum response had no entries".into() })
    }

    /// Copy one file and poll to completion, forwarding intermediate progress
    /// numbers to `on_progress` until `finished=true`. `shutdown` cancels the
    /// wait and issues a best-effort `job/stop` against the in-flight job.
    pub async fn copy_and_wait(
        &self,
        src_fs: &str,
        src_remote: &str,
        dst_fs: &str,
        dst_remote: &str,
        shutdown: &CancellationToken,
        mut on_progress: impl FnMut(f64),
    ) -> Result<CopyOutcome, MoverError> {
        let job_id = self.copyfile(src_fs, src_remote, dst_fs, dst_remote).await?;
        debug!(job_id, src_remote, "copy job started");

        loop {
            let status = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.best_effort_stop(job_id).await;
                    return Err(MoverError::Aborted);
                }
                status = self.job_status(job_id) => status?,
            };

            if let Some(progress) = status.progress {
                on_progress(progress);
            }

            if status.finished {
                return match status.success {
                    Some(true) | None => Ok(CopyOutcome::Success),
                    Some(false) => Ok(CopyOutcome::Failed(status.error.unwrap_or_else(|| "unknown error".into()))),
                };
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    self.best_effort_stop(job_id).await;
                    return Err(MoverError::Aborted);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Best-effort abort of an in-flight mover job; failures are logged, not
    /// propagated.
    pub async fn best_effort_stop(&self, job_id: i64) {
        if let Err(e) = self.job_stop(job_id).await {
            warn!(job_id, error = %e, "best-effort job/stop failed");
        }
    }
}

#[async_trait::async_trait]
impl Mover for MoverClient {
    async fn list(&self, fs: &str, remote: &str, recursive: bool) -> Result<Vec<FileRecord>, MoverError> {
        MoverClient::list(self, fs, remote, recursive).await
    }

    async fn copy_and_wait_boxed(
        &self,
        src_fs: &str,
        src_remote: &str,
        dst_fs: &str,
        dst_remote: &str,
        shutdown: &CancellationToken,
    ) -> Result<CopyOutcome, MoverError> {
        self.copy_and_wait(src_fs, src_remote, dst_fs, dst_remote, shutdown, |_| {}).await
    }
}

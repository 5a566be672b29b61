//! Credential pool — meters per-credential daily upload quotas and
//! rotates credentials to maximise aggregate throughput.
//!
//! Realised as a single-owner handle (`Arc<RwLock<PoolState>>`): every
//! public operation takes the write lock for its whole critical section,
//! giving callers a single-writer, message-serialised view of the pool.

pub mod import;

use crate::model::{Provider, Quota};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque, provider-specific credential payload. Never logged; `Debug`
/// prints a redacted placeholder instead of the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBlob(pub Vec<u8>);

impl std::fmt::Debug for SecretBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBlob(<{} bytes redacted>)", self.0.len())
    }
}

/// One authentication handle for one provider account.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub provider: Provider,
    pub display_name: String,
    pub secret: SecretBlob,
    pub daily_limit: Quota,
    pub bytes_used_today: u64,
    pub last_reset: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn remaining(&self) -> Quota {
        self.daily_limit.remaining(self.bytes_used_today)
    }

    pub fn utilisation_percent(&self) -> f64 {
        match self.daily_limit {
            Quota::Unlimited => 0.0,
            Quota::Limited(limit) if limit == 0 => 100.0,
            Quota::Limited(limit) => (self.bytes_used_today as f64 / limit as f64) * 100.0,
        }
    }
}

/// Read-only view of one credential, returned by `status()`.
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub id: String,
    pub provider: Provider,
    pub display_name: String,
    pub daily_limit: Quota,
    pub bytes_used_today: u64,
    pub remaining: Quota,
    pub utilisation_percent: f64,
}

impl From<&Credential> for CredentialSnapshot {
    fn from(c: &Credential) -> Self {
        CredentialSnapshot {
            id: c.id.clone(),
            provider: c.provider.clone(),
            display_name: c.display_name.clone(),
            daily_limit: c.daily_limit,
            bytes_used_today: c.bytes_used_today,
            remaining: c.remaining(),
            utilisation_percent: c.utilisation_percent(),
        }
    }
}

/// Result of a `checkout` call.
#[derive(Debug, Clone)]
pub enum Checkout {
    Granted(CredentialSnapshot),
    NoCredentials,
    QuotaExhausted,
}

struct PoolState {
    by_provider: HashMap<Provider, Vec<Credential>>,
    /// Next reset instant per provider.
    next_reset: HashMap<Provider, DateTime<Utc>>,
    pacific_offset_hours: i32,
}

impl PoolState {
    fn credentials_for_mut(&mut self, provider: &Provider) -> &mut Vec<Credential> {
        self.by_provider.entry(provider.clone()).or_default()
    }

    fn next_reset_for(&self, provider: &Provider, now: DateTime<Utc>) -> DateTime<Utc> {
        if provider.is_google_class() {
            next_midnight_at_offset(now, self.pacific_offset_hours)
        } else {
            next_midnight_utc(now)
        }
    }
}

/// Next UTC midnight strictly after `now`.
fn next_midnight_utc(now: DateTime<Utc>) -> DateTime<Utc> {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(now.date_naive());
    Utc.from_utc_datetime(&tomorrow.and_hms_opt(0, 0, 0).unwrap())
}

/// Next local midnight at a fixed UTC offset (hours), expressed back in UTC.
/// Fixed-offset, ignores DST; the offset is configurable per deployment.
fn next_midnight_at_offset(now: DateTime<Utc>, offset_hours: i32) -> DateTime<Utc> {
    let shifted = now + chrono::Duration::hours(offset_hours as i64);
    let local_midnight_tomorrow = next_midnight_utc(shifted);
    local_midnight_tomorrow - chrono::Duration::hours(offset_hours as i64)
}

/// The credential pool handle. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct CredentialPool {
    state: Arc<RwLock<PoolState>>,
}

impl CredentialPool {
    pub fn new(pacific_offset_hours: i32) -> Self {
        Self {
            state: Arc::new(RwLock::new(PoolState {
                by_provider: HashMap::new(),
                next_reset: HashMap::new(),
                pacific_offset_hours,
            })),
        }
    }

    /// Assigns a fresh id `<provider>-<8 hex chars>` and registers the
    /// credential.
    pub async fn add(
        &self,
        provider: Provider,
        secret: SecretBlob,
        display_name: Option<String>,
        daily_limit: Quota,
    ) -> String {
        let id = format!("{}-{}", provider, random_hex8());
        let now = Utc::now();

        let mut state = self.state.write().await;
        let next_reset = state.next_reset_for(&provider, now);
        state.next_reset.entry(provider.clone()).or_insert(next_reset);

        state.credentials_for_mut(&provider).push(Credential {
            id: id.clone(),
            provider,
            display_name: display_name.unwrap_or_else(|| id.clone()),
            secret,
            daily_limit,
            bytes_used_today: 0,
            last_reset: now,
            created_at: now,
        });

        id
    }

    /// Returns the credential with the most remaining quota that still has
    /// `remaining >= bytes_needed`.
    pub async fn checkout(&self, provider: &Provider, bytes_needed: u64) -> Checkout {
        let state = self.state.read().await;
        let Some(creds) = state.by_provider.get(provider) else {
            return Checkout::NoCredentials;
        };
        if creds.is_empty() {
            return Checkout::NoCredentials;
        }

        let best = creds
            .iter()
            .filter(|c| c.remaining().at_least(bytes_needed))
            .max_by(|a, b| compare_remaining(&a.remaining(), &b.remaining()));

        match best {
            Some(c) => Checkout::Granted(CredentialSnapshot::from(c)),
            None => Checkout::QuotaExhausted,
        }
    }

    /// Adds bytes to `bytes_used_today` for the given credential id.
    /// No-op if the id is unknown (the credential may have been removed
    /// concurrently).
    pub async fn record_usage(&self, id: &str, bytes: u64) {
        let mut state = self.state.write().await;
        for creds in state.by_provider.values_mut() {
            if let Some(c) = creds.iter_mut().find(|c| c.id == id) {
                c.bytes_used_today += bytes;
                debug!(credential = id, bytes, total = c.bytes_used_today, "recorded usage");
                return;
            }
        }
    }

    /// Full read-only view of every registered credential.
    pub async fn status(&self) -> Vec<CredentialSnapshot> {
        let state = self.state.read().await;
        state
            .by_provider
            .values()
            .flatten()
            .map(CredentialSnapshot::from)
            .collect()
    }

    /// Sum of remaining quota across all credentials for a provider, or
    /// `Unlimited` if any one credential is unlimited.
    pub async fn total_remaining(&self, provider: &Provider) -> Quota {
        let state = self.state.read().await;
        let Some(creds) = state.by_provider.get(provider) else {
            return Quota::Limited(0);
        };

        let mut total = 0u64;
        for c in creds {
            match c.remaining() {
                Quota::Unlimited => return Quota::Unlimited,
                Quota::Limited(v) => total += v,
            }
        }
        Quota::Limited(total)
    }

    /// Seconds until the next reset instant for a provider.
    pub async fn time_until_reset(&self, provider: &Provider) -> u64 {
        let state = self.state.read().await;
        let now = Utc::now();
        let next = state
            .next_reset
            .get(provider)
            .copied()
            .unwrap_or_else(|| state.next_reset_for(provider, now));
        (next - now).num_seconds().max(0) as u64
    }

    /// Count of credentials registered for a provider (used by the
    /// coordinator's worker-count derivation).
    pub async fn count_for(&self, provider: &Provider) -> usize {
        let state = self.state.read().await;
        state.by_provider.get(provider).map_or(0, |v| v.len())
    }

    /// Hourly reset tick. For every provider whose next reset instant has
    /// passed, zero every credential's usage and recompute the next
    /// reset. Idempotent: calling this twice with no intervening activity
    /// leaves state unchanged after the first call, because the
    /// comparison is always against "now" and a freshly-recomputed
    /// `next_reset` is always in the future.
    pub async fn maybe_reset(&self) {
        let now = Utc::now();
        let mut state = self.state.write().await;

        let due: Vec<Provider> = state
            .next_reset
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(p, _)| p.clone())
            .collect();

        for provider in due {
            if let Some(creds) = state.by_provider.get_mut(&provider) {
                for c in creds.iter_mut() {
                    c.bytes_used_today = 0;
                    c.last_reset = now;
                }
                info!(%provider, "credential pool reset");
            }
            let next = state.next_reset_for(&provider, now);
            state.next_reset.insert(provider, next);
        }
    }

    /// Spawn the hourly reset-check background task. Cancellable via
    /// `shutdown`.
    pub fn spawn_reset_ticker(&self, shutdown: tokio_util::sync::CancellationToken) -> tokio::task::JoinHandle<()> {
        let pool = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
            loop {
                tokio::select! {
                    _ = interval.tick() => pool.maybe_reset().await,
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

fn compare_remaining(a: &Quota, b: &Quota) -> std::cmp::Ordering {
    match (a, b) {
        (Quota::Unlimited, Quota::Unlimited) => std::cmp::Ordering::Equal,
        (Quota::Unlimited, _) => std::cmp::Ordering::Greater,
        (_, Quota::Unlimited) => std::cmp::Ordering::Less,
        (Quota::Limited(a), Quota::Limited(b)) => a.cmp(b),
    }
}

fn random_hex8() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob() -> SecretBlob {
        SecretBlob(vec![1, 2, 3])
    }

    #[tokio::test]
    async fn test_add_then_checkout_returns_same_id() {
        let pool = CredentialPool::new(-8);
        let id = pool.add(Provider::S3, blob(), None, Quota::Limited(1_000_000)).await;

        match pool.checkout(&Provider::S3, 0).await {
            Checkout::Granted(snap) => assert_eq!(snap.id, id),
            other => panic!("expected Granted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_checkout_no_credentials() {
        let pool = CredentialPool::new(-8);
        assert!(matches!(pool.checkout(&Provider::S3, 1).await, Checkout::NoCredentials));
    }

    #[tokio::test]
    async fn test_checkout_quota_exhausted_boundary() {
        let pool = CredentialPool::new(-8);
        let limit = 1_000_000u64;
        let id = pool.add(Provider::S3, blob(), None, Quota::Limited(limit)).await;
        let margin = (limit as f64 * 0.95).floor() as u64;
        pool.record_usage(&id, margin).await;

        // remaining is now exactly 0; requesting 1 more byte must fail.
        assert!(matches!(pool.checkout(&Provider::S3, 1).await, Checkout::QuotaExhausted));
        // requesting 0 bytes still succeeds.
        assert!(matches!(pool.checkout(&Provider::S3, 0).await, Checkout::Granted(_)));
    }

    #[tokio::test]
    async fn test_checkout_prefers_most_remaining() {
        let pool = CredentialPool::new(-8);
        let a = pool.add(Provider::Gdrive, blob(), None, Quota::Limited(1_000_000_000)).await;
        let b = pool.add(Provider::Gdrive, blob(), None, Quota::Limited(1_000_000_000)).await;
        pool.record_usage(&a, 600_000_000).await;

        match pool.checkout(&Provider::Gdrive, 1).await {
            Checkout::Granted(snap) => assert_eq!(snap.id, b),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_record_usage_monotone_non_decreasing() {
        let pool = CredentialPool::new(-8);
        let id = pool.add(Provider::S3, blob(), None, Quota::Unlimited).await;
        pool.record_usage(&id, 100).await;
        pool.record_usage(&id, 50).await;

        let snap = pool.status().await.into_iter().find(|c| c.id == id).unwrap();
        assert_eq!(snap.bytes_used_today, 150);
    }

    #[tokio::test]
    async fn test_total_remaining_unlimited_if_any_unlimited() {
        let pool = CredentialPool::new(-8);
        pool.add(Provider::S3, blob(), None, Quota::Limited(1_000)).await;
        pool.add(Provider::S3, blob(), None, Quota::Unlimited).await;

        assert_eq!(pool.total_remaining(&Provider::S3).await, Quota::Unlimited);
    }

    #[tokio::test]
    async fn test_reset_zeroes_usage_and_is_idempotent() {
        let pool = CredentialPool::new(-8);
        let id = pool.add(Provider::S3, blob(), None, Quota::Limited(1_000)).await;
        pool.record_usage(&id, 500).await;

        // Force the next reset into the past so maybe_reset() fires.
        {
            let mut state = pool.state.write().await;
            state.next_reset.insert(Provider::S3, Utc::now() - chrono::Duration::seconds(1));
        }

        pool.maybe_reset().await;
        let snap = pool.status().await.into_iter().find(|c| c.id == id).unwrap();
        assert_eq!(snap.bytes_used_today, 0);

        // Second call with no intervening activity must be a no-op.
        pool.maybe_reset().await;
        let snap2 = pool.status().await.into_iter().find(|c| c.id == id).unwrap();
        assert_eq!(snap2.bytes_used_today, 0);
    }

    #[tokio::test]
    async fn test_time_until_reset_is_non_negative() {
        let pool = CredentialPool::new(-8);
        pool.add(Provider::Gdrive, blob(), None, Quota::Unlimited).await;
        let secs = pool.time_until_reset(&Provider::Gdrive).await;
        assert!(secs <= 24 * 3600);
    }
}

//! Bulk credential import from a directory of credential-blob files.
//! Reads every `*.json` entry, tolerates individual bad entries by
//! skipping and logging them, and auto-detects provider shape instead of
//! assuming one schema.

use super::{CredentialPool, SecretBlob};
use crate::error::CredentialError;
use crate::model::{Provider, Quota};
use serde_json::Value;
use tracing::{debug, warn};

/// Default daily byte allowance applied to an imported credential when the
/// blob itself carries no explicit limit.
fn default_daily_limit(provider: &Provider) -> Quota {
    match provider {
        Provider::Gdrive => Quota::Limited(750 * 1_000_000_000),
        Provider::S3 | Provider::B2 | Provider::Azure => Quota::Unlimited,
        Provider::Dropbox => Quota::Limited(  /* Dropbox Business default */ 2 * 1_000_000_000_000),
        Provider::Onedrive => Quota::Limited(1_000_000_000_000),
        Provider::Unknown => Quota::Unlimited,
    }
}

/// Inspects a parsed credential blob's shape and returns the provider it
/// was most likely issued by.
fn detect_provider(blob: &Value) -> Provider {
    let Some(obj) = blob.as_object() else {
        return Provider::Unknown;
    };

    let is_service_account = obj.contains_key("service_account")
        || obj.get("type").and_then(|v| v.as_str()) == Some("service_account");
    if is_service_account {
        return Provider::Gdrive;
    }
    if obj.contains_key("access_key_id") || obj.contains_key("aws_access_key_id") {
        return Provider::S3;
    }
    if obj.contains_key("application_key_id") || obj.contains_key("account_id") {
        return Provider::B2;
    }
    if obj.contains_key("app_key") && obj.contains_key("app_secret") {
        return Provider::Dropbox;
    }
    if obj.contains_key("client_id") && obj.contains_key("tenant") {
        return Provider::Onedrive;
    }
    if obj.contains_key("account_name") && obj.contains_key("account_key") {
        return Provider::Azure;
    }

    Provider::Unknown
}

/// Extracts an explicit daily-limit override from the blob, if present.
fn explicit_limit(blob: &Value) -> Option<Quota> {
    blob.get("daily_limit_bytes")
        .and_then(|v| v.as_u64())
        .map(Quota::Limited)
}

/// Scans `dir` for credential-blob files (`*.json`), auto-detects each
/// one's provider, and registers it in `pool`.
///
/// Returns the number of credentials successfully imported. Malformed
/// files are skipped and logged, not fatal. A missing/non-directory path
/// is the one error this returns.
pub async fn import_folder(pool: &CredentialPool, dir: &std::path::Path) -> Result<usize, CredentialError> {
    if !dir.is_dir() {
        return Err(CredentialError::NotADirectory(dir.to_path_buf()));
    }

    let mut imported = 0usize;
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| CredentialError::Io { path: dir.to_path_buf(), source: e })?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| CredentialError::Io { path: dir.to_path_buf(), source: e })?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }

        match import_one(pool, &path).await {
            Ok(()) => imported += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed credential file"),
        }
    }

    debug!(dir = %dir.display(), imported, "import_folder finished");
    Ok(imported)
}

async fn import_one(pool: &CredentialPool, path: &std::path::Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let parsed: Value = serde_json::from_slice(&bytes)?;

    let provider = detect_provider(&parsed);
    let limit = explicit_limit(&parsed).unwrap_or_else(|| default_daily_limit(&provider));
    let display_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    pool.add(provider, SecretBlob(bytes), Some(display_name), limit).await;
    Ok(())
}

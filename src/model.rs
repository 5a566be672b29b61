//! Shared data-model types used across components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A cloud storage provider tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gdrive,
    S3,
    B2,
    Dropbox,
    Onedrive,
    Azure,
    /// Provider detection failed at import time.
    Unknown,
}

impl Provider {
    /// Google-class providers reset at midnight Pacific; everyone else at
    /// midnight UTC.
    pub fn is_google_class(&self) -> bool {
        matches!(self, Provider::Gdrive)
    }

    /// Parses the provider tag out of an rclone-style fs string (e.g.
    /// `"gdrive:Backups/2024"` or plain `"gdrive:"`), taking everything
    /// before the first `:` rather than the whole string.
    pub fn from_fs(fs: &str) -> Provider {
        let scheme = fs.split(':').next().unwrap_or(fs);
        scheme.parse().unwrap_or(Provider::Unknown)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Provider::Gdrive => "gdrive",
            Provider::S3 => "s3",
            Provider::B2 => "b2",
            Provider::Dropbox => "dropbox",
            Provider::Onedrive => "onedrive",
            Provider::Azure => "azure",
            Provider::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for Provider {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "gdrive" | "google" | "googledrive" => Provider::Gdrive,
            "s3" | "aws" => Provider::S3,
            "b2" | "backblaze" => Provider::B2,
            "dropbox" => Provider::Dropbox,
            "onedrive" => Provider::Onedrive,
            "azure" => Provider::Azure,
            _ => Provider::Unknown,
        })
    }
}

/// A per-credential daily byte allowance: either a fixed number of bytes
/// or the sentinel *unlimited*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quota {
    Limited(u64),
    Unlimited,
}

impl Quota {
    /// `remaining = max(0, floor(limit * 0.95) - used)`, or `Unlimited`
    /// propagates through unchanged.
    pub fn remaining(&self, used: u64) -> Quota {
        match self {
            Quota::Unlimited => Quota::Unlimited,
            Quota::Limited(limit) => {
                let margin = (*limit as f64 * 0.95).floor() as u64;
                Quota::Limited(margin.saturating_sub(used))
            }
        }
    }

    pub fn as_u64_or(&self, default: u64) -> u64 {
        match self {
            Quota::Limited(v) => *v,
            Quota::Unlimited => default,
        }
    }

    pub fn at_least(&self, bytes_needed: u64) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Limited(v) => *v >= bytes_needed,
        }
    }
}

/// What the data mover returns per enumerated entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub mod_time: String,
    pub mime_type: Option<String>,
    pub is_dir: bool,
}

impl FileRecord {
    /// Lowercased filename extension, without the leading dot, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    /// Basename of the entry's parent directory, if the path has one.
    pub fn parent_dir_name(&self) -> Option<String> {
        std::path::Path::new(&self.path)
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
    }
}

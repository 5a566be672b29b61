//! Wire types for the data-mover JSON-RPC API.

use serde::{Deserialize, Serialize};

/// One entry returned by `operations/list`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ListEntry {
    #[serde(rename = "Path")]
    pub path: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Size")]
    pub size: i64,
    #[serde(rename = "ModTime")]
    pub mod_time: String,
    #[serde(rename = "IsDir")]
    pub is_dir: bool,
    #[serde(rename = "MimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListResponse {
    pub list: Vec<ListEntry>,
}

#[derive(Debug, Serialize)]
pub struct ListRequest<'a> {
    pub fs: &'a str,
    pub remote: &'a str,
    pub opt: ListOpt,
}

#[derive(Debug, Serialize)]
pub struct ListOpt {
    pub recurse: bool,
}

#[derive(Debug, Serialize)]
pub struct CopyFileRequest<'a> {
    #[serde(rename = "srcFs")]
    pub src_fs: &'a str,
    #[serde(rename = "srcRemote")]
    pub src_remote: &'a str,
    #[serde(rename = "dstFs")]
    pub dst_fs: &'a str,
    #[serde(rename = "dstRemote")]
    pub dst_remote: &'a str,
    #[serde(rename = "_async")]
    pub is_async: bool,
}

#[derive(Debug, Deserialize)]
pub struct CopyFileResponse {
    pub jobid: i64,
}

#[derive(Debug, Serialize)]
pub struct JobIdRequest {
    pub jobid: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub finished: bool,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AboutResponse {
    #[serde(default)]
    pub total: Option<i64>,
    #[serde(default)]
    pub used: Option<i64>,
    #[serde(default)]
    pub free: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AboutRequest<'a> {
    pub fs: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PublicLinkRequest<'a> {
    pub fs: &'a str,
    pub remote: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct PublicLinkResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct HashsumRequest<'a> {
    pub fs: &'a str,
    pub remote: &'a str,
    #[serde(rename = "hashType")]
    pub hash_type: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct HashsumResponse {
    #[serde(flatten)]
    pub hashes: std::collections::HashMap<String, String>,
}

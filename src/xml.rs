//! S3 XML response decoding.
//!
//! S3 answers list, copy, and error requests with XML documents.  This
//! module deserializes the handful the client consumes using `quick-xml`'s
//! serde support.

use serde::Deserialize;

use crate::errors::{ClientError, Result};

// ── Error document ──────────────────────────────────────────────────

/// An S3 `<Error>` document.
///
/// ```xml
/// <Error>
///   <Code>NoSuchKey</Code>
///   <Message>The resource you requested does not exist</Message>
///   <Resource>/mybucket/key</Resource>
///   <RequestId>abcd-1234</RequestId>
/// </Error>
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrorDocument {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Parse an `<Error>` document.  Returns `None` for empty bodies and for
/// anything that is not an error document.
pub fn parse_error_document(body: &str) -> Option<ErrorDocument> {
    let trimmed = body.trim();
    if trimmed.is_empty() || !trimmed.contains("<Error") {
        return None;
    }
    quick_xml::de::from_str(trimmed).ok()
}

// ── ListBucketResult (v2) ───────────────────────────────────────────

/// One `<Contents>` entry of a ListObjectsV2 page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListEntry {
    pub key: String,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// A single ListObjectsV2 page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListBucketResult {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub key_count: Option<u32>,
    #[serde(default)]
    pub is_truncated: bool,
    #[serde(default)]
    pub next_continuation_token: Option<String>,
    #[serde(default)]
    pub contents: Vec<ListEntry>,
}

/// Parse a `<ListBucketResult>` page.
pub fn parse_list_objects(body: &str) -> Result<ListBucketResult> {
    quick_xml::de::from_str(body).map_err(|e| ClientError::Storage {
        status: None,
        code: "MalformedXML".to_string(),
        message: format!("unreadable ListBucketResult: {e}"),
    })
}

// ── CopyObjectResult ────────────────────────────────────────────────

/// Response of a server-side copy.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CopyObjectResult {
    #[serde(rename = "ETag", default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// Parse a `<CopyObjectResult>` document.
pub fn parse_copy_result(body: &str) -> Result<CopyObjectResult> {
    quick_xml::de::from_str(body).map_err(|e| ClientError::Storage {
        status: None,
        code: "MalformedXML".to_string(),
        message: format!("unreadable CopyObjectResult: {e}"),
    })
}

// ── Tests ───────────────────────────────────────────────────────────

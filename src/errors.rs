//! Client error taxonomy.
//!
//! Every failure path returns a [`ClientError`].  Service responses are
//! translated by [`map_service_error`], which prefers the S3 error code
//! carried in the XML `<Error>` body over the bare HTTP status, so a
//! `403 QuotaExceeded` is reported as a quota failure rather than as an
//! access problem.

use thiserror::Error;

use crate::xml::parse_error_document;

/// Result alias used throughout the crate.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Boxed error source attached to transport failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the object storage client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or invalid configuration or credentials.  Fatal; raised
    /// at construction time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The object key is malformed.  A caller bug, never retried.
    #[error("invalid object key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The object does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The service refused the credentials or the operation.
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// The account or bucket ran out of storage quota.
    #[error("storage quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// Network failure, timeout, or a broken payload stream.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Any service response without a more specific mapping.
    #[error("storage error ({}): {code}: {message}", display_status(.status))]
    Storage {
        status: Option<u16>,
        code: String,
        message: String,
    },
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!("status {s}"),
        None => "no status".to_string(),
    }
}

impl ClientError {
    /// Build an [`ClientError::InvalidKey`].
    pub fn invalid_key(key: &str, reason: impl Into<String>) -> Self {
        ClientError::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a [`ClientError::Transport`] wrapping `source`.
    pub fn transport(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ClientError::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Short label used for logging and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Config(_) => "config",
            ClientError::InvalidKey { .. } => "invalid_key",
            ClientError::NotFound { .. } => "not_found",
            ClientError::AccessDenied { .. } => "access_denied",
            ClientError::QuotaExceeded { .. } => "quota_exceeded",
            ClientError::Transport { .. } => "transport",
            ClientError::Cancelled => "cancelled",
            ClientError::Storage { .. } => "storage",
        }
    }

    /// Whether a caller may reasonably retry the operation.
    ///
    /// Only transport failures qualify.  Non-idempotent uploads still need a
    /// fresh payload stream from the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport { .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else if err.is_body() || err.is_decode() {
            "failed to transfer body".to_string()
        } else {
            "request failed".to_string()
        };
        ClientError::transport(message, err)
    }
}

/// S3 error codes that mean "the object is absent".
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NotFound"];

/// S3 error codes that mean "credentials or permissions were refused".
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AllAccessDisabled",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "RequestTimeTooSkewed",
    "AccountProblem",
];

/// S3 error codes that mean "out of space".
const QUOTA_CODES: &[&str] = &["QuotaExceeded", "StorageQuotaExceeded", "TooManyBuckets"];

/// Translate a non-success service response into a [`ClientError`].
///
/// `body` is the raw response body (empty for HEAD responses) and `key`
/// the logical key the request addressed, used for `NotFound` reporting.
pub fn map_service_error(status: u16, body: &str, key: &str) -> ClientError {
    let document = parse_error_document(body);

    if let Some(doc) = document {
        let message = doc
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| doc.code.clone());
        let code = doc.code.as_str();

        if NOT_FOUND_CODES.contains(&code) {
            return ClientError::NotFound {
                key: key.to_string(),
            };
        }
        if QUOTA_CODES.contains(&code) {
            return ClientError::QuotaExceeded { message };
        }
        if ACCESS_DENIED_CODES.contains(&code) {
            return ClientError::AccessDenied {
                message: format!("{code}: {message}"),
            };
        }
        return ClientError::Storage {
            status: Some(status),
            code: doc.code,
            message,
        };
    }

    match status {
        404 => ClientError::NotFound {
            key: key.to_string(),
        },
        401 | 403 => ClientError::AccessDenied {
            message: format!("service returned HTTP {status}"),
        },
        507 => ClientError::QuotaExceeded {
            message: format!("service returned HTTP {status}"),
        },
        _ => ClientError::Storage {
            status: Some(status),
            code: "Unknown".to_string(),
            message: if body.trim().is_empty() {
                format!("service returned HTTP {status}")
            } else {
                body.trim().chars().take(512).collect()
            },
        },
    }
}

// -- Tests -------------------------------------------------------------------

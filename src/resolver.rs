//! Endpoint and key resolution.
//!
//! Turns `{endpoint, bucket, subfolder, key}` into the URL a request goes
//! to.  Keys are normalized here and nowhere else: leading slashes and
//! empty segments are dropped, the subfolder prefix is prepended exactly
//! once, and anything that could escape the prefix is rejected.

use reqwest::Url;

use crate::errors::{ClientError, Result};
use crate::signer::s3_uri_encode;

/// Longest full key (prefix included) S3 accepts, in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// How the bucket is addressed on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddressingStyle {
    /// `https://bucket.endpoint/key`
    #[default]
    VirtualHosted,
    /// `https://endpoint/bucket/key`
    Path,
}

/// A validated object key.
///
/// `logical` is what callers see; `full` carries the subfolder prefix and
/// is what goes on the wire.  `full` never begins with `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey {
    logical: String,
    full: String,
}

impl ObjectKey {
    /// The key as stored, subfolder included.
    pub fn as_str(&self) -> &str {
        &self.full
    }

    /// The key relative to the subfolder.
    pub fn logical(&self) -> &str {
        &self.logical
    }

    /// Whether the key names a directory marker.
    pub fn is_dir(&self) -> bool {
        self.full.ends_with('/')
    }
}

/// Where a single request goes.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub url: Url,
    /// Value of the `host` header, port included when non-default.
    pub host: String,
}

impl ResolvedTarget {
    /// The encoded path, exactly as sent and signed.
    pub fn canonical_path(&self) -> &str {
        self.url.path()
    }

    /// Replace the query string.  `query` must already be encoded.
    pub fn with_query(mut self, query: &str) -> Self {
        if query.is_empty() {
            self.url.set_query(None);
        } else {
            self.url.set_query(Some(query));
        }
        self
    }
}

#[derive(Debug, Clone)]
pub struct EndpointResolver {
    scheme: String,
    authority: String,
    bucket: String,
    prefix: String,
    style: AddressingStyle,
}

impl EndpointResolver {
    /// Build a resolver.  `endpoint` may omit the scheme, in which case
    /// `https` is assumed; it must not carry a path, query or fragment.
    pub fn new(
        endpoint: &str,
        bucket: &str,
        subfolder: &str,
        style: AddressingStyle,
    ) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".to_string()));
        }
        if bucket.is_empty() || bucket.contains('/') {
            return Err(ClientError::Config(format!("invalid bucket name {bucket:?}")));
        }

        let with_scheme = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| ClientError::Config(format!("invalid endpoint {endpoint:?}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "endpoint scheme must be http or https, got {:?}",
                url.scheme()
            )));
        }
        if url.path() != "/" && !url.path().is_empty() {
            return Err(ClientError::Config(format!(
                "endpoint must not contain a path: {endpoint:?}"
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ClientError::Config(format!(
                "endpoint must not contain a query or fragment: {endpoint:?}"
            )));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(ClientError::Config(
                "endpoint must not embed credentials".to_string(),
            ));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ClientError::Config(format!("endpoint has no host: {endpoint:?}")))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let prefix = normalize_subfolder(subfolder)?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            authority,
            bucket: bucket.to_string(),
            prefix,
            style,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The subfolder prefix: empty, or ending in exactly one `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Validate and normalize a caller-supplied key.
    pub fn key(&self, raw: &str) -> Result<ObjectKey> {
        let logical = normalize_path(raw)?;
        if logical.is_empty() {
            return Err(ClientError::invalid_key(raw, "key is empty"));
        }
        let full = format!("{}{}", self.prefix, logical);
        if full.len() > MAX_KEY_LEN {
            return Err(ClientError::invalid_key(
                raw,
                format!("key is longer than {MAX_KEY_LEN} bytes"),
            ));
        }
        Ok(ObjectKey { logical, full })
    }

    /// Full listing prefix for a caller-supplied prefix.  An empty prefix
    /// lists the whole subfolder.
    pub fn list_prefix(&self, raw: &str) -> Result<String> {
        let logical = normalize_path(raw)?;
        let full = format!("{}{}", self.prefix, logical);
        if full.len() > MAX_KEY_LEN {
            return Err(ClientError::invalid_key(
                raw,
                format!("prefix is longer than {MAX_KEY_LEN} bytes"),
            ));
        }
        Ok(full)
    }

    /// Map a stored key back to its logical form.  `None` when the key
    /// lies outside the subfolder or is the subfolder itself.
    pub fn strip_prefix<'a>(&self, full: &'a str) -> Option<&'a str> {
        full.strip_prefix(self.prefix.as_str())
            .filter(|logical| !logical.is_empty())
    }

    /// Target for an object request.
    pub fn resolve(&self, key: &ObjectKey) -> Result<ResolvedTarget> {
        let encoded = s3_uri_encode(&key.full, false);
        let (host, path) = match self.style {
            AddressingStyle::VirtualHosted => {
                (format!("{}.{}", self.bucket, self.authority), format!("/{encoded}"))
            }
            AddressingStyle::Path => (
                self.authority.clone(),
                format!("/{}/{encoded}", s3_uri_encode(&self.bucket, true)),
            ),
        };
        self.target(host, &path)
            .map_err(|reason| ClientError::invalid_key(key.logical(), reason))
    }

    /// Target for a bucket-level request such as ListObjectsV2.
    pub fn bucket_target(&self) -> Result<ResolvedTarget> {
        let (host, path) = match self.style {
            AddressingStyle::VirtualHosted => {
                (format!("{}.{}", self.bucket, self.authority), "/".to_string())
            }
            AddressingStyle::Path => (
                self.authority.clone(),
                format!("/{}", s3_uri_encode(&self.bucket, true)),
            ),
        };
        self.target(host, &path).map_err(ClientError::Config)
    }

    /// Value of `x-amz-copy-source` for `key` in this bucket.
    pub fn copy_source(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.bucket, s3_uri_encode(&key.full, false))
    }

    fn target(&self, host: String, path: &str) -> std::result::Result<ResolvedTarget, String> {
        let url = Url::parse(&format!("{}://{host}{path}", self.scheme))
            .map_err(|e| format!("cannot build request URL: {e}"))?;
        Ok(ResolvedTarget { url, host })
    }
}

/// Normalize a key or prefix: drop leading slashes and empty segments,
/// keep a single trailing slash, reject dot segments and control
/// characters.  May return an empty string.
fn normalize_path(raw: &str) -> Result<String> {
    if raw.chars().any(char::is_control) {
        return Err(ClientError::invalid_key(raw, "key contains control characters"));
    }

    let mut segments = Vec::new();
    for segment in raw.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(ClientError::invalid_key(
                    raw,
                    "key contains a relative path segment",
                ))
            }
            s => segments.push(s),
        }
    }

    let mut normalized = segments.join("/");
    if !normalized.is_empty() && raw.ends_with('/') {
        normalized.push('/');
    }
    Ok(normalized)
}

fn normalize_subfolder(raw: &str) -> Result<String> {
    let mut prefix = normalize_path(raw.trim())
        .map_err(|e| ClientError::Config(format!("invalid subfolder: {e}")))?;
    if !prefix.is_empty() && !prefix.ends_with('/') {
        prefix.push('/');
    }
    Ok(prefix)
}

// -- Tests -------------------------------------------------------------------

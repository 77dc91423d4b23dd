//! Object-level types: ACLs, cache expiry, metadata, upload payloads and
//! download streams.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Months, TimeDelta, Utc};
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio_util::io::{ReaderStream, StreamReader};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::errors::{ClientError, Result};

// ── ACL ─────────────────────────────────────────────────────────────

/// Canned ACL applied to uploaded objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Acl {
    #[default]
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "public-read")]
    PublicRead,
}

impl Acl {
    /// Value of the `x-amz-acl` header.
    pub fn as_str(&self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Acl {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Acl::Private),
            "public-read" | "public" => Ok(Acl::PublicRead),
            other => Err(ClientError::Config(format!(
                "unknown ACL {other:?}, expected private or public-read"
            ))),
        }
    }
}

// ── Cache expiry ────────────────────────────────────────────────────

/// A relative cache lifetime such as `2 weeks` or `1 year 6 months`.
///
/// Months and years are kept apart from fixed-length units so the
/// resulting `max-age` follows the calendar from the moment of upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheExpiry {
    months: u32,
    seconds: i64,
}

impl CacheExpiry {
    /// Parse a duration string.  Returns `None` for anything unparsable
    /// and for durations that add up to zero.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim().trim_start_matches('+');
        let mut tokens = input.split_whitespace();
        let mut months: u32 = 0;
        let mut seconds: i64 = 0;
        let mut any = false;

        while let Some(count) = tokens.next() {
            let count: u32 = count.parse().ok()?;
            let unit = tokens.next()?.trim_end_matches(',').to_ascii_lowercase();
            let unit = unit.strip_suffix('s').unwrap_or(&unit);
            let count_i = i64::from(count);
            match unit {
                "second" | "sec" => seconds = seconds.checked_add(count_i)?,
                "minute" | "min" => seconds = seconds.checked_add(count_i.checked_mul(60)?)?,
                "hour" => seconds = seconds.checked_add(count_i.checked_mul(3_600)?)?,
                "day" => seconds = seconds.checked_add(count_i.checked_mul(86_400)?)?,
                "week" => seconds = seconds.checked_add(count_i.checked_mul(604_800)?)?,
                "month" => months = months.checked_add(count)?,
                "year" => months = months.checked_add(count.checked_mul(12)?)?,
                _ => return None,
            }
            any = true;
        }

        if !any || (months == 0 && seconds == 0) {
            return None;
        }
        Some(Self { months, seconds })
    }

    /// Seconds from `now` until `now + self`.
    pub fn max_age_from(&self, now: DateTime<Utc>) -> Option<u64> {
        let target = now
            .checked_add_months(Months::new(self.months))?
            .checked_add_signed(TimeDelta::try_seconds(self.seconds)?)?;
        u64::try_from((target - now).num_seconds()).ok()
    }
}

/// `Cache-Control` value for an upload at `now`.
pub fn cache_control_value(expiry: &CacheExpiry, now: DateTime<Utc>) -> Option<String> {
    expiry
        .max_age_from(now)
        .filter(|secs| *secs > 0)
        .map(|secs| format!("max-age={secs}, must-revalidate"))
}

// ── Metadata ────────────────────────────────────────────────────────

/// What the service reports about a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMetadata {
    /// Logical key, subfolder stripped.
    pub key: String,
    pub size: u64,
    /// ETag without surrounding quotes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl ObjectMetadata {
    /// Build metadata from HEAD/GET/PUT response headers.
    pub fn from_headers(key: &str, headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            key: key.to_string(),
            size: text(CONTENT_LENGTH)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            etag: text(ETAG).map(|v| normalize_etag(&v)),
            last_modified: text(LAST_MODIFIED).and_then(|v| parse_http_date(&v)),
            content_type: text(CONTENT_TYPE),
        }
    }
}

/// Strip surrounding quotes from an ETag.
pub fn normalize_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

/// Parse an RFC 7231 date (`Last-Modified`).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    httpdate::parse_http_date(value).ok().map(DateTime::<Utc>::from)
}

/// Parse an ISO 8601 timestamp as used in listings.
pub fn parse_iso8601(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ── Upload payloads ─────────────────────────────────────────────────

/// Body of an upload.
pub enum PutPayload {
    /// In-memory bytes.  Re-readable; signed with its SHA-256 and sent
    /// with a `Content-MD5`.
    Bytes(Bytes),
    /// A byte stream of known length.  Sent unsigned and never buffered.
    Stream {
        stream: BoxStream<'static, io::Result<Bytes>>,
        length: u64,
    },
}

impl PutPayload {
    /// Wrap a stream that yields exactly `length` bytes.
    pub fn from_stream<S>(stream: S, length: u64) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        PutPayload::Stream {
            stream: stream.boxed(),
            length,
        }
    }

    /// Stream a local file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            ClientError::transport(format!("cannot open {}", path.display()), e)
        })?;
        let length = file
            .metadata()
            .await
            .map_err(|e| ClientError::transport(format!("cannot stat {}", path.display()), e))?
            .len();
        Ok(Self::from_stream(ReaderStream::new(file), length))
    }

    pub fn len(&self) -> u64 {
        match self {
            PutPayload::Bytes(bytes) => bytes.len() as u64,
            PutPayload::Stream { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PutPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PutPayload::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            PutPayload::Stream { length, .. } => {
                f.debug_struct("Stream").field("length", length).finish()
            }
        }
    }
}

impl From<Bytes> for PutPayload {
    fn from(bytes: Bytes) -> Self {
        PutPayload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for PutPayload {
    fn from(bytes: Vec<u8>) -> Self {
        PutPayload::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static str> for PutPayload {
    fn from(text: &'static str) -> Self {
        PutPayload::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for PutPayload {
    fn from(text: String) -> Self {
        PutPayload::Bytes(Bytes::from(text))
    }
}

/// An upload.  Unset options fall back to the client configuration.
#[derive(Debug)]
pub struct PutRequest {
    pub key: String,
    pub payload: PutPayload,
    /// Defaults to a guess from the key's extension.
    pub content_type: Option<String>,
    pub acl: Option<Acl>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    /// Extra headers, e.g. `x-amz-meta-*`.
    pub headers: HeaderMap,
}

impl PutRequest {
    pub fn new(key: impl Into<String>, payload: impl Into<PutPayload>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            content_type: None,
            acl: None,
            cache_control: None,
            content_disposition: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_acl(mut self, acl: Acl) -> Self {
        self.acl = Some(acl);
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<String>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub fn with_content_disposition(mut self, disposition: impl Into<String>) -> Self {
        self.content_disposition = Some(disposition.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Content type to send: the explicit one or a guess from the key.
    pub(crate) fn effective_content_type(&self) -> String {
        self.content_type.clone().unwrap_or_else(|| {
            mime_guess::from_path(&self.key)
                .first_or_octet_stream()
                .to_string()
        })
    }
}

// ── Download stream ─────────────────────────────────────────────────

/// Lazily listed objects.
pub type ObjectListing = BoxStream<'static, Result<ObjectMetadata>>;

/// Body of a GET, consumed lazily.
///
/// Cancelling the token handed to [`crate::Client::get`] ends the stream
/// with [`ClientError::Cancelled`] and drops the underlying connection.
pub struct ObjectStream {
    metadata: ObjectMetadata,
    body: Option<BoxStream<'static, Result<Bytes>>>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl ObjectStream {
    pub(crate) fn new(
        metadata: ObjectMetadata,
        body: BoxStream<'static, Result<Bytes>>,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            metadata,
            body: Some(body),
            cancelled: Box::pin(cancel.clone().cancelled_owned()),
        }
    }

    pub fn metadata(&self) -> &ObjectMetadata {
        &self.metadata
    }

    /// Collect the whole body into memory.
    pub async fn bytes(mut self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.metadata.size.min(8 * 1024 * 1024) as usize);
        while let Some(chunk) = self.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }

    /// Adapt the body to [`AsyncRead`], e.g. for `tokio::io::copy`.
    pub fn into_async_read(self) -> impl AsyncRead + Send + Unpin {
        StreamReader::new(self.map_err(io::Error::other))
    }
}

impl Stream for ObjectStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(body) = this.body.as_mut() else {
            return Poll::Ready(None);
        };

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.body = None;
            return Poll::Ready(Some(Err(ClientError::Cancelled)));
        }

        match body.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.body = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(err))) => {
                this.body = None;
                Poll::Ready(Some(Err(err)))
            }
            other => other,
        }
    }
}

impl fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStream")
            .field("metadata", &self.metadata)
            .field("finished", &self.body.is_none())
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

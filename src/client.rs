//! The object storage client.
//!
//! [`Client`] ties the pieces together: keys go through the
//! [`EndpointResolver`], requests are signed by the [`Signer`] and sent by
//! the [`Transport`], and failures come back through
//! [`map_service_error`].  A `Client` is cheap to clone and safe to share
//! between tasks.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use garde::Validate;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_TYPE, ETAG, HOST,
};
use md5::{Digest, Md5};
use reqwest::{Body, Method, Response};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{ClientConfig, Credentials};
use crate::errors::{map_service_error, ClientError, Result};
use crate::metrics;
use crate::object::{
    cache_control_value, normalize_etag, parse_http_date, parse_iso8601, Acl, ObjectListing,
    ObjectMetadata, ObjectStream, PutPayload, PutRequest,
};
use crate::resolver::{EndpointResolver, ObjectKey, ResolvedTarget};
use crate::signer::{
    payload_sha256, s3_uri_encode, SignableRequest, Signer, EMPTY_SHA256, UNSIGNED_PAYLOAD,
};
use crate::transport::Transport;
use crate::xml::{
    parse_copy_result, parse_error_document, parse_list_objects, ListBucketResult, ListEntry,
};

const X_AMZ_ACL: HeaderName = HeaderName::from_static("x-amz-acl");
const X_AMZ_COPY_SOURCE: HeaderName = HeaderName::from_static("x-amz-copy-source");
const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// Content type of directory marker objects.
const DIRECTORY_CONTENT_TYPE: &str = "application/x-directory";

/// S3-compatible object storage client.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ClientConfig,
    credentials: Credentials,
    signer: Signer,
    resolver: EndpointResolver,
    transport: Transport,
}

impl Client {
    /// Validate `config` and `credentials` and build a client.
    ///
    /// Fails with [`ClientError::Config`] on any invalid setting; nothing is
    /// sent over the network.
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        config.check()?;
        credentials
            .validate()
            .map_err(|report| ClientError::Config(format!("credentials: {report}")))?;

        let resolver = EndpointResolver::new(
            &config.endpoint,
            &config.bucket,
            &config.subfolder,
            config.addressing,
        )?;
        let transport = Transport::new(&config.transport)?;
        let signer = Signer::new(config.region.clone());

        info!(
            "Object storage client initialized: endpoint={} bucket={} region={} prefix='{}'",
            config.endpoint,
            config.bucket,
            config.region,
            resolver.prefix()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                credentials,
                signer,
                resolver,
                transport,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // -- Operations ----------------------------------------------------------

    /// Upload an object.
    ///
    /// ACL, `Cache-Control` and `Content-Disposition` come from the
    /// configuration unless the request overrides them.  Succeeds only when
    /// the service answers 2xx with an ETag equal to the MD5 of the bytes
    /// actually sent.
    pub async fn put(
        &self,
        request: PutRequest,
        cancel: &CancellationToken,
    ) -> Result<ObjectMetadata> {
        instrument("put", self.put_inner(request, cancel)).await
    }

    async fn put_inner(
        &self,
        request: PutRequest,
        cancel: &CancellationToken,
    ) -> Result<ObjectMetadata> {
        let key = self.inner.resolver.key(&request.key)?;
        let target = self.inner.resolver.resolve(&key)?;
        let content_type = request.effective_content_type();
        let length = request.payload.len();

        let mut headers = request.headers;
        headers.insert(CONTENT_TYPE, header_value(&content_type)?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        let acl = request.acl.unwrap_or(self.inner.config.default_acl);
        headers.insert(X_AMZ_ACL, HeaderValue::from_static(acl.as_str()));

        let cache_control = request.cache_control.or_else(|| {
            self.inner
                .config
                .cache_expiry
                .as_ref()
                .and_then(|expiry| cache_control_value(expiry, Utc::now()))
        });
        if let Some(value) = cache_control {
            headers.insert(CACHE_CONTROL, header_value(&value)?);
        }
        let disposition = request
            .content_disposition
            .or_else(|| self.inner.config.content_disposition.clone());
        if let Some(value) = disposition {
            headers.insert(CONTENT_DISPOSITION, header_value(&value)?);
        }

        debug!(
            "put: bucket={} key={} size={}",
            self.inner.config.bucket,
            key.as_str(),
            length
        );

        let digest = Arc::new(Mutex::new(Md5::new()));
        let (body, payload_hash) = match request.payload {
            PutPayload::Bytes(bytes) => {
                let md5 = Md5::digest(&bytes);
                headers.insert(CONTENT_MD5, header_value(&BASE64.encode(md5))?);
                lock(&digest).update(&bytes);
                let hash = payload_sha256(&bytes);
                (Body::from(bytes), hash)
            }
            PutPayload::Stream { stream, .. } => {
                let hasher = digest.clone();
                let stream = stream.inspect_ok(move |chunk: &Bytes| lock(&hasher).update(chunk));
                (Body::wrap_stream(stream), UNSIGNED_PAYLOAD.to_string())
            }
        };

        let http_request = self.signed_request(
            Method::PUT,
            &target,
            headers,
            &payload_hash,
            Some(body),
        )?;
        let response = self.inner.transport.send(http_request, cancel).await?;
        let response = check(response, key.logical(), cancel).await?;

        let computed = hex::encode(std::mem::take(&mut *lock(&digest)).finalize());
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(normalize_etag);
        match etag.as_deref() {
            Some(etag) if etag.eq_ignore_ascii_case(&computed) => {}
            Some(etag) => {
                return Err(ClientError::Storage {
                    status: Some(response.status().as_u16()),
                    code: "BadDigest".to_string(),
                    message: format!("ETag {etag} does not match uploaded MD5 {computed}"),
                })
            }
            None => {
                return Err(ClientError::Storage {
                    status: Some(response.status().as_u16()),
                    code: "BadDigest".to_string(),
                    message: "service returned no ETag for the upload".to_string(),
                })
            }
        }

        metrics::record_bytes_sent(length);
        Ok(ObjectMetadata {
            key: key.logical().to_string(),
            size: length,
            etag,
            last_modified: response
                .headers()
                .get(http::header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_http_date),
            content_type: Some(content_type),
        })
    }

    /// Download an object as a lazily consumed stream.
    pub async fn get(&self, key: &str, cancel: &CancellationToken) -> Result<ObjectStream> {
        instrument("get", self.get_inner(key, cancel)).await
    }

    async fn get_inner(&self, raw: &str, cancel: &CancellationToken) -> Result<ObjectStream> {
        let key = self.inner.resolver.key(raw)?;
        debug!("get: bucket={} key={}", self.inner.config.bucket, key.as_str());

        let response = self.send_empty(Method::GET, &key, cancel).await?;
        let metadata = ObjectMetadata::from_headers(key.logical(), response.headers());

        let body = response
            .bytes_stream()
            .map(|chunk| -> Result<Bytes> {
                let chunk = chunk.map_err(ClientError::from)?;
                metrics::record_bytes_received(chunk.len() as u64);
                Ok(chunk)
            })
            .boxed();
        Ok(ObjectStream::new(metadata, body, cancel))
    }

    /// Fetch an object's metadata without its body.
    pub async fn head(&self, key: &str, cancel: &CancellationToken) -> Result<ObjectMetadata> {
        instrument("head", self.head_inner(key, cancel)).await
    }

    async fn head_inner(&self, raw: &str, cancel: &CancellationToken) -> Result<ObjectMetadata> {
        let key = self.inner.resolver.key(raw)?;
        debug!("head: bucket={} key={}", self.inner.config.bucket, key.as_str());

        let response = self.send_empty(Method::HEAD, &key, cancel).await?;
        Ok(ObjectMetadata::from_headers(key.logical(), response.headers()))
    }

    /// Whether an object exists.
    pub async fn exists(&self, key: &str, cancel: &CancellationToken) -> Result<bool> {
        match self.head(key, cancel).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Delete an object.  Deleting an absent key succeeds.
    pub async fn delete(&self, key: &str, cancel: &CancellationToken) -> Result<()> {
        instrument("delete", self.delete_inner(key, cancel)).await
    }

    async fn delete_inner(&self, raw: &str, cancel: &CancellationToken) -> Result<()> {
        let key = self.inner.resolver.key(raw)?;
        debug!("delete: bucket={} key={}", self.inner.config.bucket, key.as_str());

        match self.send_empty(Method::DELETE, &key, cancel).await {
            Ok(_) | Err(ClientError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// List objects under `prefix`, in the service's lexicographic order.
    ///
    /// Pages are fetched on demand as the stream is polled.  The listing is
    /// not resumable; call `list` again to start over.  Keys are reported
    /// relative to the subfolder.
    pub fn list(&self, prefix: &str, cancel: &CancellationToken) -> Result<ObjectListing> {
        let full_prefix = self.inner.resolver.list_prefix(prefix)?;
        debug!(
            "list: bucket={} prefix={}",
            self.inner.config.bucket, full_prefix
        );

        let state = ListState {
            client: self.clone(),
            prefix: full_prefix,
            token: None,
            done: false,
            cancel: cancel.clone(),
        };

        let listing = stream::try_unfold(state, |mut state| async move {
            if state.done {
                return Ok(None);
            }
            let page = instrument(
                "list_page",
                state.client.list_page(&state.prefix, state.token.as_deref(), &state.cancel),
            )
            .await?;

            let next = if page.is_truncated {
                match page.next_continuation_token.clone() {
                    Some(token) if !token.is_empty() => Some(token),
                    _ => {
                        return Err(ClientError::Storage {
                            status: None,
                            code: "InvalidContinuationToken".to_string(),
                            message: "truncated listing carried no continuation token"
                                .to_string(),
                        })
                    }
                }
            } else {
                None
            };
            if next.is_some() && next == state.token {
                return Err(ClientError::Storage {
                    status: None,
                    code: "InvalidContinuationToken".to_string(),
                    message: "service repeated the previous continuation token".to_string(),
                });
            }
            state.done = next.is_none();
            state.token = next;

            let entries: Vec<Result<ObjectMetadata>> = page
                .contents
                .into_iter()
                .filter_map(|entry| state.client.listed_metadata(&state.prefix, entry))
                .map(Ok)
                .collect();
            Ok::<_, ClientError>(Some((stream::iter(entries), state)))
        })
        .try_flatten()
        .boxed();

        Ok(listing)
    }

    async fn list_page(
        &self,
        full_prefix: &str,
        token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ListBucketResult> {
        let mut query = format!(
            "list-type=2&max-keys={}&prefix={}",
            self.inner.config.list_page_size,
            s3_uri_encode(full_prefix, true)
        );
        if let Some(token) = token {
            query.push_str("&continuation-token=");
            query.push_str(&s3_uri_encode(token, true));
        }

        let target = self.inner.resolver.bucket_target()?.with_query(&query);
        let request =
            self.signed_request(Method::GET, &target, HeaderMap::new(), EMPTY_SHA256, None)?;
        let response = self.inner.transport.send(request, cancel).await?;
        let response = check(response, full_prefix, cancel).await?;
        let body = read_text(response, cancel).await?;
        metrics::record_bytes_received(body.len() as u64);
        parse_list_objects(&body)
    }

    fn listed_metadata(
        &self,
        full_prefix: &str,
        entry: ListEntry,
    ) -> Option<ObjectMetadata> {
        if !entry.key.starts_with(full_prefix) {
            debug!("list: skipping key outside prefix: {}", entry.key);
            return None;
        }
        let logical = self.inner.resolver.strip_prefix(&entry.key)?;
        Some(ObjectMetadata {
            key: logical.to_string(),
            size: entry.size,
            etag: entry.etag.as_deref().map(normalize_etag),
            last_modified: entry.last_modified.as_deref().and_then(parse_iso8601),
            content_type: None,
        })
    }

    /// Server-side copy of `src` to `dst`, applying the default ACL.
    pub async fn copy(&self, src: &str, dst: &str, cancel: &CancellationToken) -> Result<()> {
        instrument("copy", self.copy_inner(src, dst, cancel)).await
    }

    async fn copy_inner(&self, src: &str, dst: &str, cancel: &CancellationToken) -> Result<()> {
        let source = self.inner.resolver.key(src)?;
        let destination = self.inner.resolver.key(dst)?;
        let target = self.inner.resolver.resolve(&destination)?;
        debug!(
            "copy: bucket={} src={} dst={}",
            self.inner.config.bucket,
            source.as_str(),
            destination.as_str()
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            X_AMZ_COPY_SOURCE,
            header_value(&self.inner.resolver.copy_source(&source))?,
        );
        headers.insert(
            X_AMZ_ACL,
            HeaderValue::from_static(self.inner.config.default_acl.as_str()),
        );

        let request = self.signed_request(Method::PUT, &target, headers, EMPTY_SHA256, None)?;
        let response = self.inner.transport.send(request, cancel).await?;
        let response = check(response, source.logical(), cancel).await?;
        let status = response.status().as_u16();
        let body = read_text(response, cancel).await?;

        // A copy can fail after the 200 status line has been sent.
        if parse_error_document(&body).is_some() {
            return Err(map_service_error(status, &body, source.logical()));
        }
        if !body.trim().is_empty() {
            parse_copy_result(&body)?;
        }
        Ok(())
    }

    /// Copy `src` to `dst`, then delete `src`.
    pub async fn rename(&self, src: &str, dst: &str, cancel: &CancellationToken) -> Result<()> {
        self.copy(src, dst, cancel).await?;
        self.delete(src, cancel).await
    }

    /// Create an empty `path/` directory marker.
    pub async fn create_dir(&self, path: &str, cancel: &CancellationToken) -> Result<ObjectMetadata> {
        let marker = if path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let request =
            PutRequest::new(marker, Bytes::new()).with_content_type(DIRECTORY_CONTENT_TYPE);
        self.put(request, cancel).await
    }

    /// Delete every object in the directory `prefix`, returning how many
    /// were deleted.  A missing trailing `/` is added.
    ///
    /// An empty prefix is rejected rather than wiping the whole subfolder.
    pub async fn delete_prefix(&self, prefix: &str, cancel: &CancellationToken) -> Result<u64> {
        if prefix.trim_matches('/').is_empty() {
            return Err(ClientError::invalid_key(
                prefix,
                "refusing to delete with an empty prefix",
            ));
        }

        // A prefix names a directory: `photos` must not match `photos-archive/`.
        let directory = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{prefix}/")
        };

        let mut listing = self.list(&directory, cancel)?;
        let mut deleted = 0u64;
        while let Some(object) = listing.try_next().await? {
            self.delete(&object.key, cancel).await?;
            deleted += 1;
        }
        info!(
            "Deleted {} objects under prefix '{}' in bucket {}",
            deleted, directory, self.inner.config.bucket
        );
        Ok(deleted)
    }

    /// Public URL of `key`, or of the volume root when `key` is empty.
    ///
    /// Only available when objects are publicly readable: either an explicit
    /// public base URL is configured or the default ACL is `public-read`.
    pub fn root_url(&self, key: &str) -> Result<String> {
        let config = &self.inner.config;
        let resolver = &self.inner.resolver;
        let path = if key.trim_matches('/').is_empty() {
            s3_uri_encode(resolver.prefix(), false)
        } else {
            s3_uri_encode(resolver.key(key)?.as_str(), false)
        };

        if let Some(base) = config.public_url.as_deref() {
            return Ok(format!("{}/{}", base.trim_end_matches('/'), path));
        }
        if config.default_acl == Acl::PublicRead {
            let bucket = resolver.bucket_target()?.url;
            return Ok(format!("{}/{}", bucket.as_str().trim_end_matches('/'), path));
        }
        Err(ClientError::Storage {
            status: None,
            code: "NotPublic".to_string(),
            message: format!(
                "bucket {} is private and no public URL is configured",
                config.bucket
            ),
        })
    }

    /// Time-limited URL granting `method` on `key` without credentials.
    pub fn presigned_url(&self, method: Method, key: &str, expires: Duration) -> Result<String> {
        let key = self.inner.resolver.key(key)?;
        let target = self.inner.resolver.resolve(&key)?;
        let query = self.inner.signer.presign(
            method.as_str(),
            target.canonical_path(),
            &target.host,
            Utc::now(),
            expires.as_secs(),
            &self.inner.credentials,
        )?;
        Ok(target.with_query(&query).url.to_string())
    }

    // -- Request plumbing ----------------------------------------------------

    fn signed_request(
        &self,
        method: Method,
        target: &ResolvedTarget,
        mut headers: HeaderMap,
        payload_hash: &str,
        body: Option<Body>,
    ) -> Result<reqwest::Request> {
        headers.insert(HOST, header_value(&target.host)?);
        let signable = SignableRequest {
            method: method.as_str(),
            canonical_path: target.canonical_path(),
            query: target.url.query().unwrap_or(""),
            headers: &headers,
            payload_hash,
        };
        let signed = self
            .inner
            .signer
            .sign(&signable, Utc::now(), &self.inner.credentials)?;

        let mut builder = self
            .inner
            .transport
            .request(method, target.url.clone())
            .headers(signed);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        builder.build().map_err(ClientError::from)
    }

    /// Send a bodiless request for `key` and map failures.
    async fn send_empty(
        &self,
        method: Method,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let target = self.inner.resolver.resolve(key)?;
        let request = self.signed_request(method, &target, HeaderMap::new(), EMPTY_SHA256, None)?;
        let response = self.inner.transport.send(request, cancel).await?;
        check(response, key.logical(), cancel).await
    }
}

struct ListState {
    client: Client,
    prefix: String,
    token: Option<String>,
    done: bool,
    cancel: CancellationToken,
}

/// Pass 2xx responses through; map anything else to a [`ClientError`].
async fn check(response: Response, key: &str, cancel: &CancellationToken) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    match read_text(response, cancel).await {
        Ok(body) => Err(map_service_error(status, &body, key)),
        Err(ClientError::Cancelled) => Err(ClientError::Cancelled),
        Err(err) => {
            debug!("Failed to read error body for status {}: {}", status, err);
            Err(map_service_error(status, "", key))
        }
    }
}

async fn read_text(response: Response, cancel: &CancellationToken) -> Result<String> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        text = response.text() => text.map_err(ClientError::from),
    }
}

async fn instrument<T, F>(operation: &'static str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    metrics::record_operation(operation, metrics::status_label(&result), start.elapsed());
    result
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::Config(format!("value cannot be sent as a header: {value:?}")))
}

// -- Tests -------------------------------------------------------------------

//! In-process S3 service for tests.
//!
//! Speaks just enough of the S3 REST API (path-style only) to exercise the
//! client end to end: it verifies SigV4 header and query signatures, keeps
//! objects in memory, pages ListObjectsV2, and answers failures with S3
//! `<Error>` documents.  A body that does not arrive completely is never
//! stored.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use md5::{Digest, Md5};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::client::Client;
use crate::config::{ClientConfig, Credentials};
use crate::resolver::AddressingStyle;
use crate::signer::{
    build_canonical_request, build_string_to_sign, compute_signature, derive_signing_key,
    payload_sha256, UNSIGNED_PAYLOAD,
};

pub const ACCESS_KEY: &str = "AKIDMOCKSPACES0001";
pub const SECRET_KEY: &str = "mock/Secret+Key/0001";
pub const BUCKET: &str = "assets";
pub const REGION: &str = "nyc3";

/// Key injected into listings by [`MockS3::leak_foreign_keys`].
const FOREIGN_KEY: &str = "zzz-outside/leaked.txt";

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Bytes,
    pub etag: String,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub acl: Option<String>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Default)]
struct MockState {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    quota: Mutex<Option<u64>>,
    requests: AtomicUsize,
    list_requests: AtomicUsize,
    leak_foreign_keys: AtomicBool,
    corrupt_etags: AtomicBool,
    fail_copies_in_body: AtomicBool,
    drop_continuation_tokens: AtomicBool,
}

/// A running mock service bound to an ephemeral localhost port.
pub struct MockS3 {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockS3 {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Path-style configuration pointing at this service.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(format!("http://{}", self.addr), REGION, BUCKET)
            .with_addressing(AddressingStyle::Path)
    }

    pub fn client(&self) -> Client {
        self.client_with(|config| config)
    }

    pub fn client_with(&self, customize: impl FnOnce(ClientConfig) -> ClientConfig) -> Client {
        Client::new(customize(self.config()), Credentials::new(ACCESS_KEY, SECRET_KEY)).unwrap()
    }

    /// Stored object by full key.
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.state.objects.lock().unwrap().get(key).cloned()
    }

    /// Cap on the total stored bytes.
    pub fn set_quota(&self, bytes: Option<u64>) {
        *self.state.quota.lock().unwrap() = bytes;
    }

    /// Add a key outside the requested prefix to every listing.
    pub fn leak_foreign_keys(&self, enabled: bool) {
        self.state.leak_foreign_keys.store(enabled, Ordering::SeqCst);
    }

    /// Answer uploads with an ETag that matches nothing.
    pub fn corrupt_etags(&self, enabled: bool) {
        self.state.corrupt_etags.store(enabled, Ordering::SeqCst);
    }

    /// Fail copies with a 200 status and an `<Error>` body.
    pub fn fail_copies_in_body(&self, enabled: bool) {
        self.state.fail_copies_in_body.store(enabled, Ordering::SeqCst);
    }

    /// Mark truncated listings without a `NextContinuationToken`.
    pub fn drop_continuation_tokens(&self, enabled: bool) {
        self.state
            .drop_continuation_tokens
            .store(enabled, Ordering::SeqCst);
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }

    pub fn list_requests(&self) -> usize {
        self.state.list_requests.load(Ordering::SeqCst)
    }
}

// ── Routing ─────────────────────────────────────────────────────────

async fn handle(State(state): State<Arc<MockState>>, request: Request) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let (parts, body) = request.into_parts();

    if let Err(response) = verify_signature(&parts) {
        return response;
    }

    let path = parts.uri.path().to_string();
    let bucket_path = format!("/{BUCKET}");
    let Some(rest) = path.strip_prefix(&bucket_path) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "NoSuchBucket",
            "The specified bucket does not exist",
            &path,
        );
    };
    let key = percent_decode(rest.strip_prefix('/').unwrap_or(rest));
    let query = parse_query(parts.uri.query().unwrap_or(""));

    match (&parts.method, key.is_empty()) {
        (&Method::GET, true) => list_objects(&state, &query),
        (&Method::PUT, false) if parts.headers.contains_key("x-amz-copy-source") => {
            copy_object(&state, &key, &parts.headers)
        }
        (&Method::PUT, false) => put_object(&state, &key, &parts.headers, body).await,
        (&Method::GET, false) => get_object(&state, &key, true),
        (&Method::HEAD, false) => get_object(&state, &key, false),
        (&Method::DELETE, false) => {
            state.objects.lock().unwrap().remove(&key);
            StatusCode::NO_CONTENT.into_response()
        }
        _ => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "MethodNotAllowed",
            "The specified method is not allowed against this resource",
            &path,
        ),
    }
}

// ── Handlers ────────────────────────────────────────────────────────

async fn put_object(state: &MockState, key: &str, headers: &HeaderMap, body: Body) -> Response {
    let resource = format!("/{BUCKET}/{key}");
    let data = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(data) => data,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "IncompleteBody",
                "The request body terminated unexpectedly",
                &resource,
            )
        }
    };

    let declared = header_str(headers, "content-length").and_then(|v| v.parse::<usize>().ok());
    if declared != Some(data.len()) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "IncompleteBody",
            "You did not provide the number of bytes specified by the Content-Length HTTP header",
            &resource,
        );
    }

    if let Some(md5) = header_str(headers, "content-md5") {
        if BASE64.encode(Md5::digest(&data)) != md5 {
            return error_response(
                StatusCode::BAD_REQUEST,
                "BadDigest",
                "The Content-MD5 you specified did not match what we received",
                &resource,
            );
        }
    }

    match header_str(headers, "x-amz-content-sha256") {
        Some(UNSIGNED_PAYLOAD) => {}
        Some(hash) if hash == payload_sha256(&data) => {}
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "XAmzContentSHA256Mismatch",
                "The provided 'x-amz-content-sha256' header does not match what was computed",
                &resource,
            )
        }
    }

    let mut objects = state.objects.lock().unwrap();
    if let Some(quota) = *state.quota.lock().unwrap() {
        let used: u64 = objects
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(_, o)| o.data.len() as u64)
            .sum();
        if used + data.len() as u64 > quota {
            return error_response(
                StatusCode::FORBIDDEN,
                "QuotaExceeded",
                "The storage quota for this account has been exceeded",
                &resource,
            );
        }
    }

    let etag = hex::encode(Md5::digest(&data));
    let object = StoredObject {
        data,
        etag: etag.clone(),
        content_type: header_str(headers, "content-type").map(str::to_string),
        cache_control: header_str(headers, "cache-control").map(str::to_string),
        content_disposition: header_str(headers, "content-disposition").map(str::to_string),
        acl: header_str(headers, "x-amz-acl").map(str::to_string),
        last_modified: Utc::now(),
    };
    objects.insert(key.to_string(), object);

    let returned = if state.corrupt_etags.load(Ordering::SeqCst) {
        "00000000000000000000000000000000".to_string()
    } else {
        etag
    };
    let mut response = StatusCode::OK.into_response();
    response.headers_mut().insert(
        header::ETAG,
        HeaderValue::from_str(&format!("\"{returned}\"")).unwrap(),
    );
    response
}

fn get_object(state: &MockState, key: &str, with_body: bool) -> Response {
    let Some(object) = state.objects.lock().unwrap().get(key).cloned() else {
        if !with_body {
            return StatusCode::NOT_FOUND.into_response();
        }
        return error_response(
            StatusCode::NOT_FOUND,
            "NoSuchKey",
            "The specified key does not exist.",
            &format!("/{BUCKET}/{key}"),
        );
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(object.data.len()));
    headers.insert(
        header::ETAG,
        HeaderValue::from_str(&format!("\"{}\"", object.etag)).unwrap(),
    );
    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&httpdate::fmt_http_date(SystemTime::from(object.last_modified)))
            .unwrap(),
    );
    if let Some(content_type) = &object.content_type {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
    }

    let body = if with_body {
        Body::from(object.data)
    } else {
        Body::empty()
    };
    (StatusCode::OK, headers, body).into_response()
}

fn copy_object(state: &MockState, key: &str, headers: &HeaderMap) -> Response {
    let resource = format!("/{BUCKET}/{key}");
    if state.fail_copies_in_body.load(Ordering::SeqCst) {
        let body = render_error("InternalError", "We encountered an internal error.", &resource, "mock");
        return (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], body).into_response();
    }

    let source = percent_decode(header_str(headers, "x-amz-copy-source").unwrap_or_default());
    let source = source.trim_start_matches('/');
    let Some(source_key) = source.strip_prefix(&format!("{BUCKET}/")) else {
        return error_response(
            StatusCode::NOT_FOUND,
            "NoSuchBucket",
            "The specified bucket does not exist",
            source,
        );
    };

    let mut objects = state.objects.lock().unwrap();
    let Some(mut object) = objects.get(source_key).cloned() else {
        return error_response(
            StatusCode::NOT_FOUND,
            "NoSuchKey",
            "The specified key does not exist.",
            &format!("/{source}"),
        );
    };
    object.acl = header_str(headers, "x-amz-acl").map(str::to_string);
    object.last_modified = Utc::now();
    let body = render_copy_object_result(&object.etag, &object.last_modified.to_rfc3339());
    objects.insert(key.to_string(), object);

    (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn list_objects(state: &MockState, query: &BTreeMap<String, String>) -> Response {
    state.list_requests.fetch_add(1, Ordering::SeqCst);
    if query.get("list-type").map(String::as_str) != Some("2") {
        return error_response(
            StatusCode::BAD_REQUEST,
            "InvalidArgument",
            "Only ListObjectsV2 is supported",
            BUCKET,
        );
    }

    let prefix = query.get("prefix").cloned().unwrap_or_default();
    let max_keys: usize = query
        .get("max-keys")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000);
    let token = query.get("continuation-token");

    let objects = state.objects.lock().unwrap();
    let mut matching: Vec<(&String, &StoredObject)> = objects
        .iter()
        .filter(|(key, _)| key.starts_with(&prefix))
        .filter(|(key, _)| token.map_or(true, |t| key.as_str() > t.as_str()))
        .take(max_keys + 1)
        .collect();
    let is_truncated = matching.len() > max_keys;
    matching.truncate(max_keys);
    let next_token = if is_truncated && !state.drop_continuation_tokens.load(Ordering::SeqCst) {
        matching.last().map(|(key, _)| key.to_string())
    } else {
        None
    };

    let mut entries: Vec<ListedObject> = matching
        .iter()
        .map(|(key, object)| ListedObject {
            key: key.to_string(),
            last_modified: object.last_modified.to_rfc3339(),
            etag: format!("\"{}\"", object.etag),
            size: object.data.len() as u64,
        })
        .collect();
    if state.leak_foreign_keys.load(Ordering::SeqCst) {
        entries.push(ListedObject {
            key: FOREIGN_KEY.to_string(),
            last_modified: Utc::now().to_rfc3339(),
            etag: "\"d41d8cd98f00b204e9800998ecf8427e\"".to_string(),
            size: 0,
        });
    }

    let body = render_list_objects_result(
        &prefix,
        max_keys,
        is_truncated,
        &entries,
        token.map(String::as_str),
        next_token.as_deref(),
    );
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

// ── Signature verification ──────────────────────────────────────────

/// Fields of an `Authorization: AWS4-HMAC-SHA256 ...` header.
#[derive(Debug)]
struct AuthorizationHeader {
    access_key_id: String,
    date_stamp: String,
    region: String,
    service: String,
    signed_headers: String,
    signature: String,
    credential_scope: String,
}

fn parse_authorization_header(header: &str) -> Result<AuthorizationHeader, String> {
    let rest = header
        .trim()
        .strip_prefix("AWS4-HMAC-SHA256")
        .ok_or("Authorization header does not start with AWS4-HMAC-SHA256")?
        .trim();

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;
    for part in rest.split(',') {
        let part = part.trim();
        if let Some(val) = part.strip_prefix("Credential=") {
            credential = Some(val.trim().to_string());
        } else if let Some(val) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(val.trim().to_string());
        } else if let Some(val) = part.strip_prefix("Signature=") {
            signature = Some(val.trim().to_string());
        }
    }

    let credential = credential.ok_or("Missing Credential in Authorization header")?;
    let signed_headers = signed_headers.ok_or("Missing SignedHeaders in Authorization header")?;
    let signature = signature.ok_or("Missing Signature in Authorization header")?;
    let scope = parse_credential(&credential)?;

    Ok(AuthorizationHeader {
        access_key_id: scope.0,
        date_stamp: scope.1,
        region: scope.2,
        service: scope.3,
        signed_headers,
        signature,
        credential_scope: scope.4,
    })
}

/// Split `AKID/YYYYMMDD/region/service/aws4_request` into its parts plus
/// the scope string.
fn parse_credential(
    credential: &str,
) -> Result<(String, String, String, String, String), String> {
    let parts: Vec<&str> = credential.splitn(5, '/').collect();
    if parts.len() != 5 || parts[4] != "aws4_request" {
        return Err("Invalid Credential format".to_string());
    }
    Ok((
        parts[0].to_string(),
        parts[1].to_string(),
        parts[2].to_string(),
        parts[3].to_string(),
        format!("{}/{}/{}/{}", parts[1], parts[2], parts[3], parts[4]),
    ))
}

fn verify_signature(parts: &Parts) -> Result<(), Response> {
    let method = parts.method.as_str();
    let path = parts.uri.path();
    let query = parts.uri.query().unwrap_or("");
    let params = parse_query(query);
    let denied = |code: &str, message: &str| {
        error_response(StatusCode::FORBIDDEN, code, message, path)
    };

    let (access_key, date_stamp, region, service, scope, amz_date, signed_headers, signature, payload_hash) =
        if let Some(auth) = header_str(&parts.headers, "authorization") {
            let parsed = parse_authorization_header(auth).map_err(|m| denied("AccessDenied", &m))?;
            let amz_date = header_str(&parts.headers, "x-amz-date")
                .ok_or_else(|| denied("AccessDenied", "Missing x-amz-date"))?;
            let payload_hash = header_str(&parts.headers, "x-amz-content-sha256")
                .ok_or_else(|| denied("AccessDenied", "Missing x-amz-content-sha256"))?;
            (
                parsed.access_key_id,
                parsed.date_stamp,
                parsed.region,
                parsed.service,
                parsed.credential_scope,
                amz_date.to_string(),
                parsed.signed_headers,
                parsed.signature,
                payload_hash.to_string(),
            )
        } else if let Some(signature) = params.get("X-Amz-Signature") {
            let param = |name: &str| {
                params
                    .get(name)
                    .cloned()
                    .ok_or_else(|| denied("AccessDenied", &format!("Missing {name}")))
            };
            let (access_key, date_stamp, region, service, scope) =
                parse_credential(&param("X-Amz-Credential")?).map_err(|m| denied("AccessDenied", &m))?;
            let amz_date = param("X-Amz-Date")?;
            let expires: i64 = param("X-Amz-Expires")?
                .parse()
                .map_err(|_| denied("AuthorizationQueryParametersError", "Bad X-Amz-Expires"))?;
            let signed_at = NaiveDateTime::parse_from_str(&amz_date, "%Y%m%dT%H%M%SZ")
                .map_err(|_| denied("AccessDenied", "Bad X-Amz-Date"))?
                .and_utc();
            if signed_at + TimeDelta::seconds(expires) < Utc::now() {
                return Err(denied("AccessDenied", "Request has expired"));
            }
            (
                access_key,
                date_stamp,
                region,
                service,
                scope,
                amz_date,
                param("X-Amz-SignedHeaders")?,
                signature.clone(),
                UNSIGNED_PAYLOAD.to_string(),
            )
        } else {
            return Err(denied("AccessDenied", "Access Denied"));
        };

    if access_key != ACCESS_KEY {
        return Err(denied(
            "InvalidAccessKeyId",
            "The AWS Access Key Id you provided does not exist in our records.",
        ));
    }
    if region != REGION {
        return Err(denied("AuthorizationHeaderMalformed", "Unexpected region"));
    }

    let headers: Vec<(String, String)> = signed_headers
        .split(';')
        .map(|name| {
            let values: Vec<&str> = parts
                .headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            (name.to_string(), values.join(","))
        })
        .collect();

    let canonical_request =
        build_canonical_request(method, path, query, &headers, &signed_headers, &payload_hash);
    let string_to_sign = build_string_to_sign(&amz_date, &scope, &canonical_request);
    let signing_key = derive_signing_key(SECRET_KEY, &date_stamp, &region, &service);
    if compute_signature(&signing_key, &string_to_sign) != signature {
        return Err(denied(
            "SignatureDoesNotMatch",
            "The request signature we calculated does not match the signature you provided.",
        ));
    }
    Ok(())
}

// ── XML rendering ───────────────────────────────────────────────────

struct ListedObject {
    key: String,
    last_modified: String,
    etag: String,
    size: u64,
}

fn error_response(status: StatusCode, code: &str, message: &str, resource: &str) -> Response {
    let body = render_error(code, message, resource, "mock-request");
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn new_document() -> Writer<Cursor<Vec<u8>>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .expect("xml decl");
    writer
}

fn finish_document(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("valid utf-8")
}

fn render_error(code: &str, message: &str, resource: &str, request_id: &str) -> String {
    let mut writer = new_document();
    write_simple_element_group(
        &mut writer,
        "Error",
        &[
            ("Code", code),
            ("Message", message),
            ("Resource", resource),
            ("RequestId", request_id),
        ],
    );
    finish_document(writer)
}

fn render_copy_object_result(etag: &str, last_modified: &str) -> String {
    let mut writer = new_document();
    let etag = format!("\"{etag}\"");
    write_simple_element_group(
        &mut writer,
        "CopyObjectResult",
        &[("ETag", &etag), ("LastModified", last_modified)],
    );
    finish_document(writer)
}

fn render_list_objects_result(
    prefix: &str,
    max_keys: usize,
    is_truncated: bool,
    entries: &[ListedObject],
    continuation_token: Option<&str>,
    next_continuation_token: Option<&str>,
) -> String {
    let mut writer = new_document();
    let root = BytesStart::new("ListBucketResult")
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).expect("start root");

    write_text_element(&mut writer, "Name", BUCKET);
    write_text_element(&mut writer, "Prefix", prefix);
    write_text_element(&mut writer, "MaxKeys", &max_keys.to_string());
    write_text_element(&mut writer, "KeyCount", &entries.len().to_string());
    write_text_element(
        &mut writer,
        "IsTruncated",
        if is_truncated { "true" } else { "false" },
    );
    if let Some(token) = continuation_token {
        write_text_element(&mut writer, "ContinuationToken", token);
    }
    if let Some(token) = next_continuation_token {
        write_text_element(&mut writer, "NextContinuationToken", token);
    }

    for entry in entries {
        let size = entry.size.to_string();
        write_simple_element_group(
            &mut writer,
            "Contents",
            &[
                ("Key", &entry.key),
                ("LastModified", &entry.last_modified),
                ("ETag", &entry.etag),
                ("Size", &size),
                ("StorageClass", "STANDARD"),
            ],
        );
    }

    writer
        .write_event(Event::End(BytesEnd::new("ListBucketResult")))
        .expect("end root");
    finish_document(writer)
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .expect("start tag");
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .expect("text");
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .expect("end tag");
}

fn write_simple_element_group(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    parent: &str,
    children: &[(&str, &str)],
) {
    writer
        .write_event(Event::Start(BytesStart::new(parent)))
        .expect("start parent");
    for (tag, value) in children {
        write_text_element(writer, tag, value);
    }
    writer
        .write_event(Event::End(BytesEnd::new(parent)))
        .expect("end parent");
}

// ── Helpers ─────────────────────────────────────────────────────────

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::{parse_error_document, parse_list_objects};

    #[test]
    fn test_parse_authorization_header() {
        let parsed = parse_authorization_header(
            "AWS4-HMAC-SHA256 Credential=AKID/20260222/nyc3/s3/aws4_request, \
             SignedHeaders=host;x-amz-date, Signature=abc123",
        )
        .unwrap();
        assert_eq!(parsed.access_key_id, "AKID");
        assert_eq!(parsed.date_stamp, "20260222");
        assert_eq!(parsed.region, "nyc3");
        assert_eq!(parsed.service, "s3");
        assert_eq!(parsed.signed_headers, "host;x-amz-date");
        assert_eq!(parsed.signature, "abc123");
        assert_eq!(parsed.credential_scope, "20260222/nyc3/s3/aws4_request");

        assert!(parse_authorization_header("Basic dXNlcjpwYXNz").is_err());
        assert!(parse_authorization_header("AWS4-HMAC-SHA256 Credential=AKID/x").is_err());
    }

    #[test]
    fn test_rendered_documents_parse() {
        let doc = parse_error_document(&render_error("NoSuchKey", "gone <here>", "/a", "id")).unwrap();
        assert_eq!(doc.code, "NoSuchKey");
        assert_eq!(doc.message.as_deref(), Some("gone <here>"));

        let entries = [ListedObject {
            key: "a&b.txt".to_string(),
            last_modified: "2026-02-22T12:00:00+00:00".to_string(),
            etag: "\"abc\"".to_string(),
            size: 3,
        }];
        let page = parse_list_objects(&render_list_objects_result(
            "",
            1,
            true,
            &entries,
            None,
            Some("a&b.txt"),
        ))
        .unwrap();
        assert!(page.is_truncated);
        assert_eq!(page.contents[0].key, "a&b.txt");
        assert_eq!(page.next_continuation_token.as_deref(), Some("a&b.txt"));
    }
}

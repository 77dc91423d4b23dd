//! AWS Signature Version 4 request signing.
//!
//! The core algorithm follows the AWS SigV4 specification:
//! 1. Build a canonical request
//! 2. Build a string-to-sign
//! 3. Derive a signing key via HMAC chain
//! 4. Compute the signature and attach it to the request
//!
//! Signing is a pure function of its inputs: the same method, path, headers,
//! timestamp and credentials always produce byte-identical headers, so a
//! request that is retried carries the same signature.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use sha2::{Digest, Sha256};

use crate::config::Credentials;
use crate::errors::{ClientError, Result};

type HmacSha256 = Hmac<Sha256>;

/// The only algorithm this signer speaks.
pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Payload hash placeholder for bodies that are streamed unsigned.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// SHA-256 of the empty string.
pub const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Maximum presigned URL expiration (7 days).
pub const MAX_PRESIGNED_EXPIRES: u64 = 604800;

/// Service name in the credential scope.
const SERVICE: &str = "s3";

const X_AMZ_DATE: HeaderName = HeaderName::from_static("x-amz-date");
const X_AMZ_CONTENT_SHA256: HeaderName = HeaderName::from_static("x-amz-content-sha256");

// ── Request description ─────────────────────────────────────────────

/// Everything the signer needs to know about an outgoing request.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    /// HTTP method, uppercase.
    pub method: &'a str,
    /// URI-encoded request path, exactly as it goes on the wire.
    pub canonical_path: &'a str,
    /// Raw query string without the leading `?`.
    pub query: &'a str,
    /// Headers to sign.  Must include `host`.
    pub headers: &'a HeaderMap,
    /// Hex SHA-256 of the body, or [`UNSIGNED_PAYLOAD`].
    pub payload_hash: &'a str,
}

/// SigV4 signer bound to a region.
#[derive(Debug, Clone)]
pub struct Signer {
    region: String,
}

impl Signer {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Sign `request`, returning its headers plus `x-amz-date`,
    /// `x-amz-content-sha256` and `authorization`.
    ///
    /// Every header in `request.headers` is signed.
    pub fn sign(
        &self,
        request: &SignableRequest<'_>,
        timestamp: DateTime<Utc>,
        credentials: &Credentials,
    ) -> Result<HeaderMap> {
        ensure_credentials(credentials)?;

        let amz_date = format_amz_date(timestamp);
        let date_stamp = format_date_stamp(timestamp);

        let mut signed = request.headers.clone();
        signed.remove(AUTHORIZATION);
        signed.insert(X_AMZ_DATE, header_value(&amz_date)?);
        signed.insert(X_AMZ_CONTENT_SHA256, header_value(request.payload_hash)?);

        let headers = canonical_header_pairs(&signed);
        let signed_headers_str = headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = build_canonical_request(
            request.method,
            request.canonical_path,
            request.query,
            &headers,
            &signed_headers_str,
            request.payload_hash,
        );

        let credential_scope = self.credential_scope(&date_stamp);
        let string_to_sign = build_string_to_sign(&amz_date, &credential_scope, &canonical_request);
        let signing_key =
            derive_signing_key(&credentials.secret_key, &date_stamp, &self.region, SERVICE);
        let signature = compute_signature(&signing_key, &string_to_sign);

        let authorization = format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers_str}, Signature={signature}",
            credentials.access_key_id
        );
        signed.insert(AUTHORIZATION, header_value(&authorization)?);

        Ok(signed)
    }

    /// Build a presigned query string for `method canonical_path` on `host`.
    ///
    /// The result already includes `X-Amz-Signature` and can be appended to
    /// the object URL after a `?`.  Only the `host` header is signed and the
    /// payload is always `UNSIGNED-PAYLOAD`.
    pub fn presign(
        &self,
        method: &str,
        canonical_path: &str,
        host: &str,
        timestamp: DateTime<Utc>,
        expires_secs: u64,
        credentials: &Credentials,
    ) -> Result<String> {
        ensure_credentials(credentials)?;
        if expires_secs == 0 || expires_secs > MAX_PRESIGNED_EXPIRES {
            return Err(ClientError::Config(format!(
                "presigned URL expiry must be between 1 and {MAX_PRESIGNED_EXPIRES} seconds"
            )));
        }

        let amz_date = format_amz_date(timestamp);
        let date_stamp = format_date_stamp(timestamp);
        let credential_scope = self.credential_scope(&date_stamp);
        let credential = format!("{}/{credential_scope}", credentials.access_key_id);
        let expires = expires_secs.to_string();

        let params = [
            ("X-Amz-Algorithm", ALGORITHM),
            ("X-Amz-Credential", credential.as_str()),
            ("X-Amz-Date", amz_date.as_str()),
            ("X-Amz-Expires", expires.as_str()),
            ("X-Amz-SignedHeaders", "host"),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", s3_uri_encode(k, true), s3_uri_encode(v, true)))
            .collect::<Vec<_>>()
            .join("&");

        let headers = vec![("host".to_string(), host.to_string())];
        let canonical_request = build_canonical_request(
            method,
            canonical_path,
            &query,
            &headers,
            "host",
            UNSIGNED_PAYLOAD,
        );
        let string_to_sign = build_string_to_sign(&amz_date, &credential_scope, &canonical_request);
        let signing_key =
            derive_signing_key(&credentials.secret_key, &date_stamp, &self.region, SERVICE);
        let signature = compute_signature(&signing_key, &string_to_sign);

        Ok(format!("{query}&X-Amz-Signature={signature}"))
    }

    fn credential_scope(&self, date_stamp: &str) -> String {
        format!("{date_stamp}/{}/{SERVICE}/aws4_request", self.region)
    }
}

fn ensure_credentials(credentials: &Credentials) -> Result<()> {
    if credentials.access_key_id.trim().is_empty() || credentials.secret_key.is_empty() {
        return Err(ClientError::Config(
            "access key and secret key must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::Config(format!("value cannot be sent as a header: {value:?}")))
}

fn format_amz_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date_stamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%d").to_string()
}

// ── Canonical request construction ──────────────────────────────────

/// Build the canonical request string.
///
/// ```text
/// HTTPMethod + '\n' +
/// CanonicalURI + '\n' +
/// CanonicalQueryString + '\n' +
/// CanonicalHeaders + '\n' +
/// SignedHeaders + '\n' +
/// HashedPayload
/// ```
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    headers: &[(String, String)],
    signed_headers_str: &str,
    payload_hash: &str,
) -> String {
    // S3 signs the already-encoded path as-is: no double encoding and no
    // dot-segment normalization.
    let canonical_uri = if uri.is_empty() { "/" } else { uri };

    let canonical_query = build_canonical_query_string(query_string);

    let mut canonical_headers = String::new();
    for name in signed_headers_str.split(';') {
        if let Some((hname, hval)) = headers.iter().find(|(hname, _)| hname == name) {
            canonical_headers.push_str(hname);
            canonical_headers.push(':');
            canonical_headers.push_str(&collapse_whitespace(hval));
            canonical_headers.push('\n');
        }
    }

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Build the canonical query string from a raw query string.
///
/// Parameters are decoded, re-encoded with S3 rules and sorted by name then
/// value.  `X-Amz-Signature` is excluded.  A parameter without a value is
/// rendered with an empty one: `acl=`.
pub fn build_canonical_query_string(query_string: &str) -> String {
    if query_string.is_empty() {
        return String::new();
    }

    let mut params: Vec<(String, String)> = Vec::new();
    for part in query_string.split('&') {
        if part.is_empty() {
            continue;
        }
        let (k, v) = part.split_once('=').unwrap_or((part, ""));
        if k == "X-Amz-Signature" {
            continue;
        }
        params.push((
            s3_uri_encode(&percent_decode(k), true),
            s3_uri_encode(&percent_decode(v), true),
        ));
    }

    params.sort();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Collect headers as sorted `(lowercase-name, value)` pairs.
///
/// Repeated headers are joined with a comma as SigV4 requires.
pub fn canonical_header_pairs(header_map: &HeaderMap) -> Vec<(String, String)> {
    let mut header_values: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in header_map.iter() {
        header_values
            .entry(name.as_str().to_ascii_lowercase())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }

    header_values
        .into_iter()
        .map(|(name, values)| (name, values.join(",")))
        .collect()
}

// ── String to sign ──────────────────────────────────────────────────

/// Build the string to sign.
///
/// ```text
/// AWS4-HMAC-SHA256 + '\n' +
/// Timestamp + '\n' +
/// CredentialScope + '\n' +
/// HexEncode(SHA256(CanonicalRequest))
/// ```
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request: &str,
) -> String {
    let hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    format!("{ALGORITHM}\n{timestamp}\n{credential_scope}\n{hash}")
}

// ── Signing key derivation ──────────────────────────────────────────

/// Derive the signing key for a given date, region, and service.
///
/// ```text
/// kDate    = HMAC-SHA256("AWS4" + secret, dateStamp)
/// kRegion  = HMAC-SHA256(kDate, region)
/// kService = HMAC-SHA256(kRegion, "s3")
/// kSigning = HMAC-SHA256(kService, "aws4_request")
/// ```
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Vec<u8> {
    let k_secret = format!("AWS4{secret_key}");
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Compute the signature: HexEncode(HMAC-SHA256(SigningKey, StringToSign)).
pub fn compute_signature(signing_key: &[u8], string_to_sign: &str) -> String {
    hex::encode(hmac_sha256(signing_key, string_to_sign.as_bytes()))
}

/// Hex SHA-256 of a payload, for `x-amz-content-sha256`.
pub fn payload_sha256(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

// ── URI encoding ────────────────────────────────────────────────────

/// S3-compatible URI encoding (RFC 3986 with S3 exceptions).
///
/// - Characters A-Z, a-z, 0-9, -, _, ., ~ are NOT encoded.
/// - All other characters are percent-encoded with uppercase hex.
/// - If `encode_slash` is false, `/` is NOT encoded (for URI paths).
pub fn s3_uri_encode(input: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len() * 2);
    let mut buf = [0u8; 4];
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '~') {
            encoded.push(ch);
        } else if ch == '/' && !encode_slash {
            encoded.push('/');
        } else {
            for byte in ch.encode_utf8(&mut buf).as_bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}

/// Collapse consecutive whitespace in a header value to a single space,
/// and trim leading/trailing whitespace.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8_lossy()
        .into_owned()
}

// ── Tests ───────────────────────────────────────────────────────────

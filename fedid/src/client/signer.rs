//! AWS Signature Version 4 for body-less requests.
//!
//! ```text
//! canonical request = METHOD \n URI \n QUERY \n HEADERS \n SIGNED_HEADERS \n sha256("")
//! string to sign    = AWS4-HMAC-SHA256 \n AMZ_DATE \n SCOPE \n sha256(canonical request)
//! signing key       = HMAC chain "AWS4"+secret -> date -> region -> service -> "aws4_request"
//! ```

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use hyper::Uri;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use crate::common::{Credentials, FederationError, FederationResult};

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

const AMZ_DATE_HEADER: &str = "x-amz-date";
const SECURITY_TOKEN_HEADER: &str = "x-amz-security-token";

// RFC 3986 unreserved characters stay as they are
const AWS_QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HmacSha256 = Hmac<Sha256>;

/// A request about to be signed. Header names are lowercase.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl SignableRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing any previous value
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value.into());
        self
    }

    fn set_header(&mut self, name: &str, value: String) {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value));
    }
}

/// Signing scope and time
#[derive(Debug, Clone)]
pub struct SigningParams<'a> {
    pub credentials: &'a Credentials,
    pub region: &'a str,
    pub service: &'a str,
    pub time: DateTime<Utc>,
}

/// A signed request. Headers, `authorization` included, are sorted by name.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub signature: String,
}

/// Sign `request`, adding `x-amz-date`, `x-amz-security-token` (for temporary
/// credentials) and `authorization`.
pub fn sign(mut request: SignableRequest, params: &SigningParams<'_>) -> FederationResult<SignedRequest> {
    let amz_date = params.time.format(AMZ_DATE_FORMAT).to_string();
    let date_stamp = &amz_date[..8];

    request.set_header(AMZ_DATE_HEADER, amz_date.clone());
    if let Some(token) = &params.credentials.session_token {
        request.set_header(SECURITY_TOKEN_HEADER, token.clone());
    }

    let uri: Uri = request
        .url
        .parse()
        .map_err(|e| FederationError::signing(format!("invalid URL {}: {}", request.url, e)))?;

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), trim_header_value(value)))
        .collect();
    headers.sort();

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method.to_ascii_uppercase(),
        canonical_uri(uri.path()),
        canonical_query(uri.query().unwrap_or("")),
        canonical_headers,
        signed_headers,
        hex_sha256(b"") // no body
    );

    // String to sign
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, params.region, params.service
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    // Derive signing key
    let k_date = hmac_sha256(
        format!("AWS4{}", params.credentials.secret_access_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, params.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, params.service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;

    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        ALGORITHM, params.credentials.access_key_id, scope, signed_headers, signature
    );

    let mut signed_headers_list = request.headers;
    signed_headers_list.push(("authorization".to_string(), authorization));
    signed_headers_list.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(SignedRequest {
        method: request.method,
        url: request.url,
        headers: signed_headers_list,
        signature,
    })
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> FederationResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| FederationError::signing(format!("invalid HMAC key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, AWS_QUERY_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Encode keys and values, then sort by encoded key and encoded value
fn canonical_query(query: &str) -> String {
    let enc = |s: &str| {
        let decoded = percent_decode_str(s).decode_utf8_lossy();
        utf8_percent_encode(&decoded, AWS_QUERY_ENCODE_SET).to_string()
    };

    let mut encoded: Vec<(String, String)> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (enc(k), enc(v))
        })
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Trim the value and collapse inner runs of whitespace
fn trim_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

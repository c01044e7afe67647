use async_trait::async_trait;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Method, Request, StatusCode, Uri};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::common::config::{StsEndpoint, VerificationMode};
use crate::common::http::{send_with_timeout, HttpClient};
use crate::common::{FederationError, FederationResult, Identity, SubjectToken, TokenRequest};

const RESULT_ELEMENT: &str = "GetCallerIdentityResult";
const ARN_ELEMENT: &str = "Arn";

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const REQUESTED_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const SUBJECT_TOKEN_TYPE: &str = "urn:ietf:params:aws:token-type:aws4_request";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Reduces a subject token to a verified identity
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &SubjectToken) -> FederationResult<Identity>;

    fn mode(&self) -> VerificationMode;
}

/// Replays the signed request against AWS STS and reads the caller ARN
pub struct AwsDirectVerifier {
    http_client: HttpClient,
    trusted_endpoints: Vec<StsEndpoint>,
    timeout: Duration,
}

impl AwsDirectVerifier {
    pub fn new(
        http_client: HttpClient,
        trusted_endpoints: Vec<StsEndpoint>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            trusted_endpoints,
            timeout,
        }
    }

    /// Verify `token` with AWS and return the caller ARN
    #[instrument(skip(self, token))]
    pub async fn verify_aws_token(&self, token: &SubjectToken) -> FederationResult<String> {
        let signed = token.decode()?;
        let request = self.build_replay_request(&signed)?;

        debug!("Replaying {} {}", signed.method, signed.url);
        let response = send_with_timeout(&self.http_client, request, self.timeout).await?;

        if response.status != StatusCode::OK {
            warn!("STS call returned non-success status: {}", response.status);
            return Err(FederationError::upstream_rejected(
                response.status.as_u16(),
                response.body,
            ));
        }

        let arn = extract_caller_arn(&response.body)?;
        info!("AWS token verified for ARN: {}", arn);
        Ok(arn)
    }

    /// Rebuild the exact signed request. Nothing is added or recomputed,
    /// so any tampering shows up as a signature failure at STS.
    fn build_replay_request(&self, signed: &TokenRequest) -> FederationResult<Request<Body>> {
        let uri: Uri = signed
            .url
            .parse()
            .map_err(|e| FederationError::malformed_token(format!("invalid url: {}", e)))?;

        if !self.is_trusted_target(&uri) {
            return Err(FederationError::malformed_token(format!(
                "token targets {} which is not an AWS STS endpoint",
                uri.authority().map(|a| a.as_str()).unwrap_or("<none>")
            )));
        }

        let method = Method::from_bytes(signed.method.as_bytes())
            .map_err(|e| FederationError::malformed_token(format!("invalid method: {}", e)))?;

        let mut builder = Request::builder().method(method).uri(uri);
        for header in &signed.headers {
            builder = builder.header(header.key.as_str(), header.value.as_str());
        }

        builder
            .body(Body::empty())
            .map_err(|e| FederationError::malformed_token(format!("invalid header: {}", e)))
    }

    fn is_trusted_target(&self, uri: &Uri) -> bool {
        let Some(authority) = uri.authority() else {
            return false;
        };
        let authority = authority.as_str().to_ascii_lowercase();

        if self
            .trusted_endpoints
            .iter()
            .any(|e| uri.scheme_str() == Some(e.scheme()) && authority == e.host())
        {
            return true;
        }

        uri.scheme_str() == Some("https") && is_aws_sts_host(&authority)
    }
}

#[async_trait]
impl TokenVerifier for AwsDirectVerifier {
    async fn verify(&self, token: &SubjectToken) -> FederationResult<Identity> {
        self.verify_aws_token(token).await.map(Identity::Principal)
    }

    fn mode(&self) -> VerificationMode {
        VerificationMode::Aws
    }
}

/// `sts.amazonaws.com` or a regional `sts.<region>.amazonaws.com[.cn]`, optionally on port 443
fn is_aws_sts_host(authority: &str) -> bool {
    let host = authority.strip_suffix(":443").unwrap_or(authority);
    if host == "sts.amazonaws.com" {
        return true;
    }

    let Some(rest) = host.strip_prefix("sts.") else {
        return false;
    };
    let region = rest
        .strip_suffix(".amazonaws.com")
        .or_else(|| rest.strip_suffix(".amazonaws.com.cn"));

    match region {
        Some(region) => {
            !region.is_empty()
                && region
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        }
        None => false,
    }
}

/// Read `GetCallerIdentityResult/Arn` from an STS XML response
fn extract_caller_arn(xml: &str) -> FederationResult<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut saw_result = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            FederationError::unexpected_response_shape(format!("STS response is not XML: {}", e))
        })?;

        match event {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let in_result = path.last().map(String::as_str) == Some(RESULT_ELEMENT);
                if name == RESULT_ELEMENT {
                    saw_result = true;
                }
                if name == ARN_ELEMENT && in_result {
                    let arn = read_text_content(&mut reader)?;
                    if arn.is_empty() {
                        return Err(FederationError::unexpected_response_shape(
                            "Arn under GetCallerIdentityResult is empty",
                        ));
                    }
                    return Ok(arn);
                }
                path.push(name);
            }
            Event::End(_) => {
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if saw_result {
        Err(FederationError::unexpected_response_shape(
            "Arn not found under GetCallerIdentityResult in AWS STS response",
        ))
    } else {
        Err(FederationError::unexpected_response_shape(
            "GetCallerIdentityResult not found in AWS STS response",
        ))
    }
}

/// Text of the element just opened, consuming its end tag
fn read_text_content(reader: &mut Reader<&[u8]>) -> FederationResult<String> {
    let shape_error =
        |e: String| FederationError::unexpected_response_shape(format!("invalid Arn text: {}", e));

    let mut text = String::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| shape_error(e.to_string()))?;
        match event {
            Event::Text(e) => {
                let decoded = e.decode().map_err(|err| shape_error(err.to_string()))?;
                text.push_str(&decoded);
            }
            // Entity and character references arrive as their own events
            Event::GeneralRef(e) => {
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| shape_error(err.to_string()))?
                {
                    text.push(ch);
                    continue;
                }
                let name = e.decode().map_err(|err| shape_error(err.to_string()))?;
                let resolved = quick_xml::escape::resolve_predefined_entity(&name)
                    .ok_or_else(|| shape_error(format!("unknown entity &{};", name)))?;
                text.push_str(resolved);
            }
            Event::End(_) => return Ok(text.trim().to_string()),
            Event::Eof => return Err(shape_error("unexpected end of document".to_string())),
            _ => {}
        }
    }
}

/// Relays the token to GCP STS, which replays it on AWS and checks the
/// Workload Identity Pool provider's audience, attribute mapping and condition
pub struct GcpDelegatedVerifier {
    http_client: HttpClient,
    sts_url: String,
    audience: String,
    timeout: Duration,
}

impl GcpDelegatedVerifier {
    pub fn new(
        http_client: HttpClient,
        sts_url: impl Into<String>,
        audience: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            sts_url: sts_url.into(),
            audience: audience.into(),
            timeout,
        }
    }

    /// Exchange `token` for `gcp_audience`. Success is binary; no ARN is recovered.
    #[instrument(skip(self, token))]
    pub async fn verify_via_gcp(
        &self,
        token: &SubjectToken,
        gcp_audience: &str,
    ) -> FederationResult<()> {
        // The token goes out still percent-encoded, as GCP expects
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("audience", gcp_audience)
            .append_pair("grant_type", GRANT_TYPE)
            .append_pair("requested_token_type", REQUESTED_TOKEN_TYPE)
            .append_pair("scope", CLOUD_PLATFORM_SCOPE)
            .append_pair("subject_token_type", SUBJECT_TOKEN_TYPE)
            .append_pair("subject_token", token.as_str())
            .finish();

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.sts_url.as_str())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(form))
            .map_err(|e| {
                FederationError::upstream_unreachable(format!(
                    "invalid GCP STS url {}: {}",
                    self.sts_url, e
                ))
            })?;

        let response = send_with_timeout(&self.http_client, request, self.timeout).await?;

        if response.status != StatusCode::OK {
            warn!("GCP STS returned non-success status: {}", response.status);
            return Err(FederationError::upstream_rejected(
                response.status.as_u16(),
                response.body,
            ));
        }

        info!("GCP STS accepted token for audience {}", gcp_audience);
        Ok(())
    }
}

#[async_trait]
impl TokenVerifier for GcpDelegatedVerifier {
    async fn verify(&self, token: &SubjectToken) -> FederationResult<Identity> {
        self.verify_via_gcp(token, &self.audience)
            .await
            .map(|()| Identity::GcpAccepted)
    }

    fn mode(&self) -> VerificationMode {
        VerificationMode::Gcp
    }
}

//! Local stand-ins for AWS STS and GCP STS, served by hyper on 127.0.0.1

use chrono::{NaiveDateTime, TimeZone, Utc};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server, StatusCode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::client::signer::{sign, SignableRequest, SigningParams, AMZ_DATE_FORMAT};
use crate::common::{Credentials, SubjectToken};

/// A running mock server, shut down on drop
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Serve `handler` on an ephemeral local port. Must run inside a tokio runtime.
pub fn spawn_mock<F, Fut>(handler: F) -> MockServer
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    let handler = Arc::new(handler);
    let requests = Arc::new(AtomicUsize::new(0));
    let counter = requests.clone();

    let make_svc = make_service_fn(move |_conn| {
        let handler = handler.clone();
        let counter = counter.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                counter.fetch_add(1, Ordering::SeqCst);
                let response = (handler.as_ref())(req);
                async move { Ok::<_, Infallible>(response.await) }
            }))
        }
    });

    let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
    let addr = server.local_addr();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.with_graceful_shutdown(async {
        let _ = rx.await;
    }));

    MockServer {
        addr,
        requests,
        shutdown: Some(tx),
    }
}

/// A local address with nothing listening on it
pub fn unused_local_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// Credentials the mock STS knows the secret of
pub fn mock_credentials() -> Credentials {
    Credentials::new(
        "AKIDMOCKSTS",
        "mock/secret+access/key",
        Some("mock-session-token+/=".to_string()),
    )
}

pub enum MockStsBehavior {
    /// Check the signature and expiry like STS does, answer with this ARN
    Identity(String),
    /// Answer every request with this status and body
    Respond(u16, String),
}

pub fn spawn_mock_sts(behavior: MockStsBehavior) -> MockServer {
    let behavior = Arc::new(behavior);
    spawn_mock(move |req| {
        let behavior = behavior.clone();
        async move {
            match behavior.as_ref() {
                MockStsBehavior::Respond(status, body) => text_response(*status, body.clone()),
                MockStsBehavior::Identity(arn) => match check_signature(&req) {
                    Ok(()) => text_response(200, identity_body(arn)),
                    Err(code) => text_response(
                        403,
                        format!(
                            "<ErrorResponse><Error><Type>Sender</Type><Code>{}</Code></Error></ErrorResponse>",
                            code
                        ),
                    ),
                },
            }
        }
    })
}

/// Mock GCP STS accepting only tokens bound to `pool_audience`
pub fn spawn_mock_gcp_sts(pool_audience: &str) -> MockServer {
    let expected = Arc::new(pool_audience.to_string());
    spawn_mock(move |req| {
        let expected = expected.clone();
        async move {
            let body = hyper::body::to_bytes(req.into_body())
                .await
                .unwrap_or_default();
            let form: HashMap<String, String> = form_urlencoded::parse(&body).into_owned().collect();

            match check_exchange(&form, &expected) {
                Ok(()) => text_response(
                    200,
                    r#"{"access_token":"ya29.mock","issued_token_type":"urn:ietf:params:oauth:token-type:access_token","token_type":"Bearer","expires_in":3600}"#.to_string(),
                ),
                Err(description) => text_response(
                    400,
                    format!(
                        r#"{{"error":"invalid_grant","error_description":"{}"}}"#,
                        description
                    ),
                ),
            }
        }
    })
}

fn text_response(status: u16, body: String) -> Response<Body> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap())
        .body(Body::from(body))
        .unwrap()
}

fn identity_body(arn: &str) -> String {
    format!(
        "<GetCallerIdentityResponse xmlns=\"https://sts.amazonaws.com/doc/2011-06-15/\"><GetCallerIdentityResult><Arn>{}</Arn><UserId>AROAMOCK:session</UserId><Account>123456789012</Account></GetCallerIdentityResult><ResponseMetadata><RequestId>mock</RequestId></ResponseMetadata></GetCallerIdentityResponse>",
        arn
    )
}

fn header<'a>(req: &'a Request<Body>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Re-derive the signature from the received request
fn check_signature(req: &Request<Body>) -> Result<(), &'static str> {
    let authorization = header(req, "authorization").ok_or("MissingAuthenticationToken")?;
    let signed_headers = authorization
        .split(", ")
        .find_map(|part| part.strip_prefix("SignedHeaders="))
        .ok_or("IncompleteSignature")?;
    let region = authorization
        .split(", ")
        .find_map(|part| part.strip_prefix("AWS4-HMAC-SHA256 Credential="))
        .and_then(|credential| credential.split('/').nth(2))
        .ok_or("IncompleteSignature")?;

    let amz_date = header(req, "x-amz-date").ok_or("IncompleteSignature")?;
    let time = NaiveDateTime::parse_from_str(amz_date, AMZ_DATE_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| "IncompleteSignature")?;
    if (Utc::now() - time).num_minutes().abs() > 15 {
        return Err("SignatureDoesNotMatch");
    }

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let mut request = SignableRequest::new(req.method().as_str(), format!("http://sts.mock{}", path_and_query));
    for name in signed_headers.split(';') {
        let value = header(req, name).ok_or("IncompleteSignature")?;
        request = request.header(name, value);
    }

    let credentials = mock_credentials();
    let expected = sign(
        request,
        &SigningParams {
            credentials: &credentials,
            region,
            service: "sts",
            time,
        },
    )
    .map_err(|_| "InternalFailure")?;

    let matches = expected
        .headers
        .iter()
        .any(|(name, value)| name == "authorization" && value == authorization);
    if matches {
        Ok(())
    } else {
        Err("SignatureDoesNotMatch")
    }
}

fn check_exchange(form: &HashMap<String, String>, expected: &str) -> Result<(), String> {
    let field = |name: &str| form.get(name).map(String::as_str).unwrap_or("");

    if field("grant_type") != "urn:ietf:params:oauth:grant-type:token-exchange"
        || field("requested_token_type") != "urn:ietf:params:oauth:token-type:access_token"
        || field("subject_token_type") != "urn:ietf:params:aws:token-type:aws4_request"
        || field("scope") != "https://www.googleapis.com/auth/cloud-platform"
    {
        return Err("unsupported token exchange parameters".to_string());
    }
    if field("audience") != expected {
        return Err(format!("unknown audience {}", field("audience")));
    }

    let request = SubjectToken::from_raw(field("subject_token"))
        .decode()
        .map_err(|e| e.to_string())?;
    let target = request.header("x-goog-cloud-target-resource").unwrap_or("");
    let expected_target = expected.strip_prefix("https://").unwrap_or(expected);
    if target != expected_target {
        return Err(format!(
            "The audience in the subject token {} does not match the expected audience",
            target
        ));
    }

    Ok(())
}

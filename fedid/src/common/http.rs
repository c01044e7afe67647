use hyper::client::HttpConnector;
use hyper::{Body, Client, Request, StatusCode};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use tracing::debug;

use super::error::{FederationError, FederationResult};

/// Shared outbound client. Cloning is cheap and shares the connection pool.
pub type HttpClient = Client<HttpsConnector<HttpConnector>>;

/// Upper bound on a single upstream STS exchange
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_http_client() -> HttpClient {
    let https = HttpsConnector::new();
    Client::builder().build::<_, Body>(https)
}

/// Status and body of an upstream response
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Send one request and read its whole body, bounded by `timeout`.
/// Transport failures and timeouts both surface as `UpstreamUnreachable`.
pub async fn send_with_timeout(
    client: &HttpClient,
    request: Request<Body>,
    timeout: Duration,
) -> FederationResult<UpstreamResponse> {
    let target = request.uri().to_string();

    let exchange = async {
        let response = client.request(request).await?;
        let status = response.status();
        // Keep duplicates such as multiple Set-Cookie
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = hyper::body::to_bytes(response.into_body()).await?;
        Ok::<_, hyper::Error>((status, headers, body))
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(Ok((status, headers, body))) => {
            debug!("Upstream {} answered {}", target, status);
            Ok(UpstreamResponse {
                status,
                headers,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
        Ok(Err(e)) => Err(FederationError::upstream_unreachable(format!(
            "request to {} failed: {}",
            target, e
        ))),
        Err(_) => Err(FederationError::upstream_unreachable(format!(
            "no response from {} within {}s",
            target,
            timeout.as_secs()
        ))),
    }
}

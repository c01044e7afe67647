use hyper::{Body, Method, Request, Response, StatusCode};
use std::convert::Infallible;
use tracing::{info, instrument};
use uuid::Uuid;

use super::respond;
use crate::common::{Identity, VerificationResult};
use crate::server::FederationService;

impl FederationService {
    #[instrument(skip(self, req), fields(request_id = %Uuid::new_v4()))]
    pub async fn handle_request(&self, req: Request<Body>) -> Result<Response<Body>, Infallible> {
        if req.method() == Method::GET && req.uri().path() == "/health" {
            return Ok(self.health_response());
        }

        info!("Received {} {}", req.method(), req.uri().path());

        let result = self.authenticate(req.headers()).await;
        let (status, message) = render_message(&result);

        Ok(respond(
            status,
            "text/html; charset=utf-8",
            render_page(&message),
        ))
    }
}

/// Status and page text for a verification result. Failure details stay in the logs.
fn render_message(result: &VerificationResult) -> (StatusCode, String) {
    match result {
        VerificationResult::NoToken => (
            StatusCode::OK,
            "There was no authentication token".to_string(),
        ),
        VerificationResult::ValidForAudience(Identity::GcpAccepted) => (
            StatusCode::OK,
            "The request contained a valid AWS authentication token according to google"
                .to_string(),
        ),
        VerificationResult::ValidForAudience(Identity::Principal(arn)) => (
            StatusCode::OK,
            format!(
                "The request contained a valid AWS authentication token for role ARN: {}",
                html_escape(arn)
            ),
        ),
        VerificationResult::RejectedInvalid(_) => (
            StatusCode::UNAUTHORIZED,
            "The authentication token could not be verified".to_string(),
        ),
    }
}

fn render_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>AWS Token Auth Server</title>
</head>
<body>
    <h1>AWS Token Auth Server</h1>
    <p>{}</p>
</body>
</html>
"#,
        message
    )
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

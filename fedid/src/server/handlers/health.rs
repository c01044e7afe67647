use hyper::{Body, Response, StatusCode};
use serde_json::json;

use super::respond;
use crate::server::FederationService;

impl FederationService {
    pub fn health_response(&self) -> Response<Body> {
        let started_at = self
            .started_at
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_else(|_| std::time::Duration::from_secs(0))
            .as_secs();

        let health_info = json!({
            "status": "healthy",
            "mode": self.verifier.mode().to_string(),
            "instance_id": self.instance_id.to_string(),
            "started_at": started_at,
        });

        respond(StatusCode::OK, "application/json", health_info.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::common::config::VerificationMode;
    use crate::common::Identity;
    use crate::server::test_support::{service_with, StubOutcome};

    #[tokio::test]
    async fn test_health_reports_mode() {
        let service = service_with(VerificationMode::Gcp, StubOutcome::Accept(Identity::GcpAccepted));
        let response = service.health_response();

        assert_eq!(response.status(), hyper::StatusCode::OK);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["mode"], "gcp");
    }
}

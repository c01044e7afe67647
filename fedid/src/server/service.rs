use hyper::HeaderMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use super::auth::{AwsDirectVerifier, GcpDelegatedVerifier, TokenVerifier};
use super::classifier::extract_token;
use crate::common::config::{VerifierConfig, VerifierMode};
use crate::common::http::HttpClient;
use crate::common::VerificationResult;

#[derive(Clone)]
pub struct FederationService {
    pub instance_id: Uuid,
    pub started_at: SystemTime,

    // Verifier for the configured mode
    pub verifier: Arc<dyn TokenVerifier>,
}

impl FederationService {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            started_at: SystemTime::now(),
            verifier,
        }
    }

    /// Build the verifier for `config` around the shared client
    pub fn from_config(config: &VerifierConfig, http_client: HttpClient) -> Self {
        let verifier: Arc<dyn TokenVerifier> = match &config.mode {
            VerifierMode::AwsDirect { trusted_endpoints } => Arc::new(AwsDirectVerifier::new(
                http_client,
                trusted_endpoints.clone(),
                config.upstream_timeout,
            )),
            VerifierMode::GcpDelegated { audience, sts_url } => {
                Arc::new(GcpDelegatedVerifier::new(
                    http_client,
                    sts_url.clone(),
                    audience.clone(),
                    config.upstream_timeout,
                ))
            }
        };
        Self::new(verifier)
    }

    /// Classify the `Authorization` header and verify any token it carries
    #[instrument(skip(self, headers))]
    pub async fn authenticate(&self, headers: &HeaderMap) -> VerificationResult {
        let Some(token) = extract_token(headers) else {
            debug!("No aws-fed-id token presented");
            return VerificationResult::NoToken;
        };

        match self.verifier.verify(&token).await {
            Ok(identity) => VerificationResult::ValidForAudience(identity),
            Err(e) => {
                if e.is_transient() {
                    error!("Token verification could not reach upstream: {}", e);
                } else {
                    warn!("Token verification failed: {}", e);
                }
                VerificationResult::RejectedInvalid(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::VerificationMode;
    use crate::common::{FederationError, Identity};
    use crate::server::test_support::{service_with, StubOutcome};
    use hyper::header::{HeaderValue, AUTHORIZATION};

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_absent_token_is_not_a_rejection() {
        let service = service_with(VerificationMode::Aws, StubOutcome::Reject(403, "denied"));

        let result = service.authenticate(&HeaderMap::new()).await;
        assert!(matches!(result, VerificationResult::NoToken));

        let result = service.authenticate(&headers("Basic dXNlcjpwYXNz")).await;
        assert!(matches!(result, VerificationResult::NoToken));
    }

    #[tokio::test]
    async fn test_rejected_token_is_not_no_token() {
        let service = service_with(VerificationMode::Aws, StubOutcome::Reject(403, "denied"));

        let result = service.authenticate(&headers("aws-fed-id abc")).await;
        assert!(result.is_rejected());
        assert!(matches!(
            result,
            VerificationResult::RejectedInvalid(FederationError::UpstreamRejected { status: 403, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_token_is_malformed_with_real_verifier() {
        let config = VerifierConfig {
            port: 0,
            mode: VerifierMode::AwsDirect {
                trusted_endpoints: Vec::new(),
            },
            upstream_timeout: std::time::Duration::from_secs(1),
        };
        let service =
            FederationService::from_config(&config, crate::common::http::build_http_client());

        let result = service.authenticate(&headers("aws-fed-id  ")).await;
        assert!(matches!(
            result,
            VerificationResult::RejectedInvalid(FederationError::MalformedToken { .. })
        ));
    }

    #[tokio::test]
    async fn test_accepted_token_carries_identity() {
        let arn = "arn:aws:iam::123456789012:user/alice";
        let service = service_with(
            VerificationMode::Aws,
            StubOutcome::Accept(Identity::Principal(arn.to_string())),
        );

        match service.authenticate(&headers("aws-fed-id abc")).await {
            VerificationResult::ValidForAudience(Identity::Principal(found)) => {
                assert_eq!(found, arn)
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}

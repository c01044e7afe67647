use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::aws::CredentialSource;
use super::signer::{sign, SignableRequest, SigningParams};
use crate::common::config::{Region, StsEndpoint};
use crate::common::{FederationError, FederationResult, SubjectToken, TokenHeader, TokenRequest};

/// Header binding a token to its audience
pub const TARGET_RESOURCE_HEADER: &str = "x-goog-cloud-target-resource";

const STS_SERVICE: &str = "sts";

/// Produces subject tokens: signed STS GetCallerIdentity requests
pub struct TokenGenerator {
    credentials: Arc<dyn CredentialSource>,
    sts_endpoint: Option<StsEndpoint>,
}

impl TokenGenerator {
    pub fn new(credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            credentials,
            sts_endpoint: None,
        }
    }

    /// Target this endpoint instead of the regional AWS STS host
    pub fn with_sts_endpoint(mut self, endpoint: Option<StsEndpoint>) -> Self {
        self.sts_endpoint = endpoint;
        self
    }

    #[instrument(skip(self))]
    pub async fn generate_subject_token(
        &self,
        audience: &str,
        region: &Region,
    ) -> FederationResult<SubjectToken> {
        self.generate_subject_token_at(audience, region, Utc::now())
            .await
    }

    /// Same as [`generate_subject_token`](Self::generate_subject_token) with a fixed signing time
    pub async fn generate_subject_token_at(
        &self,
        audience: &str,
        region: &Region,
        time: DateTime<Utc>,
    ) -> FederationResult<SubjectToken> {
        let target_resource = target_resource(audience)?;
        let credentials = self.credentials.resolve().await?;

        let endpoint = self
            .sts_endpoint
            .clone()
            .unwrap_or_else(|| StsEndpoint::for_region(region));

        let request = SignableRequest::new("POST", endpoint.get_caller_identity_url())
            .header("host", endpoint.host())
            .header(TARGET_RESOURCE_HEADER, target_resource);

        let signed = sign(
            request,
            &SigningParams {
                credentials: &credentials,
                region: region.as_str(),
                service: STS_SERVICE,
                time,
            },
        )?;

        let token = SubjectToken::encode(&TokenRequest {
            url: signed.url,
            method: signed.method,
            headers: signed
                .headers
                .into_iter()
                .map(|(key, value)| TokenHeader { key, value })
                .collect(),
        })?;

        debug!(
            "Generated {} byte subject token for {}",
            token.as_str().len(),
            endpoint.host()
        );
        Ok(token)
    }
}

/// Audience as carried in the target resource header, without a leading `https://`
fn target_resource(audience: &str) -> FederationResult<String> {
    let audience = audience.trim();
    let stripped = audience.strip_prefix("https://").unwrap_or(audience);
    if stripped.is_empty() {
        return Err(FederationError::invalid_audience("audience must not be empty"));
    }
    Ok(stripped.to_string())
}

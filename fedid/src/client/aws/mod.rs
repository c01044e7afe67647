use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use tracing::debug;

use crate::common::{Credentials, FederationError, FederationResult};

/// Source of the AWS credentials a token is signed with
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Resolve the current access key, secret key and optional session token
    async fn resolve(&self) -> FederationResult<Credentials>;
}

/// Credentials from the AWS default chain: environment, shared config and
/// credentials files, web identity, ECS and EC2 instance metadata
pub struct DefaultCredentialSource {
    provider: Option<SharedCredentialsProvider>,
}

impl DefaultCredentialSource {
    pub async fn load() -> Self {
        let cfg = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            provider: cfg.credentials_provider(),
        }
    }
}

#[async_trait]
impl CredentialSource for DefaultCredentialSource {
    async fn resolve(&self) -> FederationResult<Credentials> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            FederationError::credentials_unavailable("no AWS credentials provider available")
        })?;

        let creds = provider
            .provide_credentials()
            .await
            .map_err(|e| FederationError::credentials_unavailable(e.to_string()))?;

        debug!(
            "Resolved AWS credentials for access key {}",
            creds.access_key_id()
        );

        Ok(Credentials::new(
            creds.access_key_id(),
            creds.secret_access_key(),
            creds.session_token().map(|s| s.to_string()),
        ))
    }
}

/// Fixed credentials, for tests
#[cfg(test)]
pub struct StaticCredentialSource {
    credentials: Option<Credentials>,
}

#[cfg(test)]
impl StaticCredentialSource {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    pub fn unavailable() -> Self {
        Self { credentials: None }
    }
}

#[cfg(test)]
#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn resolve(&self) -> FederationResult<Credentials> {
        self.credentials.clone().ok_or_else(|| {
            FederationError::credentials_unavailable("static source has no credentials")
        })
    }
}

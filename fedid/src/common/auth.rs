use std::fmt;

use super::error::FederationError;

/// AWS credentials used to sign a subject token.
/// Resolved per token, never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .finish()
    }
}

/// Identity established by a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Caller ARN returned by AWS STS GetCallerIdentity
    Principal(String),

    /// GCP STS accepted the token for the configured Workload Identity Pool provider
    GcpAccepted,
}

/// Outcome of inspecting one inbound request
#[derive(Debug)]
pub enum VerificationResult {
    /// No `aws-fed-id` authorization was presented
    NoToken,

    /// A token was presented and the upstream confirmed it
    ValidForAudience(Identity),

    /// A token was presented but could not be verified
    RejectedInvalid(FederationError),
}

impl VerificationResult {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::RejectedInvalid(_))
    }
}

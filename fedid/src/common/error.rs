use thiserror::Error;

/// Errors raised while generating or verifying a subject token
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("AWS credentials unavailable: {message}")]
    CredentialsUnavailable { message: String },

    #[error("Invalid audience: {message}")]
    InvalidAudience { message: String },

    #[error("Failed to sign request: {message}")]
    Signing { message: String },

    #[error("Malformed token: {message}")]
    MalformedToken { message: String },

    #[error("Upstream unreachable: {message}")]
    UpstreamUnreachable { message: String },

    #[error("Upstream rejected the token with status {status}: {body}")]
    UpstreamRejected { status: u16, body: String },

    #[error("Unexpected upstream response: {message}")]
    UnexpectedResponseShape { message: String },
}

impl FederationError {
    pub fn credentials_unavailable(message: impl Into<String>) -> Self {
        Self::CredentialsUnavailable {
            message: message.into(),
        }
    }

    pub fn invalid_audience(message: impl Into<String>) -> Self {
        Self::InvalidAudience {
            message: message.into(),
        }
    }

    pub fn signing(message: impl Into<String>) -> Self {
        Self::Signing {
            message: message.into(),
        }
    }

    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken {
            message: message.into(),
        }
    }

    pub fn upstream_unreachable(message: impl Into<String>) -> Self {
        Self::UpstreamUnreachable {
            message: message.into(),
        }
    }

    pub fn upstream_rejected(status: u16, body: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            status,
            body: body.into(),
        }
    }

    pub fn unexpected_response_shape(message: impl Into<String>) -> Self {
        Self::UnexpectedResponseShape {
            message: message.into(),
        }
    }

    /// Network-level failure, as opposed to a definitive answer about the token.
    /// Only used to pick a log level; verification is never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamUnreachable { .. })
    }
}

pub type FederationResult<T> = Result<T, FederationError>;

/// Errors in command-line or environment configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting: {name}")]
    Missing { name: &'static str },

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },
}

impl ConfigError {
    pub fn missing(name: &'static str) -> Self {
        Self::Missing { name }
    }

    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            message: message.into(),
        }
    }
}

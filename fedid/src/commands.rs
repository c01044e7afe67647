use clap::Parser;

use crate::common::config::{VerificationMode, DEFAULT_GCP_STS_URL};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    /// Port to listen on for authenticated requests
    #[arg(short, long, env = "FEDID_PORT", default_value = "8080")]
    pub port: u16,

    /// How inbound tokens are verified
    #[arg(short, long, env = "FEDID_MODE", value_enum, default_value = "aws")]
    pub mode: VerificationMode,

    /// Workload Identity Pool provider audience (required with --mode gcp)
    #[arg(long, env = "FEDID_GCP_AUDIENCE")]
    pub gcp_audience: Option<String>,

    /// GCP STS token exchange endpoint
    #[arg(long, env = "FEDID_GCP_STS_URL", default_value = DEFAULT_GCP_STS_URL)]
    pub gcp_sts_url: String,

    /// Extra STS endpoint tokens may target, besides the public AWS STS hosts (repeatable)
    #[arg(long, env = "FEDID_TRUSTED_STS_ENDPOINTS", value_delimiter = ',')]
    pub trusted_sts_endpoint: Vec<String>,

    /// Timeout in seconds for the upstream STS call [default: 10]
    #[arg(long, env = "FEDID_UPSTREAM_TIMEOUT")]
    pub upstream_timeout: Option<u64>,
}

#[derive(Parser, Debug, Clone)]
pub struct ClientCommand {
    /// The URL to request
    pub url: String,

    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    pub method: String,

    /// Request body for POST/PUT requests
    #[arg(short, long)]
    pub body: Option<String>,

    /// Add an `Authorization: aws-fed-id` header carrying a subject token
    #[arg(long)]
    pub add_auth: bool,

    /// Audience the token is bound to (required with --add-auth)
    #[arg(long, env = "FEDID_AUDIENCE")]
    pub audience: Option<String>,

    /// AWS region to sign for (required with --add-auth)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Override the STS endpoint embedded in the token
    #[arg(long, env = "FEDID_STS_ENDPOINT")]
    pub sts_endpoint: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    pub request_timeout: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct TokenCommand {
    /// Audience the token is bound to
    #[arg(long, env = "FEDID_AUDIENCE")]
    pub audience: Option<String>,

    /// AWS region to sign for
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Override the STS endpoint embedded in the token
    #[arg(long, env = "FEDID_STS_ENDPOINT")]
    pub sts_endpoint: Option<String>,
}

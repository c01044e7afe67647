use clap::ValueEnum;
use hyper::Uri;
use std::fmt;
use std::time::Duration;

use super::error::ConfigError;
use super::http::DEFAULT_UPSTREAM_TIMEOUT;
use crate::commands::{ClientCommand, ServerCommand, TokenCommand};

/// Query string of the STS GetCallerIdentity action
pub const GET_CALLER_IDENTITY_QUERY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

/// GCP STS token exchange endpoint
pub const DEFAULT_GCP_STS_URL: &str = "https://sts.googleapis.com/v1/token";

/// AWS region used for signing, e.g. `eu-west-1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region(String);

impl Region {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        let id = id.trim();
        if id.is_empty() {
            return Err(ConfigError::missing("region"));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::invalid(
                "region",
                format!("'{}' is not an AWS region id", id),
            ));
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheme and authority of an STS endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StsEndpoint {
    scheme: String,
    authority: String,
}

impl StsEndpoint {
    /// Regional AWS STS endpoint
    pub fn for_region(region: &Region) -> Self {
        Self {
            scheme: "https".to_string(),
            authority: format!("sts.{}.amazonaws.com", region),
        }
    }

    /// Parse an endpoint override such as `https://sts.example.vpce.amazonaws.com`
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let uri: Uri = url
            .trim()
            .parse()
            .map_err(|e| ConfigError::invalid("sts endpoint", format!("{}: {}", url, e)))?;

        let scheme = match uri.scheme_str() {
            Some(s @ ("https" | "http")) => s.to_string(),
            _ => {
                return Err(ConfigError::invalid(
                    "sts endpoint",
                    format!("{} must start with https:// or http://", url),
                ))
            }
        };
        let authority = uri
            .authority()
            .map(|a| a.as_str().to_ascii_lowercase())
            .ok_or_else(|| ConfigError::invalid("sts endpoint", format!("{} has no host", url)))?;

        Ok(Self { scheme, authority })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Value of the `host` header for requests to this endpoint
    pub fn host(&self) -> &str {
        &self.authority
    }

    pub fn get_caller_identity_url(&self) -> String {
        format!(
            "{}://{}/?{}",
            self.scheme, self.authority, GET_CALLER_IDENTITY_QUERY
        )
    }
}

/// How inbound tokens are verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VerificationMode {
    /// Replay the signed request against AWS STS and report the caller ARN
    Aws,
    /// Exchange the token at GCP STS for the configured Workload Identity Pool audience
    Gcp,
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws => f.write_str("aws"),
            Self::Gcp => f.write_str("gcp"),
        }
    }
}

/// Settings for producing subject tokens
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub audience: String,
    pub region: Region,
    pub sts_endpoint: Option<StsEndpoint>,
}

impl GeneratorConfig {
    pub fn new(
        audience: Option<&str>,
        region: Option<&str>,
        sts_endpoint: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let audience = audience.ok_or_else(|| ConfigError::missing("audience"))?;
        let region = Region::new(region.ok_or_else(|| ConfigError::missing("region"))?)?;
        let sts_endpoint = sts_endpoint.map(StsEndpoint::parse).transpose()?;

        Ok(Self {
            audience: audience.to_string(),
            region,
            sts_endpoint,
        })
    }

    pub fn from_token_command(cmd: &TokenCommand) -> Result<Self, ConfigError> {
        Self::new(
            cmd.audience.as_deref(),
            cmd.region.as_deref(),
            cmd.sts_endpoint.as_deref(),
        )
    }

    /// `None` when the client was not asked to authenticate
    pub fn from_client_command(cmd: &ClientCommand) -> Result<Option<Self>, ConfigError> {
        if !cmd.add_auth {
            return Ok(None);
        }
        Self::new(
            cmd.audience.as_deref(),
            cmd.region.as_deref(),
            cmd.sts_endpoint.as_deref(),
        )
        .map(Some)
    }
}

/// Verifier settings that depend on the verification mode
#[derive(Debug, Clone)]
pub enum VerifierMode {
    AwsDirect {
        /// Endpoints trusted in addition to the public AWS STS hosts
        trusted_endpoints: Vec<StsEndpoint>,
    },
    GcpDelegated {
        audience: String,
        sts_url: String,
    },
}

impl VerifierMode {
    pub fn kind(&self) -> VerificationMode {
        match self {
            Self::AwsDirect { .. } => VerificationMode::Aws,
            Self::GcpDelegated { .. } => VerificationMode::Gcp,
        }
    }
}

/// Settings for the verifying server
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    pub port: u16,
    pub mode: VerifierMode,
    pub upstream_timeout: Duration,
}

impl VerifierConfig {
    pub fn from_server_command(cmd: &ServerCommand) -> Result<Self, ConfigError> {
        let upstream_timeout = match cmd.upstream_timeout {
            Some(secs) => timeout_secs("upstream timeout", secs)?,
            None => DEFAULT_UPSTREAM_TIMEOUT,
        };

        let mode = match cmd.mode {
            VerificationMode::Aws => VerifierMode::AwsDirect {
                trusted_endpoints: cmd
                    .trusted_sts_endpoint
                    .iter()
                    .map(|e| StsEndpoint::parse(e))
                    .collect::<Result<_, _>>()?,
            },
            VerificationMode::Gcp => {
                let audience = cmd
                    .gcp_audience
                    .as_deref()
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| ConfigError::missing("gcp audience"))?;
                VerifierMode::GcpDelegated {
                    audience: audience.to_string(),
                    sts_url: parse_gcp_sts_url(&cmd.gcp_sts_url)?,
                }
            }
        };

        Ok(Self {
            port: cmd.port,
            mode,
            upstream_timeout,
        })
    }
}

/// Timeout for the single request sent by `fedid client`
pub fn client_request_timeout(cmd: &ClientCommand) -> Result<Duration, ConfigError> {
    timeout_secs("request timeout", cmd.request_timeout)
}

fn timeout_secs(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::invalid(name, "must be at least one second"));
    }
    Ok(Duration::from_secs(secs))
}

/// Token exchange URL: absolute http(s) with a host
fn parse_gcp_sts_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    let uri: Uri = url
        .parse()
        .map_err(|e| ConfigError::invalid("gcp sts url", format!("{}: {}", url, e)))?;

    if !matches!(uri.scheme_str(), Some("https" | "http")) {
        return Err(ConfigError::invalid(
            "gcp sts url",
            format!("{} must start with https:// or http://", url),
        ));
    }
    if uri.host().map_or(true, str::is_empty) {
        return Err(ConfigError::invalid("gcp sts url", format!("{} has no host", url)));
    }

    Ok(url.to_string())
}

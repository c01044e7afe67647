use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use super::error::{FederationError, FederationResult};

/// Authorization scheme carrying a subject token, including the separating space
pub const AUTH_SCHEME_PREFIX: &str = "aws-fed-id ";

// Same output as a form encoder, except spaces become %20 instead of '+'
const TOKEN_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*');

/// One header of the signed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub key: String,
    pub value: String,
}

/// The signed STS request carried inside a subject token.
/// Field order is the JSON order GCP expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<TokenHeader>,
}

impl TokenRequest {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Percent-encoded JSON serialization of a [`TokenRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectToken(String);

impl SubjectToken {
    /// Wrap a token exactly as received, without decoding it
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn encode(request: &TokenRequest) -> FederationResult<Self> {
        let json = serde_json::to_string(request)
            .map_err(|e| FederationError::signing(format!("failed to serialize token: {}", e)))?;
        Ok(Self(utf8_percent_encode(&json, TOKEN_ENCODE_SET).to_string()))
    }

    pub fn decode(&self) -> FederationResult<TokenRequest> {
        // '+' only ever appears as an encoded space; a literal '+' is always %2B
        let spaced = self.0.replace('+', " ");
        let json = percent_decode_str(&spaced).decode_utf8().map_err(|e| {
            FederationError::malformed_token(format!("decoded token is not UTF-8: {}", e))
        })?;

        serde_json::from_str(&json).map_err(|e| {
            FederationError::malformed_token(format!("token is not a signed request: {}", e))
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header carrying this token
    pub fn authorization_value(&self) -> String {
        format!("{}{}", AUTH_SCHEME_PREFIX, self.0)
    }
}

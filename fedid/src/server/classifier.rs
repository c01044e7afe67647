use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;

use crate::common::{SubjectToken, AUTH_SCHEME_PREFIX};

/// Extract the subject token from an `Authorization` header.
///
/// The scheme match is exact and case-sensitive; anything else, including a
/// missing header, means no token was presented. A present but empty token is
/// still returned so it fails verification instead of passing as anonymous.
/// HTTP parsers drop trailing whitespace, so the bare scheme counts as empty.
pub fn extract_token(headers: &HeaderMap) -> Option<SubjectToken> {
    let value = headers.get(AUTHORIZATION)?.as_bytes();
    if value == AUTH_SCHEME_PREFIX.trim_end().as_bytes() {
        return Some(SubjectToken::from_raw(""));
    }
    let rest = value.strip_prefix(AUTH_SCHEME_PREFIX.as_bytes())?;

    let token = String::from_utf8_lossy(rest);
    Some(SubjectToken::from_raw(token.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::header::HeaderValue;

    fn with_authorization(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_token_is_extracted() {
        let token = extract_token(&with_authorization("aws-fed-id abc")).unwrap();
        assert_eq!(token.as_str(), "abc");
    }

    #[test]
    fn test_surrounding_whitespace_is_trimmed() {
        let token = extract_token(&with_authorization("aws-fed-id    abc%7B  ")).unwrap();
        assert_eq!(token.as_str(), "abc%7B");
    }

    #[test]
    fn test_other_schemes_are_not_tokens() {
        assert!(extract_token(&with_authorization("Bearer abc")).is_none());
        assert!(extract_token(&with_authorization("AWS-FED-ID abc")).is_none());
        assert!(extract_token(&with_authorization("aws-fed-idabc")).is_none());
        assert!(extract_token(&with_authorization("aws-fed-id-abc")).is_none());
    }

    #[test]
    fn test_missing_header_is_not_a_token() {
        assert!(extract_token(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_empty_token_is_still_presented() {
        let token = extract_token(&with_authorization("aws-fed-id   ")).unwrap();
        assert_eq!(token.as_str(), "");

        let token = extract_token(&with_authorization("aws-fed-id")).unwrap();
        assert_eq!(token.as_str(), "");
    }
}

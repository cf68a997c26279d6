use crate::error::ApiError;
use axum::http::{header, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use std::net::SocketAddr;
use subtle::ConstantTimeEq;

/// Name of the admin session cookie.
pub const SESSION_COOKIE: &str = "consent_admin_sid";

/// Builds the `Set-Cookie` value that carries a session id.
///
/// The cookie is `HttpOnly` and `SameSite=Strict`; `secure` adds the `Secure`
/// attribute and should be set in production.
pub fn session_cookie(
    session_id: &str,
    max_age_secs: i64,
    secure: bool,
) -> Result<HeaderValue, ApiError> {
    let mut cookie = format!(
        "{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Strict; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).map_err(|e| ApiError::Internal(e.to_string()))
}

/// `Set-Cookie` value that removes the session cookie.
pub fn clear_session_cookie(secure: bool) -> HeaderValue {
    let cookie = if secure {
        "consent_admin_sid=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0; Secure"
    } else {
        "consent_admin_sid=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0"
    };
    HeaderValue::from_static(cookie)
}

/// The session id from the request's `Cookie` headers, if present.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Validates a submission token against the configured one.
///
/// With no token configured every submission passes. The comparison takes
/// the same time wherever the first differing byte falls.
pub fn validate_submit_token(
    expected: Option<&SecretString>,
    provided: Option<&str>,
) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    match provided {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.expose_secret().as_bytes())) => {
            Ok(())
        }
        _ => Err(ApiError::Unauthorised("invalid submission token".into())),
    }
}

/// Client address: first `X-Forwarded-For` entry, else the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_attributes_follow_environment() {
        let dev = session_cookie("abc", 3600, false).unwrap();
        let dev = dev.to_str().unwrap();
        assert!(dev.starts_with("consent_admin_sid=abc;"));
        assert!(dev.contains("HttpOnly"));
        assert!(dev.contains("SameSite=Strict"));
        assert!(!dev.contains("Secure"));

        let prod = session_cookie("abc", 3600, true).unwrap();
        assert!(prod.to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn session_id_is_read_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; consent_admin_sid=f00d; lang=en"),
        );
        assert_eq!(session_id(&headers).as_deref(), Some("f00d"));

        headers.insert(header::COOKIE, HeaderValue::from_static("consent_admin_sid="));
        assert!(session_id(&headers).is_none());
    }

    #[test]
    fn submit_token_is_optional_until_configured() {
        assert!(validate_submit_token(None, None).is_ok());

        let expected = SecretString::new("s3cret".into());
        assert!(validate_submit_token(Some(&expected), Some("s3cret")).is_ok());
        assert!(validate_submit_token(Some(&expected), Some("guess")).is_err());
        assert!(validate_submit_token(Some(&expected), None).is_err());
    }

    #[test]
    fn submit_token_must_match_exactly() {
        let expected = SecretString::new("s3cret".into());
        for given in ["", "s3cre", "s3crets", "S3cret", " s3cret", "s3cret\n"] {
            assert!(
                validate_submit_token(Some(&expected), Some(given)).is_err(),
                "{given:?} accepted"
            );
        }
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("10.0.0.9"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, Some(peer)).as_deref(), Some("203.0.113.5"));
        assert!(client_ip(&HeaderMap::new(), None).is_none());
    }
}

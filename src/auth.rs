//! HTTP basic authentication in front of the whole application.
//!
//! Installed as the outermost router layer when credentials are configured.
//! The liveness probe stays reachable without credentials.

use crate::config::BasicAuth;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Paths served without credentials.
const PUBLIC_PATHS: [&str; 1] = ["/health"];

pub async fn require_basic_auth(
    State(credentials): State<Arc<BasicAuth>>,
    request: Request,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    match decode_credentials(request.headers()) {
        Some((username, password)) if credentials_match(&credentials, &username, &password) => {
            next.run(request).await
        }
        Some((username, _)) => {
            debug!("Rejected credentials for user '{}'", username);
            ApiError::unauthorized().into_response()
        }
        None => ApiError::unauthorized().into_response(),
    }
}

/// Parse `Authorization: Basic <base64(user:password)>`.
fn decode_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Compare digests so the comparison does not depend on where the inputs differ.
fn credentials_match(expected: &BasicAuth, username: &str, password: &str) -> bool {
    let user_ok = Sha256::digest(username.as_bytes())
        == Sha256::digest(expected.username.as_bytes());
    let pass_ok = Sha256::digest(password.as_bytes())
        == Sha256::digest(expected.password.expose().as_bytes());
    user_ok & pass_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_decode_credentials() {
        let encoded = BASE64.encode("reader:pa:ss");
        assert_eq!(
            decode_credentials(&headers(&format!("Basic {}", encoded))),
            Some(("reader".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(
            decode_credentials(&headers(&format!("basic {}", encoded))),
            Some(("reader".to_string(), "pa:ss".to_string()))
        );
        assert_eq!(decode_credentials(&headers("Bearer abc")), None);
        assert_eq!(decode_credentials(&headers("Basic !!!")), None);
        assert_eq!(decode_credentials(&HeaderMap::new()), None);
    }

    #[test]
    fn test_credentials_match() {
        let expected = BasicAuth {
            username: "reader".to_string(),
            password: Secret::new("s3cret"),
        };
        assert!(credentials_match(&expected, "reader", "s3cret"));
        assert!(!credentials_match(&expected, "reader", "s3cret!"));
        assert!(!credentials_match(&expected, "Reader", "s3cret"));
    }
}

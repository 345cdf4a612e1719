//! # Authentication Module
//!
//! Simple API key authentication for the tagstore HTTP API.
//!
//! - `TAGSTORE_API_KEY`: if set, all requests except `/health` need
//!   `Authorization: Bearer <key>`

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// API key from `TAGSTORE_API_KEY`; `None` when unset or empty.
pub fn get_api_key_from_env() -> Option<String> {
    std::env::var("TAGSTORE_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
}

/// Constant-time equality; a length mismatch still compares every byte.
fn keys_match(provided: &[u8], expected: &[u8]) -> bool {
    let len = provided.len().max(expected.len());
    let pad = |key: &[u8]| {
        let mut padded = key.to_vec();
        padded.resize(len, 0);
        padded
    };
    let same_bytes: bool = pad(provided).ct_eq(&pad(expected)).into();
    same_bytes && provided.len() == expected.len()
}

/// The key a request carries: `Bearer <key>` or the bare key.
fn presented_key(request: &Request<Body>) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}

/// Reject requests without the configured API key. `/health` stays open.
pub async fn api_key_auth_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(expected) = get_api_key_from_env() else {
        return Ok(next.run(request).await);
    };
    if request.uri().path() == "/health" {
        return Ok(next.run(request).await);
    }

    let rejection = match presented_key(&request) {
        Some(key) if keys_match(key.as_bytes(), expected.as_bytes()) => None,
        Some(_) => Some("invalid_api_key"),
        None => Some("missing_authorization_header"),
    };
    let Some(reason) = rejection else {
        return Ok(next.run(request).await);
    };
    tracing::warn!(event = "auth_failure", reason, path = %request.uri().path(), "Request rejected");
    Err((StatusCode::UNAUTHORIZED, "Unauthorized"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_comparison() {
        assert!(keys_match(b"secret", b"secret"));
        assert!(!keys_match(b"secret", b"secreT"));
        assert!(!keys_match(b"secret", b"secret-longer"));
        assert!(!keys_match(b"", b"secret"));
    }

    #[test]
    fn bearer_prefix_optional() {
        let bearer = Request::builder()
            .header(header::AUTHORIZATION, "Bearer k1")
            .body(Body::empty())
            .expect("request");
        let bare = Request::builder()
            .header(header::AUTHORIZATION, "k1")
            .body(Body::empty())
            .expect("request");
        assert_eq!(presented_key(&bearer), Some("k1"));
        assert_eq!(presented_key(&bare), Some("k1"));
        assert_eq!(presented_key(&Request::new(Body::empty())), None);
    }
}

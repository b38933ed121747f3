use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use super::{AppMessage, AppState};
use crate::error::Error;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Lets the request through only when `X-Api-Key` equals the configured key.
/// With no key configured every request is refused.
pub async fn require_api_key(
    State(s): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppMessage> {
    let expected = s.api_key.as_deref().ok_or(Error::Unauthorized)?;
    let given = extract_api_key(req.headers()).ok_or(Error::Unauthorized)?;
    if !same_key(given.as_bytes(), expected.as_bytes()) {
        log::warn!("rejected request to {} with a wrong api key", req.uri().path());
        return Err(Error::Unauthorized.into());
    }
    Ok(next.run(req).await)
}

fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    let key = headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();
    if key.is_empty() {
        return None;
    }
    Some(key)
}

/// Compares without returning early on the first differing byte.
fn same_key(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn header_must_be_present_and_non_empty() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(extract_api_key(&headers), None);
        headers.insert(API_KEY_HEADER, HeaderValue::from_static(" secret "));
        assert_eq!(extract_api_key(&headers), Some("secret"));
    }

    #[test]
    fn keys_compare_exactly() {
        assert!(same_key(b"secret", b"secret"));
        assert!(!same_key(b"secret", b"secreT"));
        assert!(!same_key(b"secret", b"secret2"));
    }
}

//! Stateless helpers for request processing

use axum::http::HeaderMap;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::de::DeserializeOwned;

use crate::api::error::ApiError;

pub const CRON_SECRET_HEADER: &str = "X-Cron-Secret";

/// Accepts `application/json` with optional parameters, rejects look-alikes
/// such as `application/jsonp` or `text/json`
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("invalid Content-Type: {content_type}")))?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Check content type and size, then deserialize a JSON body
///
/// The body is read through a [`Limited`] wrapper, so an oversized payload is
/// rejected as soon as it crosses `max_size` instead of being buffered whole.
pub async fn read_json_body<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: axum::body::Body,
    max_size: usize,
) -> Result<T, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let data = Limited::new(body, max_size)
        .collect()
        .await
        .map_err(|err| {
            if err.is::<LengthLimitError>() {
                ApiError::PayloadTooLarge(max_size)
            } else {
                ApiError::InvalidPayload(err.to_string())
            }
        })?
        .to_bytes();

    Ok(serde_json::from_slice(&data)?)
}

/// Compare the `X-Cron-Secret` header with the configured secret
///
/// Comparison time does not depend on where the values differ. Without a
/// configured secret nothing matches.
pub fn verify_cron_secret(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return false;
    };
    let Some(provided) = headers.get(CRON_SECRET_HEADER).map(|v| v.as_bytes()) else {
        return false;
    };

    constant_time_eq(provided, expected.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers
    }

    #[tokio::test]
    async fn test_read_json_body_within_limit() {
        let body = axum::body::Body::from(r#"{"name":"x"}"#);
        let value: serde_json::Value = read_json_body(&json_headers(), body, 12).await.unwrap();
        assert_eq!(value["name"], "x");
    }

    #[tokio::test]
    async fn test_read_json_body_over_limit() {
        let body = axum::body::Body::from(vec![b' '; 1000]);
        let result = read_json_body::<serde_json::Value>(&json_headers(), body, 999).await;
        assert!(matches!(result, Err(ApiError::PayloadTooLarge(999))));
    }

    #[test]
    fn test_verify_cron_secret() {
        let mut headers = HeaderMap::new();
        assert!(!verify_cron_secret(&headers, Some("s3cret")));

        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(verify_cron_secret(&headers, Some("s3cret")));
        assert!(!verify_cron_secret(&headers, Some("s3cre")));
        assert!(!verify_cron_secret(&headers, Some("s3creT")));
        assert!(!verify_cron_secret(&headers, None));
        assert!(!verify_cron_secret(&headers, Some("")));
    }
}

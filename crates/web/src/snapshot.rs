//! Response capture and replay.
//!
//! A snapshot is a flat string map:
//!
//! ```text
//! status-code    -> "201"
//! content-type   -> "application/json"   (absent if the handler set none)
//! body           -> response body, UTF-8
//! header-<name>  -> value, for each allow-listed header present
//! ```

use std::str::Utf8Error;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::Response;

use idem_core::IdempotencyData;

use crate::options::IdempotencyOptions;

pub const STATUS_CODE: &str = "status-code";
pub const CONTENT_TYPE: &str = "content-type";
pub const BODY: &str = "body";
pub const HEADER_PREFIX: &str = "header-";

const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Snapshot a handler response.
///
/// # Errors
///
/// Returns the UTF-8 error if the body is not text; such responses are not
/// replayable and the caller should release instead of completing.
pub fn capture(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    options: &IdempotencyOptions,
) -> Result<IdempotencyData, Utf8Error> {
    let body = std::str::from_utf8(body)?;

    let mut data = IdempotencyData::new()
        .with(STATUS_CODE, status.as_u16().to_string())
        .with(BODY, body);

    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        data.insert(CONTENT_TYPE, content_type);
    }

    for name in &options.headers_to_store {
        let values: Vec<&str> = headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if !values.is_empty() {
            data.insert(format!("{HEADER_PREFIX}{}", name.as_str()), values.join(", "));
        }
    }

    Ok(data)
}

/// Rebuild a response from a snapshot.
///
/// Keys are matched case-insensitively. Missing or unparsable entries fall
/// back to 200, `application/json` and an empty body. Header entries with an empty or invalid name or value are
/// skipped.
#[must_use]
pub fn replay(data: &IdempotencyData) -> Response {
    let status = lookup(data, STATUS_CODE)
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);
    let content_type = lookup(data, CONTENT_TYPE).unwrap_or(DEFAULT_CONTENT_TYPE);
    let body = lookup(data, BODY).unwrap_or_default().to_string();

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (key, value) in data.iter() {
        let Some(name) = strip_header_prefix(key) else {
            continue;
        };
        if name.trim().is_empty() || value.is_empty() {
            continue;
        }
        match (
            HeaderName::try_from(name.trim()),
            HeaderValue::try_from(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(header = %name, "Skipping unreplayable stored header"),
        }
    }

    match HeaderValue::try_from(content_type) {
        Ok(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        Err(_) => {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
            );
        }
    }

    response
}

/// Snapshot keys are case-insensitive; an exact match wins.
fn lookup<'a>(data: &'a IdempotencyData, name: &str) -> Option<&'a str> {
    data.get(name).or_else(|| {
        data.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Case-insensitive `header-` prefix match.
fn strip_header_prefix(key: &str) -> Option<&str> {
    let prefix = key.get(..HEADER_PREFIX.len())?;
    if prefix.eq_ignore_ascii_case(HEADER_PREFIX) {
        key.get(HEADER_PREFIX.len()..)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn body_string(response: Response) -> String {
        match response.into_body().collect().await {
            Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
            Err(_) => String::new(),
        }
    }

    #[test]
    fn test_capture_keys() -> Result<(), Utf8Error> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::ETAG, HeaderValue::from_static("\"v1\""));

        let data = capture(
            StatusCode::CREATED,
            &headers,
            br#"{"id":1}"#,
            &IdempotencyOptions::default(),
        )?;

        assert_eq!(data.get(STATUS_CODE), Some("201"));
        assert_eq!(data.get(CONTENT_TYPE), Some("application/json"));
        assert_eq!(data.get(BODY), Some(r#"{"id":1}"#));
        assert_eq!(data.get("header-cache-control"), Some("no-store"));
        assert_eq!(data.get("header-etag"), None, "not allow-listed");
        assert_eq!(data.len(), 4);
        Ok(())
    }

    #[test]
    fn test_capture_rejects_binary_body() {
        let result = capture(
            StatusCode::OK,
            &HeaderMap::new(),
            &[0xff, 0xfe, 0x00],
            &IdempotencyOptions::default(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_replay_defaults() {
        let response = replay(&IdempotencyData::new());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert_eq!(body_string(response).await, "");
    }

    #[tokio::test]
    async fn test_replay_restores_snapshot() {
        let data = IdempotencyData::new()
            .with(STATUS_CODE, "201")
            .with(CONTENT_TYPE, "text/plain")
            .with(BODY, "created")
            .with("HEADER-Cache-Control", "no-store")
            .with("header-", "ignored")
            .with("header-x-empty", "");

        let response = replay(&data);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL),
            Some(&HeaderValue::from_static("no-store"))
        );
        assert!(response.headers().get("x-empty").is_none());
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/plain"))
        );
        assert_eq!(body_string(response).await, "created");
    }

    #[tokio::test]
    async fn test_replay_ignores_garbage_status() {
        let data = IdempotencyData::new().with(STATUS_CODE, "abc");
        assert_eq!(replay(&data).status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_replay_reads_keys_case_insensitively() {
        let data = IdempotencyData::new()
            .with("Status-Code", "202")
            .with("CONTENT-TYPE", "text/csv")
            .with("Body", "a,b");

        let response = replay(&data);
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE),
            Some(&HeaderValue::from_static("text/csv"))
        );
        assert_eq!(body_string(response).await, "a,b");
    }

    #[test]
    fn test_strip_header_prefix() {
        assert_eq!(strip_header_prefix("header-etag"), Some("etag"));
        assert_eq!(strip_header_prefix("Header-ETag"), Some("ETag"));
        assert_eq!(strip_header_prefix("body"), None);
        assert_eq!(strip_header_prefix("head"), None);
    }
}

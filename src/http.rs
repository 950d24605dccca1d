//! Shared HTTP plumbing for plugin handlers.
//!
//! Handlers do not retry, back off, or circuit-break: every upstream failure
//! surfaces immediately as a tagged error. This module owns the two pieces
//! every HTTP plugin shares: transport-error classification and upstream
//! error-body parsing.

use reqwest::StatusCode;
use serde_json::Value;

use crate::errors::{Error, Result, TransportError, TransportErrorKind, UpstreamError};

pub(crate) fn classify(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else if err.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    }
}

pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    Error::Transport(TransportError {
        kind: classify(&err),
        message: err.to_string(),
        source: Some(err),
    })
}

/// Build an [`UpstreamError`] from a non-2xx response body. Recognizes the
/// common vendor envelopes (`{"error": {"code", "message"}}`, a top-level
/// `message`, GitHub's `{"message", "documentation_url"}`) and falls back to
/// the raw body, or the status text when the body is empty.
pub(crate) fn upstream_error(plugin: &str, status: StatusCode, body: String) -> Error {
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if body.is_empty() {
        return UpstreamError::new(plugin, status_text)
            .with_status(status_code)
            .into();
    }

    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        if let Some(err_obj) = value.get("error").and_then(|v| v.as_object()) {
            let code = err_obj
                .get("code")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            let message = err_obj
                .get("message")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or(status_text);
            return Error::Upstream(UpstreamError {
                plugin: plugin.to_string(),
                status: Some(status_code),
                code,
                message,
                raw_body: Some(body),
            });
        }

        if let Some(message) = value.get("message").and_then(|v| v.as_str()) {
            let code = value
                .get("code")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string());
            return Error::Upstream(UpstreamError {
                plugin: plugin.to_string(),
                status: Some(status_code),
                code,
                message: message.to_string(),
                raw_body: Some(body),
            });
        }
    }

    Error::Upstream(UpstreamError {
        plugin: plugin.to_string(),
        status: Some(status_code),
        code: None,
        message: body.clone(),
        raw_body: Some(body),
    })
}

/// Send a prepared request and decode the JSON response body. Empty bodies
/// (204 and friends) decode to `Value::Null`.
pub(crate) async fn send_json(plugin: &str, builder: reqwest::RequestBuilder) -> Result<Value> {
    let response = builder.send().await.map_err(transport_error)?;
    json_or_upstream(plugin, response).await
}

pub(crate) async fn json_or_upstream(plugin: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(upstream_error(plugin, status, body));
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(Error::Serialization)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_envelope() {
        let err = upstream_error(
            "OpenAI API",
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":"rate_limit","message":"slow down"}}"#.to_string(),
        );
        match err {
            Error::Upstream(u) => {
                assert_eq!(u.status, Some(429));
                assert_eq!(u.code.as_deref(), Some("rate_limit"));
                assert_eq!(u.to_string(), "OpenAI API error (429): slow down");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn parses_top_level_message() {
        let err = upstream_error(
            "GitHub API",
            StatusCode::NOT_FOUND,
            r#"{"message":"Not Found","documentation_url":"https://docs.github.com"}"#.to_string(),
        );
        assert_eq!(err.to_string(), "GitHub API error (404): Not Found");
    }

    #[test]
    fn empty_body_uses_status_text() {
        let err = upstream_error("S3 Storage", StatusCode::FORBIDDEN, String::new());
        assert_eq!(err.to_string(), "S3 Storage error (403): Forbidden");
    }

    #[test]
    fn unparseable_body_passes_through() {
        let err = upstream_error("S3 Storage", StatusCode::BAD_GATEWAY, "<oops>".to_string());
        assert!(err.to_string().contains("<oops>"));
    }
}

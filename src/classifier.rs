//! Mapping of failed HTTP responses onto [`ApiError`] kinds
//!
//! Classification is a pure function of status, headers and body. A body
//! that carries the API's structured error envelope wins; anything else
//! goes through a fixed status-code table.

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::ApiError;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error body as returned by the API
///
/// `{"status": "error", "error": "validation_failed", "message": "...", "details": ...}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<Value>,
    #[serde(default)]
    request_id: Option<String>,
}

/// Classify a non-2xx response
///
/// Always yields exactly one [`ApiError`].
///
/// # Example
///
/// ```rust
/// use nexmonyx_api::{classify, ApiErrorKind};
/// use reqwest::header::HeaderMap;
/// use reqwest::StatusCode;
///
/// let error = classify(StatusCode::NOT_FOUND, &HeaderMap::new(), b"");
/// assert_eq!(error.kind(), ApiErrorKind::NotFound);
/// ```
pub fn classify(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> ApiError {
    let envelope = serde_json::from_slice::<ErrorEnvelope>(body).ok();

    if let Some(structured) = envelope.as_ref().and_then(|e| from_envelope(status, headers, e)) {
        return structured;
    }

    let code = status.as_u16();
    let raw_body = String::from_utf8_lossy(body).trim().to_string();
    let body_message = envelope
        .as_ref()
        .and_then(|e| e.message.clone())
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| raw_body.clone());

    match code {
        400 => ApiError::Validation {
            status: code,
            message: raw_body,
            details: envelope.and_then(|e| e.details),
        },
        401 => ApiError::Unauthorized {
            status: code,
            message: useful_or(body_message, "Authentication required"),
        },
        403 => ApiError::Forbidden {
            status: code,
            message: useful_or(body_message, "Access forbidden"),
        },
        404 => ApiError::NotFound {
            status: code,
            message: "Resource not found".to_string(),
        },
        429 => ApiError::RateLimited {
            status: code,
            message: "Rate limit exceeded".to_string(),
            retry_after: header_value(headers, RETRY_AFTER.as_str()),
        },
        500 | 502 | 503 | 504 => ApiError::InternalServerError {
            status: code,
            message: useful_or(body_message, &server_error_message(status)),
            request_id: request_id(headers, envelope.as_ref()),
        },
        _ => ApiError::Generic {
            status: code,
            message: useful_or(body_message, &server_error_message(status)),
            code: format!("HTTP_{code}"),
        },
    }
}

fn from_envelope(status: StatusCode, headers: &HeaderMap, envelope: &ErrorEnvelope) -> Option<ApiError> {
    let error_type = envelope.error.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    let status = status.as_u16();
    let message = envelope
        .message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| error_type.to_string());

    let normalized = error_type.to_ascii_lowercase();
    let error = match normalized.as_str() {
        t if t.starts_with("validation") || t == "bad_request" || t == "invalid_request" => {
            ApiError::Validation {
                status,
                message,
                details: envelope.details.clone(),
            }
        }
        t if t == "unauthorized" || t.starts_with("authentication") => {
            ApiError::Unauthorized { status, message }
        }
        t if t == "forbidden" || t.starts_with("permission") => ApiError::Forbidden { status, message },
        "not_found" => ApiError::NotFound { status, message },
        t if t.starts_with("rate_limit") => ApiError::RateLimited {
            status,
            message,
            retry_after: header_value(headers, RETRY_AFTER.as_str()),
        },
        t if t.starts_with("internal") || t == "server_error" => ApiError::InternalServerError {
            status,
            message,
            request_id: request_id(headers, Some(envelope)),
        },
        _ => ApiError::Generic {
            status,
            message,
            code: error_type.to_string(),
        },
    };
    Some(error)
}

/// Empty bodies and a bare `{}` carry nothing worth showing a user
fn useful_or(message: String, fallback: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() || trimmed == "{}" {
        fallback.to_string()
    } else {
        message
    }
}

fn server_error_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{reason} (HTTP {})", status.as_u16()),
        None => format!("HTTP {}", status.as_u16()),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn request_id(headers: &HeaderMap, envelope: Option<&ErrorEnvelope>) -> Option<String> {
    header_value(headers, REQUEST_ID_HEADER)
        .or_else(|| envelope.and_then(|e| e.request_id.clone()))
}

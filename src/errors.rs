use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Nexmonyx operations
pub type Result<T> = std::result::Result<T, NexmonyxError>;

/// Category of an [`ApiError`], for callers that only need to branch on the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiErrorKind {
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    RateLimited,
    InternalServerError,
    Generic,
}

/// Error reported by the API after an HTTP response was received
///
/// Produced by [`classify`](crate::classify). Every variant carries the HTTP
/// status and a human-readable message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The request was rejected as invalid (HTTP 400)
    #[error("Validation error: {message}")]
    Validation {
        status: u16,
        message: String,
        /// Field-level details, when the API provided them
        details: Option<Value>,
    },

    /// Missing or invalid credentials (HTTP 401)
    #[error("Unauthorized: {message}")]
    Unauthorized { status: u16, message: String },

    /// Credentials lack permission for the resource (HTTP 403)
    #[error("Forbidden: {message}")]
    Forbidden { status: u16, message: String },

    /// The resource does not exist (HTTP 404)
    #[error("Not found: {message}")]
    NotFound { status: u16, message: String },

    /// Too many requests (HTTP 429)
    #[error("Rate limited: {message}")]
    RateLimited {
        status: u16,
        message: String,
        /// `Retry-After` header value, verbatim
        retry_after: Option<String>,
    },

    /// The server failed to process the request (HTTP 500/502/503/504)
    #[error("Internal server error (HTTP {status}): {message}")]
    InternalServerError {
        status: u16,
        message: String,
        /// `X-Request-ID` of the failed request, for support tickets
        request_id: Option<String>,
    },

    /// Any other failure
    #[error("API error {code} (HTTP {status}): {message}")]
    Generic {
        status: u16,
        message: String,
        code: String,
    },
}

impl ApiError {
    /// Kind of the error, without its metadata
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Validation { .. } => ApiErrorKind::Validation,
            Self::Unauthorized { .. } => ApiErrorKind::Unauthorized,
            Self::Forbidden { .. } => ApiErrorKind::Forbidden,
            Self::NotFound { .. } => ApiErrorKind::NotFound,
            Self::RateLimited { .. } => ApiErrorKind::RateLimited,
            Self::InternalServerError { .. } => ApiErrorKind::InternalServerError,
            Self::Generic { .. } => ApiErrorKind::Generic,
        }
    }

    /// HTTP status code of the response
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation { status, .. }
            | Self::Unauthorized { status, .. }
            | Self::Forbidden { status, .. }
            | Self::NotFound { status, .. }
            | Self::RateLimited { status, .. }
            | Self::InternalServerError { status, .. }
            | Self::Generic { status, .. } => *status,
        }
    }

    /// Human-readable error message
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::NotFound { message, .. }
            | Self::RateLimited { message, .. }
            | Self::InternalServerError { message, .. }
            | Self::Generic { message, .. } => message,
        }
    }

    /// Check if sending the same request again could succeed
    ///
    /// Returns `true` for rate limiting and server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::InternalServerError { .. } => true,
            Self::Generic { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Interpret the `Retry-After` value of a rate limit error
    ///
    /// Accepts both delta-seconds (`"17"`) and an HTTP-date. Dates in the
    /// past yield a zero duration.
    pub fn retry_after_duration(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after: Some(value),
                ..
            } => parse_retry_after(value, Utc::now()),
            _ => None,
        }
    }
}

/// Parse a `Retry-After` header value relative to `now`
pub(crate) fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Errors that can occur when talking to the Nexmonyx API
#[derive(Debug, Error)]
pub enum NexmonyxError {
    /// Failed to build HTTP client
    #[error("Failed to build HTTP client: {0}")]
    BuildHttpClient(#[source] reqwest::Error),

    /// The configured base URL could not be parsed
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// A request path could not be joined onto the base URL
    #[error("Invalid request URL for path {path}: {source}")]
    InvalidUrl {
        path: String,
        #[source]
        source: url::ParseError,
    },

    /// A header name or value is not valid HTTP
    #[error("Invalid header {0}")]
    InvalidHeader(String),

    /// No HTTP response was received (DNS, connect, timeout, ...)
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest_middleware::Error),

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Failed to serialize the request body
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A successful response did not match the expected result shape
    #[error("Failed to decode response (HTTP {status}): {source}")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    /// The API returned an error response
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl NexmonyxError {
    /// Check if the error is retryable
    ///
    /// Returns `true` for:
    /// - Network/connection errors
    /// - Timeout errors
    /// - Rate limiting and server errors (429, 5xx)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(source) => is_retryable_transport(source),
            Self::Api(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// `true` when the server could not be reached at all
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// `true` when the caller cancelled the request
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The classified API error, if the server answered with one
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

/// Network-level failures are retried; request construction and
/// middleware failures are not.
pub(crate) fn is_retryable_transport(err: &reqwest_middleware::Error) -> bool {
    match err {
        reqwest_middleware::Error::Reqwest(err) => !err.is_builder(),
        reqwest_middleware::Error::Middleware(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_retryable_5xx_and_429() {
        let error = ApiError::InternalServerError {
            status: 503,
            message: "Service unavailable".to_string(),
            request_id: None,
        };
        assert!(error.is_retryable());

        let error = ApiError::RateLimited {
            status: 429,
            message: "Slow down".to_string(),
            retry_after: None,
        };
        assert!(error.is_retryable());

        let error = ApiError::Generic {
            status: 501,
            message: "Not implemented".to_string(),
            code: "HTTP_501".to_string(),
        };
        assert!(error.is_retryable());
    }

    #[test]
    fn test_api_error_not_retryable_4xx() {
        let error = ApiError::Validation {
            status: 400,
            message: "Bad request".to_string(),
            details: None,
        };
        assert!(!error.is_retryable());

        let error = ApiError::Unauthorized {
            status: 401,
            message: "Unauthorized".to_string(),
        };
        assert!(!error.is_retryable());

        let error = ApiError::NotFound {
            status: 404,
            message: "Not found".to_string(),
        };
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = ApiError::InternalServerError {
            status: 500,
            message: "boom".to_string(),
            request_id: Some("req-1".to_string()),
        };
        assert_eq!(error.to_string(), "Internal server error (HTTP 500): boom");

        let error = NexmonyxError::Api(ApiError::Generic {
            status: 418,
            message: "teapot".to_string(),
            code: "HTTP_418".to_string(),
        });
        assert_eq!(error.to_string(), "API error HTTP_418 (HTTP 418): teapot");
    }

    #[test]
    fn test_kind_status_and_message_accessors() {
        let error = ApiError::Forbidden {
            status: 403,
            message: "no access".to_string(),
        };
        assert_eq!(error.kind(), ApiErrorKind::Forbidden);
        assert_eq!(error.status(), 403);
        assert_eq!(error.message(), "no access");
    }

    #[test]
    fn test_retry_after_seconds() {
        let error = ApiError::RateLimited {
            status: 429,
            message: "Slow down".to_string(),
            retry_after: Some("17".to_string()),
        };
        assert_eq!(error.retry_after_duration(), Some(Duration::from_secs(17)));
    }

    #[test]
    fn test_retry_after_http_date() {
        let now = DateTime::parse_from_rfc2822("Wed, 21 Oct 2015 07:28:00 GMT")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn test_non_api_errors_not_retryable() {
        let json_err = serde_json::from_str::<Value>("invalid").unwrap_err();
        let error = NexmonyxError::Serialize(json_err);
        assert!(!error.is_retryable());
        assert!(error.api_error().is_none());

        assert!(!NexmonyxError::Cancelled.is_retryable());
        assert!(NexmonyxError::Cancelled.is_cancelled());
        assert!(!NexmonyxError::Cancelled.is_transport());
    }
}

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::auth::is_credential_header;
use crate::errors::{ApiError, NexmonyxError, Result};

/// Everything needed to perform one API call
///
/// Built fresh for each call and consumed by
/// [`NexmonyxClient::execute`](crate::NexmonyxClient::execute).
///
/// # Example
///
/// ```rust
/// use nexmonyx_api::RequestDescriptor;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct NewProbe {
///     name: String,
///     url: String,
/// }
///
/// let request = RequestDescriptor::post("/v1/probes")
///     .query("organization_id", "42")
///     .body(NewProbe {
///         name: "homepage".to_string(),
///         url: "https://example.com".to_string(),
///     });
///
/// assert_eq!(request.path, "/v1/probes");
/// ```
#[derive(Debug, Clone)]
pub struct RequestDescriptor<B = ()> {
    pub method: Method,
    /// Path relative to the configured base URL
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<B>,
    /// Extra headers for this call only
    pub headers: HeaderMap,
}

impl RequestDescriptor<()> {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            query: BTreeMap::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }
}

impl<B> RequestDescriptor<B> {
    /// Attach a JSON body
    pub fn body<T: Serialize>(self, body: T) -> RequestDescriptor<T> {
        RequestDescriptor {
            method: self.method,
            path: self.path,
            query: self.query,
            body: Some(body),
            headers: self.headers,
        }
    }

    /// Add a query parameter
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a header for this call
    ///
    /// # Errors
    ///
    /// Returns [`NexmonyxError::InvalidHeader`] if the name or value is not
    /// valid HTTP, or if the header carries credentials.
    pub fn header(mut self, name: &str, value: &str) -> Result<Self> {
        if is_credential_header(name) {
            return Err(NexmonyxError::InvalidHeader(format!(
                "{name}: credentials must be set through the authentication strategy"
            )));
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| NexmonyxError::InvalidHeader(format!("{name}: name is not valid")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| NexmonyxError::InvalidHeader(format!("{name}: value is not valid")))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }
}

/// Envelope status discriminator
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    #[default]
    Success,
    Error,
}

/// Outer JSON wrapper of every API response
///
/// `{"status": "success", "message": "...", "data": ...}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponseEnvelope {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: EnvelopeStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl ResponseEnvelope {
    /// Parse a 2xx response body. An empty body is an envelope without data.
    pub(crate) fn parse(status: StatusCode, body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }

        serde_json::from_slice(body).map_err(|source| NexmonyxError::Decode {
            status: status.as_u16(),
            source,
        })
    }

    /// Extract the typed payload
    ///
    /// An envelope reporting `"status": "error"` is turned into an API error
    /// even though the HTTP status was successful.
    pub(crate) fn into_response<T: DeserializeOwned>(
        self,
        status: StatusCode,
    ) -> Result<ApiResponse<T>> {
        if self.status == EnvelopeStatus::Error {
            let message = if self.message.is_empty() {
                "API reported an error".to_string()
            } else {
                self.message
            };
            return Err(ApiError::Generic {
                status: status.as_u16(),
                message,
                code: "API_ERROR".to_string(),
            }
            .into());
        }

        let data = T::deserialize(self.data).map_err(|source| NexmonyxError::Decode {
            status: status.as_u16(),
            source,
        })?;

        Ok(ApiResponse {
            status,
            message: self.message,
            data,
        })
    }
}

/// Successful, decoded API response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    /// HTTP status of the response
    pub status: StatusCode,
    /// Envelope message
    pub message: String,
    /// Envelope `data`, decoded as the caller's type
    pub data: T,
}

impl<T> ApiResponse<T> {
    /// Take the decoded payload
    pub fn into_data(self) -> T {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Server {
        id: u64,
        hostname: String,
    }

    #[test]
    fn test_descriptor_builders() {
        let request = RequestDescriptor::get("/v1/servers")
            .query("page", 2)
            .query("limit", "50")
            .header("X-Trace", "abc")
            .unwrap();

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.path, "/v1/servers");
        assert_eq!(request.query.get("page").unwrap(), "2");
        assert_eq!(request.query.get("limit").unwrap(), "50");
        assert_eq!(request.headers.get("x-trace").unwrap(), "abc");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_descriptor_body_changes_type() {
        let request = RequestDescriptor::put("/v1/alerts/1").body(serde_json::json!({"enabled": false}));
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.body.unwrap()["enabled"], false);
    }

    #[test]
    fn test_descriptor_invalid_header() {
        let result = RequestDescriptor::delete("/v1/x").header("bad\nname", "v");
        assert!(matches!(result, Err(NexmonyxError::InvalidHeader(_))));

        let result = RequestDescriptor::get("/v1/x").header("X-Monitoring-Key", "other");
        assert!(matches!(result, Err(NexmonyxError::InvalidHeader(_))));
    }

    #[test]
    fn test_envelope_into_typed_data() {
        let body = br#"{"status":"success","message":"ok","data":{"id":7,"hostname":"web-1"}}"#;
        let response: ApiResponse<Server> = ResponseEnvelope::parse(StatusCode::OK, body)
            .unwrap()
            .into_response(StatusCode::OK)
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.message, "ok");
        assert_eq!(
            response.data,
            Server {
                id: 7,
                hostname: "web-1".to_string()
            }
        );
    }

    #[test]
    fn test_empty_body_decodes_to_unit() {
        let response: ApiResponse<()> = ResponseEnvelope::parse(StatusCode::NO_CONTENT, b"")
            .unwrap()
            .into_response(StatusCode::NO_CONTENT)
            .unwrap();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
    }

    #[test]
    fn test_missing_data_is_null() {
        let response: ApiResponse<Option<Server>> =
            ResponseEnvelope::parse(StatusCode::OK, br#"{"status":"success","message":"deleted"}"#)
                .unwrap()
                .into_response(StatusCode::OK)
                .unwrap();
        assert_eq!(response.data, None);
        assert_eq!(response.message, "deleted");
    }

    #[test]
    fn test_null_status_and_message_are_accepted() {
        let body = br#"{"status":null,"message":null,"data":{"id":1,"hostname":"db-1"}}"#;
        let envelope = ResponseEnvelope::parse(StatusCode::OK, body).unwrap();
        assert_eq!(envelope.status, EnvelopeStatus::Success);
        assert_eq!(envelope.message, "");

        let response: ApiResponse<Server> = ResponseEnvelope::parse(
            StatusCode::OK,
            br#"{"status":"success","message":null,"data":{"id":1,"hostname":"db-1"}}"#,
        )
        .unwrap()
        .into_response(StatusCode::OK)
        .unwrap();
        assert_eq!(response.message, "");
        assert_eq!(response.data.id, 1);
    }

    #[test]
    fn test_data_shape_mismatch_is_decode_error() {
        let result: Result<ApiResponse<Server>> =
            ResponseEnvelope::parse(StatusCode::OK, br#"{"status":"success","data":[1,2]}"#)
                .unwrap()
                .into_response(StatusCode::OK);

        assert!(matches!(result, Err(NexmonyxError::Decode { status: 200, .. })));
    }

    #[test]
    fn test_error_envelope_on_success_status() {
        let result: Result<ApiResponse<Value>> =
            ResponseEnvelope::parse(StatusCode::OK, br#"{"status":"error","message":"quota reached"}"#)
                .unwrap()
                .into_response(StatusCode::OK);

        match result {
            Err(NexmonyxError::Api(ApiError::Generic { code, message, .. })) => {
                assert_eq!(code, "API_ERROR");
                assert_eq!(message, "quota reached");
            }
            other => panic!("Expected Generic API error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_json_success_body_is_decode_error() {
        let result = ResponseEnvelope::parse(StatusCode::OK, b"<html>");
        assert!(matches!(result, Err(NexmonyxError::Decode { .. })));
    }
}

//! Authentication strategies
//!
//! A client authenticates in exactly one way. Which one is decided once,
//! when the configuration is built, by the precedence of [`Credentials::resolve`].

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};

use crate::errors::{NexmonyxError, Result};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_SECRET_HEADER: &str = "x-api-secret";
pub const SERVER_UUID_HEADER: &str = "x-server-uuid";
pub const SERVER_SECRET_HEADER: &str = "x-server-secret";
pub const MONITORING_KEY_HEADER: &str = "x-monitoring-key";

/// Header names that carry credentials and may only be set by an [`AuthStrategy`]
pub(crate) fn is_credential_header(name: &str) -> bool {
    name.eq_ignore_ascii_case(AUTHORIZATION.as_str())
        || [
            API_KEY_HEADER,
            API_SECRET_HEADER,
            SERVER_UUID_HEADER,
            SERVER_SECRET_HEADER,
            MONITORING_KEY_HEADER,
        ]
        .iter()
        .any(|header| name.eq_ignore_ascii_case(header))
}

/// The single authentication scheme attached to every request
#[derive(Clone, Default, PartialEq, Eq)]
pub enum AuthStrategy {
    /// JWT sent as `Authorization: Bearer <token>`
    Bearer(String),
    /// User API key pair
    ApiKey { key: String, secret: String },
    /// Agent identity of a monitored server
    ServerCredentials { uuid: String, secret: String },
    /// Organization-wide monitoring key
    MonitoringKey(String),
    /// No authentication; only public endpoints will succeed
    #[default]
    None,
}

impl AuthStrategy {
    /// Short label for logs. Never contains credential material.
    pub fn name(&self) -> &'static str {
        match self {
            AuthStrategy::Bearer(_) => "bearer",
            AuthStrategy::ApiKey { .. } => "api_key",
            AuthStrategy::ServerCredentials { .. } => "server_credentials",
            AuthStrategy::MonitoringKey(_) => "monitoring_key",
            AuthStrategy::None => "none",
        }
    }

    /// Insert this strategy's headers into `headers`
    ///
    /// Secret values are flagged sensitive so they are hidden from debug output.
    ///
    /// # Errors
    ///
    /// Returns [`NexmonyxError::InvalidHeader`] if a credential contains
    /// characters that are not allowed in an HTTP header value.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<()> {
        match self {
            AuthStrategy::Bearer(token) => {
                insert(headers, AUTHORIZATION, &format!("Bearer {token}"), true)?;
            }
            AuthStrategy::ApiKey { key, secret } => {
                insert(headers, HeaderName::from_static(API_KEY_HEADER), key, true)?;
                insert(
                    headers,
                    HeaderName::from_static(API_SECRET_HEADER),
                    secret,
                    true,
                )?;
            }
            AuthStrategy::ServerCredentials { uuid, secret } => {
                insert(
                    headers,
                    HeaderName::from_static(SERVER_UUID_HEADER),
                    uuid,
                    false,
                )?;
                insert(
                    headers,
                    HeaderName::from_static(SERVER_SECRET_HEADER),
                    secret,
                    true,
                )?;
            }
            AuthStrategy::MonitoringKey(key) => {
                insert(
                    headers,
                    HeaderName::from_static(MONITORING_KEY_HEADER),
                    key,
                    true,
                )?;
            }
            AuthStrategy::None => {}
        }
        Ok(())
    }
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStrategy::ServerCredentials { uuid, .. } => f
                .debug_struct("ServerCredentials")
                .field("uuid", uuid)
                .field("secret", &"[REDACTED]")
                .finish(),
            other => write!(f, "AuthStrategy({})", other.name()),
        }
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str, sensitive: bool) -> Result<()> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|_| NexmonyxError::InvalidHeader(format!("{name}: value is not valid")))?;
    value.set_sensitive(sensitive);
    headers.insert(name, value);
    Ok(())
}

/// Raw credential fields as a caller may populate them
///
/// Any combination may be set; [`resolve`](Credentials::resolve) picks one.
#[derive(Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub server_uuid: Option<String>,
    pub server_secret: Option<String>,
    pub monitoring_key: Option<String>,
}

impl Credentials {
    /// Pick the authentication strategy, first match wins:
    ///
    /// 1. bearer token
    /// 2. API key + secret
    /// 3. server UUID + secret
    /// 4. monitoring key
    ///
    /// Pairs only match when both halves are non-empty. Everything that
    /// does not win is dropped.
    pub fn resolve(self) -> AuthStrategy {
        let Credentials {
            token,
            api_key,
            api_secret,
            server_uuid,
            server_secret,
            monitoring_key,
        } = self;

        if let Some(token) = non_empty(token) {
            return AuthStrategy::Bearer(token);
        }
        if let (Some(key), Some(secret)) = (non_empty(api_key), non_empty(api_secret)) {
            return AuthStrategy::ApiKey { key, secret };
        }
        if let (Some(uuid), Some(secret)) = (non_empty(server_uuid), non_empty(server_secret)) {
            return AuthStrategy::ServerCredentials { uuid, secret };
        }
        if let Some(key) = non_empty(monitoring_key) {
            return AuthStrategy::MonitoringKey(key);
        }
        AuthStrategy::None
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_credentials() -> Credentials {
        Credentials {
            token: Some("jwt".to_string()),
            api_key: Some("key".to_string()),
            api_secret: Some("key-secret".to_string()),
            server_uuid: Some("uuid".to_string()),
            server_secret: Some("server-secret".to_string()),
            monitoring_key: Some("mon".to_string()),
        }
    }

    #[test]
    fn test_precedence_order() {
        let mut creds = all_credentials();
        assert_eq!(creds.clone().resolve(), AuthStrategy::Bearer("jwt".to_string()));

        creds.token = None;
        assert_eq!(
            creds.clone().resolve(),
            AuthStrategy::ApiKey {
                key: "key".to_string(),
                secret: "key-secret".to_string()
            }
        );

        creds.api_key = None;
        assert_eq!(
            creds.clone().resolve(),
            AuthStrategy::ServerCredentials {
                uuid: "uuid".to_string(),
                secret: "server-secret".to_string()
            }
        );

        creds.server_secret = None;
        assert_eq!(
            creds.clone().resolve(),
            AuthStrategy::MonitoringKey("mon".to_string())
        );

        creds.monitoring_key = Some(String::new());
        assert_eq!(creds.resolve(), AuthStrategy::None);
    }

    #[test]
    fn test_half_pair_is_ignored() {
        let creds = Credentials {
            api_key: Some("key".to_string()),
            server_uuid: Some("uuid".to_string()),
            server_secret: Some("secret".to_string()),
            ..Default::default()
        };
        assert_eq!(creds.resolve().name(), "server_credentials");
    }

    #[test]
    fn test_bearer_headers() {
        let mut headers = HeaderMap::new();
        AuthStrategy::Bearer("abc".to_string())
            .apply(&mut headers)
            .unwrap();

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }

    #[test]
    fn test_server_credentials_headers() {
        let mut headers = HeaderMap::new();
        AuthStrategy::ServerCredentials {
            uuid: "srv-1".to_string(),
            secret: "s3cret".to_string(),
        }
        .apply(&mut headers)
        .unwrap();

        assert_eq!(headers.get(SERVER_UUID_HEADER).unwrap(), "srv-1");
        assert_eq!(headers.get(SERVER_SECRET_HEADER).unwrap(), "s3cret");
        assert!(!headers.get(SERVER_UUID_HEADER).unwrap().is_sensitive());
        assert!(headers.get(SERVER_SECRET_HEADER).unwrap().is_sensitive());
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_none_adds_nothing() {
        let mut headers = HeaderMap::new();
        AuthStrategy::None.apply(&mut headers).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_invalid_header_value() {
        let mut headers = HeaderMap::new();
        let result = AuthStrategy::MonitoringKey("bad\nkey".to_string()).apply(&mut headers);
        assert!(matches!(result, Err(NexmonyxError::InvalidHeader(_))));
    }

    #[test]
    fn test_credential_header_names() {
        assert!(is_credential_header("Authorization"));
        assert!(is_credential_header("X-API-Key"));
        assert!(is_credential_header("x-server-uuid"));
        assert!(is_credential_header("X-Monitoring-Key"));
        assert!(!is_credential_header("X-Tenant"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let debug = format!(
            "{:?}",
            AuthStrategy::ApiKey {
                key: "key".to_string(),
                secret: "top-secret".to_string()
            }
        );
        assert!(!debug.contains("top-secret"));
    }
}

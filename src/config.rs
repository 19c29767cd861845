use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use url::Url;

use crate::auth::{is_credential_header, AuthStrategy, Credentials};
use crate::errors::{NexmonyxError, Result};
use crate::retry::RetryPolicy;

/// Production API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.nexmonyx.com";

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_USER_AGENT: &str = concat!("nexmonyx-api-rs/", env!("CARGO_PKG_VERSION"));

/// Immutable client configuration
///
/// Built with [`ClientConfig::builder`]. Exactly one [`AuthStrategy`] is
/// active; it is chosen when the configuration is built.
///
/// # Example
///
/// ```rust
/// use nexmonyx_api::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder()
///     .base_url("https://api.nexmonyx.com")
///     .timeout(Duration::from_secs(10))
///     .retry_count(5)
///     .api_key("key", "secret")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.auth().name(), "api_key");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: Url,
    timeout: Duration,
    retry: RetryPolicy,
    auth: AuthStrategy,
    headers: HeaderMap,
    user_agent: String,
    debug: bool,
}

impl ClientConfig {
    /// Start building a configuration from defaults
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Get the base API URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Timeout of a single attempt
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retry count and wait bounds
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The authentication strategy chosen at build time
    pub fn auth(&self) -> &AuthStrategy {
        &self.auth
    }

    /// Custom headers sent with every request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `User-Agent` sent with every request
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Whether request/response debug logging is enabled
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Copy of this configuration bound to a different authentication strategy
    ///
    /// The previous credentials are dropped entirely, so the copy never
    /// carries two credential sets.
    pub fn with_auth(&self, auth: AuthStrategy) -> ClientConfig {
        ClientConfig {
            auth,
            ..self.clone()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("Valid default URL"),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            auth: AuthStrategy::None,
            headers: HeaderMap::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            debug: false,
        }
    }
}

/// Builder for [`ClientConfig`]
///
/// Unset fields fall back to the defaults: production base URL, 30s
/// timeout, 3 retries waiting between 1s and 30s.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    retry_count: Option<u32>,
    retry_wait: Option<Duration>,
    retry_max_wait: Option<Duration>,
    credentials: Credentials,
    headers: Vec<(String, String)>,
    user_agent: Option<String>,
    debug: bool,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Retries after the first attempt
    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }

    /// Wait before the first retry
    pub fn retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = Some(wait);
        self
    }

    /// Upper bound for any wait between retries
    pub fn retry_max_wait(mut self, wait: Duration) -> Self {
        self.retry_max_wait = Some(wait);
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.credentials.token = Some(token.to_string());
        self
    }

    pub fn api_key(mut self, key: &str, secret: &str) -> Self {
        self.credentials.api_key = Some(key.to_string());
        self.credentials.api_secret = Some(secret.to_string());
        self
    }

    pub fn server_credentials(mut self, uuid: &str, secret: &str) -> Self {
        self.credentials.server_uuid = Some(uuid.to_string());
        self.credentials.server_secret = Some(secret.to_string());
        self
    }

    pub fn monitoring_key(mut self, key: &str) -> Self {
        self.credentials.monitoring_key = Some(key.to_string());
        self
    }

    /// Use a full set of raw credential fields
    ///
    /// Replaces anything set through the individual credential setters.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Add a custom header sent with every request
    ///
    /// Credential headers (`Authorization`, `X-API-Key`, ...) are rejected by
    /// [`build`](Self::build); use the credential setters instead.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = Some(user_agent.to_string());
        self
    }

    /// Log every request and response at debug level
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL or a custom header is malformed, or
    /// if a custom header would carry credentials.
    /// Missing credentials are not an error.
    pub fn build(self) -> Result<ClientConfig> {
        let defaults = ClientConfig::default();

        let base_url = match self.base_url {
            Some(url) => Url::parse(&url).map_err(NexmonyxError::InvalidBaseUrl)?,
            None => defaults.base_url,
        };

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers {
            if is_credential_header(&name) {
                return Err(NexmonyxError::InvalidHeader(format!(
                    "{name}: credentials must be set through the authentication strategy"
                )));
            }
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| NexmonyxError::InvalidHeader(format!("{name}: name is not valid")))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|_| NexmonyxError::InvalidHeader(format!("{name}: value is not valid")))?;
            headers.insert(header_name, header_value);
        }

        let retry = RetryPolicy {
            max_retries: self.retry_count.unwrap_or(defaults.retry.max_retries),
            wait_min: self.retry_wait.unwrap_or(defaults.retry.wait_min),
            wait_max: self.retry_max_wait.unwrap_or(defaults.retry.wait_max),
        };

        Ok(ClientConfig {
            base_url,
            timeout: self.timeout.unwrap_or(defaults.timeout),
            retry,
            auth: self.credentials.resolve(),
            headers,
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
            debug: self.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::builder().build().unwrap();

        assert_eq!(config.base_url().as_str(), "https://api.nexmonyx.com/");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_policy(), &RetryPolicy::default());
        assert_eq!(config.auth(), &AuthStrategy::None);
        assert!(config.headers().is_empty());
        assert!(config.user_agent().starts_with("nexmonyx-api-rs/"));
        assert!(!config.debug());
    }

    #[test]
    fn test_custom_values() {
        let config = ClientConfig::builder()
            .base_url("http://localhost:8080/api")
            .timeout(Duration::from_secs(5))
            .retry_count(1)
            .retry_wait(Duration::from_millis(100))
            .retry_max_wait(Duration::from_secs(2))
            .header("X-Tenant", "acme")
            .user_agent("agent/1.0")
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.base_url().path(), "/api");
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.retry_policy().max_retries, 1);
        assert_eq!(config.retry_policy().wait_min, Duration::from_millis(100));
        assert_eq!(config.retry_policy().wait_max, Duration::from_secs(2));
        assert_eq!(config.headers().get("x-tenant").unwrap(), "acme");
        assert_eq!(config.user_agent(), "agent/1.0");
        assert!(config.debug());
    }

    #[test]
    fn test_malformed_base_url() {
        let result = ClientConfig::builder().base_url("not a url").build();
        assert!(matches!(result, Err(NexmonyxError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_invalid_custom_header() {
        let result = ClientConfig::builder().header("bad header", "x").build();
        assert!(matches!(result, Err(NexmonyxError::InvalidHeader(_))));
    }

    #[test]
    fn test_credential_custom_header_rejected() {
        for name in ["X-API-Key", "authorization", "X-Server-Secret"] {
            let result = ClientConfig::builder()
                .token("jwt")
                .header(name, "smuggled")
                .build();
            assert!(
                matches!(result, Err(NexmonyxError::InvalidHeader(_))),
                "header {name}"
            );
        }
    }

    #[test]
    fn test_token_wins_over_server_credentials() {
        let config = ClientConfig::builder()
            .server_credentials("uuid", "secret")
            .token("jwt")
            .build()
            .unwrap();

        assert_eq!(config.auth(), &AuthStrategy::Bearer("jwt".to_string()));
    }

    #[test]
    fn test_with_auth_leaves_original_untouched() {
        let original = ClientConfig::builder().token("jwt").build().unwrap();
        let rotated = original.with_auth(AuthStrategy::MonitoringKey("mon".to_string()));

        assert_eq!(original.auth(), &AuthStrategy::Bearer("jwt".to_string()));
        assert_eq!(rotated.auth(), &AuthStrategy::MonitoringKey("mon".to_string()));
        assert_eq!(rotated.base_url(), original.base_url());
    }
}

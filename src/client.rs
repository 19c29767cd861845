use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, Method, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::auth::{is_credential_header, AuthStrategy};
use crate::classifier::classify;
use crate::config::ClientConfig;
use crate::errors::{is_retryable_transport, parse_retry_after, NexmonyxError, Result};
use crate::logging::DebugLogger;
use crate::retry::{RetryPolicy, RetrySchedule, RetryState};
use crate::types::{ApiResponse, RequestDescriptor, ResponseEnvelope};

/// Client for the Nexmonyx API
///
/// Every resource call goes through [`execute`](Self::execute), which
/// attaches credentials, retries transient failures and classifies errors.
/// The client is cheap to clone and safe to share between tasks; nothing in
/// it changes after construction.
///
/// # Example
///
/// ```rust,no_run
/// use nexmonyx_api::{ClientConfig, NexmonyxClient, RequestDescriptor};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Server {
///     server_uuid: String,
///     hostname: String,
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = NexmonyxClient::new(ClientConfig::builder().token("jwt").build()?)?;
///
///     let servers = client
///         .execute::<(), Vec<Server>>(RequestDescriptor::get("/v1/servers").query("limit", 25))
///         .await?
///         .into_data();
///
///     for server in servers {
///         println!("{} {}", server.server_uuid, server.hostname);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct NexmonyxClient {
    client: ClientWithMiddleware,
    config: Arc<ClientConfig>,
    headers: HeaderMap,
}

/// A descriptor with its URL resolved and body serialized, ready to be
/// sent as many times as the retry policy allows
struct PreparedRequest {
    method: Method,
    url: Url,
    query: BTreeMap<String, String>,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl NexmonyxClient {
    /// Create a new client
    ///
    /// When `config.debug()` is set, a [`DebugLogger`] middleware is installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a credential
    /// is not a valid header value.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(NexmonyxError::BuildHttpClient)?;

        let mut builder = ClientBuilder::new(client);
        if config.debug() {
            builder = builder.with(DebugLogger);
        }

        Self::from_parts(builder.build(), config)
    }

    /// Create a new client with a custom reqwest middleware client
    ///
    /// This allows you to add custom middleware (metrics, tracing, etc.).
    /// The configured timeout is not applied to a client built this way.
    /// When `config.debug()` is set, a [`DebugLogger`] is appended to the
    /// client's middleware chain.
    pub fn with_client(client: ClientWithMiddleware, config: ClientConfig) -> Result<Self> {
        let client = if config.debug() {
            ClientBuilder::from_client(client).with(DebugLogger).build()
        } else {
            client
        };
        Self::from_parts(client, config)
    }

    fn from_parts(client: ClientWithMiddleware, config: ClientConfig) -> Result<Self> {
        let headers = base_headers(&config)?;
        Ok(Self {
            client,
            config: Arc::new(config),
            headers,
        })
    }

    /// New client authenticating with a bearer token
    ///
    /// The original client keeps its credentials; the HTTP connection pool is shared.
    pub fn with_token(&self, token: &str) -> Result<Self> {
        self.with_auth(AuthStrategy::Bearer(token.to_string()))
    }

    /// New client authenticating with an API key pair
    pub fn with_api_key(&self, key: &str, secret: &str) -> Result<Self> {
        self.with_auth(AuthStrategy::ApiKey {
            key: key.to_string(),
            secret: secret.to_string(),
        })
    }

    /// New client authenticating as a monitored server (agent identity)
    pub fn with_server_credentials(&self, uuid: &str, secret: &str) -> Result<Self> {
        self.with_auth(AuthStrategy::ServerCredentials {
            uuid: uuid.to_string(),
            secret: secret.to_string(),
        })
    }

    /// New client authenticating with a monitoring key
    pub fn with_monitoring_key(&self, key: &str) -> Result<Self> {
        self.with_auth(AuthStrategy::MonitoringKey(key.to_string()))
    }

    fn with_auth(&self, auth: AuthStrategy) -> Result<Self> {
        debug!(strategy = auth.name(), "Deriving client with new credentials");
        Self::from_parts(self.client.clone(), self.config.with_auth(auth))
    }

    /// Configuration this client was built with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the base API URL
    pub fn base_url(&self) -> &Url {
        self.config.base_url()
    }

    /// Execute a request and decode the envelope's `data` as `T`
    ///
    /// # Errors
    ///
    /// - [`NexmonyxError::Api`] if the API answered with a non-2xx status
    ///   (after retries for 429 and 5xx)
    /// - [`NexmonyxError::Transport`] if no response was received
    /// - [`NexmonyxError::Decode`] if a successful response does not match `T`
    pub async fn execute<B, T>(&self, request: RequestDescriptor<B>) -> Result<ApiResponse<T>>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        self.execute_with_cancel(request, std::future::pending::<()>()).await
    }

    /// Execute a request, giving up as soon as `cancel` completes
    ///
    /// Cancellation interrupts both an in-flight attempt and a wait between
    /// retries, and yields [`NexmonyxError::Cancelled`].
    #[instrument(
        name = "NexmonyxClient::execute",
        skip_all,
        fields(method = %request.method, path = %request.path)
    )]
    pub async fn execute_with_cancel<B, T, C>(
        &self,
        request: RequestDescriptor<B>,
        cancel: C,
    ) -> Result<ApiResponse<T>>
    where
        B: Serialize,
        T: DeserializeOwned,
        C: Future<Output = ()>,
    {
        let prepared = self.prepare(request)?;

        tokio::select! {
            biased;
            _ = cancel => {
                debug!("Request cancelled by caller");
                Err(NexmonyxError::Cancelled)
            }
            result = self.run(&prepared) => result,
        }
    }

    /// GET `path` and return the decoded `data`
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        Ok(self.execute(RequestDescriptor::get(path)).await?.into_data())
    }

    /// POST `body` to `path` and return the decoded `data`
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        Ok(self
            .execute(RequestDescriptor::post(path).body(body))
            .await?
            .into_data())
    }

    /// PUT `body` to `path` and return the decoded `data`
    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        Ok(self
            .execute(RequestDescriptor::put(path).body(body))
            .await?
            .into_data())
    }

    /// DELETE `path`
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute::<(), serde_json::Value>(RequestDescriptor::delete(path))
            .await
            .map(|_| ())
    }

    fn prepare<B: Serialize>(&self, request: RequestDescriptor<B>) -> Result<PreparedRequest> {
        let url = build_url(self.config.base_url(), &request.path)?;

        let body = request
            .body
            .map(|body| serde_json::to_vec(&body))
            .transpose()
            .map_err(NexmonyxError::Serialize)?;

        let mut headers = self.headers.clone();
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        for (name, value) in request.headers.iter() {
            if is_credential_header(name.as_str()) {
                debug!(header = %name, "Dropping credential header; the auth strategy owns it");
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }

        Ok(PreparedRequest {
            method: request.method,
            url,
            query: request.query,
            headers,
            body,
        })
    }

    async fn send(&self, request: &PreparedRequest) -> reqwest_middleware::Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        builder.send().await
    }

    async fn run<T: DeserializeOwned>(&self, request: &PreparedRequest) -> Result<ApiResponse<T>> {
        let mut schedule = RetrySchedule::new(*self.config.retry_policy());

        loop {
            let (retryable, retry_after, error) = match self.send(request).await {
                Ok(response) if response.status().is_success() => {
                    let status = response.status();
                    match response.bytes().await {
                        Ok(body) => {
                            debug!(
                                status = status.as_u16(),
                                attempt = schedule.attempt(),
                                "Request succeeded"
                            );
                            schedule.record_success();
                            return ResponseEnvelope::parse(status, &body)?.into_response(status);
                        }
                        // Body cut short: as retryable as a failed send
                        Err(err) => {
                            let err = reqwest_middleware::Error::from(err);
                            (is_retryable_transport(&err), None, NexmonyxError::Transport(err))
                        }
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    let body = response.bytes().await.unwrap_or_default();

                    let retry_after = headers
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| parse_retry_after(v, Utc::now()));

                    (
                        RetryPolicy::is_retryable_status(status),
                        retry_after,
                        NexmonyxError::Api(classify(status, &headers, &body)),
                    )
                }
                Err(err) => (is_retryable_transport(&err), None, NexmonyxError::Transport(err)),
            };

            match schedule.record_failure(retryable, retry_after) {
                RetryState::Waiting { attempt, delay } => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    schedule.begin_attempt();
                }
                state => {
                    debug!(?state, error = %error, "Request failed");
                    return Err(error);
                }
            }
        }
    }
}

/// Headers sent with every request: content negotiation, user agent,
/// custom headers, then credentials
fn base_headers(config: &ClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(config.user_agent())
            .map_err(|_| NexmonyxError::InvalidHeader("user-agent: value is not valid".to_string()))?,
    );
    for (name, value) in config.headers() {
        headers.insert(name.clone(), value.clone());
    }
    config.auth().apply(&mut headers)?;
    Ok(headers)
}

/// Append `path` to the base URL, keeping any path prefix of the base
fn build_url(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|source| NexmonyxError::InvalidUrl {
        path: path.to_string(),
        source,
    })
}

impl std::fmt::Debug for NexmonyxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NexmonyxClient")
            .field("base_url", &self.config.base_url().as_str())
            .field("auth", &self.config.auth().name())
            .finish()
    }
}

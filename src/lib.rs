//! # Nexmonyx API
//!
//! Core HTTP client for the [Nexmonyx](https://nexmonyx.com) monitoring platform API.
//!
//! Every resource (servers, organizations, alerts, probes, metrics, ...) is
//! reached through the same [`NexmonyxClient::execute`] call, which:
//!
//! - Attaches exactly one set of credentials (bearer token, API key pair,
//!   server credentials or monitoring key)
//! - Retries network failures, rate limiting (429) and server errors (5xx)
//!   with exponential backoff
//! - Decodes the `{"status", "message", "data"}` envelope into a typed result
//! - Classifies failures into [`ApiError`] kinds callers can branch on
//!
//! ## Example
//!
//! ```rust,no_run
//! use nexmonyx_api::{ApiError, ClientConfig, NexmonyxClient, NexmonyxError};
//! use serde_json::Value;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.nexmonyx.com")
//!         .timeout(Duration::from_secs(10))
//!         .api_key("my-key", "my-secret")
//!         .build()?;
//!
//!     let client = NexmonyxClient::new(config)?;
//!
//!     match client.get::<Value>("/v1/servers/1234").await {
//!         Ok(server) => println!("{server}"),
//!         Err(NexmonyxError::Api(ApiError::NotFound { .. })) => println!("no such server"),
//!         Err(err) => return Err(err.into()),
//!     }
//!     Ok(())
//! }
//! ```

mod auth;
mod classifier;
mod client;
mod config;
mod errors;
mod logging;
mod retry;
mod types;

pub use auth::{
    AuthStrategy, Credentials, API_KEY_HEADER, API_SECRET_HEADER, MONITORING_KEY_HEADER,
    SERVER_SECRET_HEADER, SERVER_UUID_HEADER,
};
pub use classifier::{classify, REQUEST_ID_HEADER};
pub use client::NexmonyxClient;
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use errors::{ApiError, ApiErrorKind, NexmonyxError, Result};
pub use logging::{redact_headers, DebugLogger};
pub use retry::{RetryPolicy, RetrySchedule, RetryState};
pub use types::{ApiResponse, EnvelopeStatus, RequestDescriptor, ResponseEnvelope};

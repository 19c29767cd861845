use async_trait::async_trait;
use http::Extensions;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::time::Instant;
use tracing::debug;

use crate::auth::{API_KEY_HEADER, API_SECRET_HEADER, MONITORING_KEY_HEADER, SERVER_SECRET_HEADER};

const REDACTED: &str = "[REDACTED]";

/// Middleware that logs every attempt at debug level
///
/// Installed when [`ClientConfig::debug`](crate::ClientConfig::debug) is set.
/// Credentials are redacted. Events go to whatever `tracing` subscriber the
/// application installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugLogger;

#[async_trait]
impl Middleware for DebugLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        debug!(
            method = %req.method(),
            url = %req.url(),
            headers = ?redact_headers(req.headers()),
            has_body = req.body().is_some(),
            "Sending request"
        );

        let started = Instant::now();
        let result = next.run(req, extensions).await;

        match &result {
            Ok(response) => debug!(
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                headers = ?redact_headers(response.headers()),
                "Received response"
            ),
            Err(err) => debug!(
                error = %err,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request failed before a response was received"
            ),
        }

        result
    }
}

/// Header names and values with credentials replaced by `[REDACTED]`
pub fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if value.is_sensitive() || is_credential(name.as_str()) {
                REDACTED.to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

fn is_credential(name: &str) -> bool {
    name == AUTHORIZATION.as_str()
        || [
            API_KEY_HEADER,
            API_SECRET_HEADER,
            SERVER_SECRET_HEADER,
            MONITORING_KEY_HEADER,
        ]
        .contains(&name)
}

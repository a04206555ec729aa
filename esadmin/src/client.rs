//! HTTP client for the cluster's control-plane API
//!
//! Stateless between calls. Reads (GET) are retried on connection failures
//! and 502/503/504 with exponential backoff; mutations are sent exactly once.

use crate::config::ConnectionConfig;
use crate::error::{EngineError, Result, TransportError};
use crate::metrics::{record_retry, RequestTimer};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound for a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Control-plane client
#[derive(Clone)]
pub struct EsClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    backoff: Duration,
    username: Option<String>,
    password: Option<String>,
}

impl std::fmt::Debug for EsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsClient")
            .field("base_url", &self.base_url)
            .field("retries", &self.retries)
            .field("backoff", &self.backoff)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl EsClient {
    /// Create a client from connection settings
    pub fn new(config: &ConnectionConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout());

        if let Some(ref ca_path) = config.ca_cert_path {
            let pem = std::fs::read(ca_path).map_err(|e| {
                EngineError::Config(format!(
                    "Failed to read CA certificate {}: {}",
                    ca_path.display(),
                    e
                ))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        if config.skip_verify {
            warn!("TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url(),
            retries: config.retries,
            backoff: config.retry_backoff(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request and decode the JSON response.
    ///
    /// An empty response body decodes to `Value::Null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, TransportError> {
        let max_attempts = if method == Method::GET {
            self.retries + 1
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(&method, path, body).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && e.is_transient() => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{} {} failed (attempt {}/{}), retrying in {}ms: {}",
                        method,
                        path,
                        attempt,
                        max_attempts,
                        delay.as_millis(),
                        e
                    );
                    record_retry(method.as_str());
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get(&self, path: &str) -> std::result::Result<Value, TransportError> {
        self.request(Method::GET, path, None).await
    }

    /// GET and deserialize into a typed response
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> std::result::Result<T, TransportError> {
        let value = self.get(path).await?;
        serde_json::from_value(value).map_err(|e| TransportError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn put(
        &self,
        path: &str,
        body: &Value,
    ) -> std::result::Result<Value, TransportError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, TransportError> {
        self.request(Method::POST, path, body).await
    }

    pub async fn delete(&self, path: &str) -> std::result::Result<Value, TransportError> {
        self.request(Method::DELETE, path, None).await
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(6);
        (self.backoff * factor).min(MAX_BACKOFF)
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> std::result::Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let timer = RequestTimer::new(method.as_str());

        let mut request = self.http.request(method.clone(), &url);
        if let Some(ref username) = self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!("{} {}", method, url);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                timer.error("connection");
                return Err(TransportError::Connection {
                    url,
                    reason: e.to_string(),
                });
            }
        };

        let status = response.status();
        timer.finish(status.as_u16());

        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Connection {
                url: url.clone(),
                reason: format!("failed reading response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(TransportError::Http {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| TransportError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

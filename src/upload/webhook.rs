//! Webhook upload sink
//!
//! POSTs the decision document of a run to an HTTP endpoint.
//!
//! # Response Format
//!
//! A 2xx response with an empty body accepts every decision. A JSON body
//! narrows the acknowledgement:
//!
//! ```json
//! { "uploaded": ["1000123"], "deleted": ["1000001"] }
//! ```
//!
//! Decisions missing from the lists are retried on the next run.
//!
//! # Example
//!
//! ```rust,ignore
//! use publoader::upload::{WebhookConfig, WebhookSink};
//!
//! let config = WebhookConfig::new("https://uploader.example.com/dispatch")
//!     .with_auth_token("secret-token")
//!     .with_timeout(15)
//!     .with_max_retries(5);
//!
//! let sink = WebhookSink::new(config)?;
//! let report = sink.dispatch(&plan).await?;
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DispatchPayload, DispatchReport, UploadError, UploadResult, UploadSink};
use crate::reconciler::ReconcilePlan;

/// Webhook sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Webhook URL endpoint
    pub url: String,
    /// Optional authentication token (sent as Bearer token)
    pub auth_token: Option<String>,
    /// Custom headers to include in requests
    #[serde(default)]
    pub headers: std::collections::HashMap<String, String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum retry attempts on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

impl WebhookConfig {
    /// Create a new webhook configuration
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_token: None,
            headers: std::collections::HashMap::new(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }

    /// Set authentication token
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Add a custom header
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base backoff delay
    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Webhook URL cannot be empty".to_string());
        }

        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err("Webhook URL must start with http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Acknowledgement body returned by the endpoint
#[derive(Debug, Default, Deserialize)]
struct Acknowledgement {
    #[serde(default)]
    uploaded: Vec<String>,
    #[serde(default)]
    deleted: Vec<String>,
}

/// Sink that POSTs decision documents to a webhook
pub struct WebhookSink {
    config: WebhookConfig,
    client: Client,
}

impl WebhookSink {
    /// Create a new webhook sink
    pub fn new(config: WebhookConfig) -> UploadResult<Self> {
        config.validate().map_err(UploadError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Create a webhook sink with just a URL
    pub fn from_url(url: impl Into<String>) -> UploadResult<Self> {
        Self::new(WebhookConfig::new(url))
    }

    /// Get the webhook URL
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Send the payload with retry logic; returns the response body
    async fn send_with_retry(&self, payload: &DispatchPayload<'_>) -> UploadResult<String> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                // Exponential backoff: base, 2x base, 4x base...
                let delay = Duration::from_millis(self.config.backoff_ms << (attempt - 1).min(16));
                tokio::time::sleep(delay).await;
                tracing::debug!(
                    "Retrying dispatch webhook (attempt {}/{})",
                    attempt + 1,
                    self.config.max_retries + 1
                );
            }

            let mut request = self.client.post(&self.config.url);

            if let Some(token) = &self.config.auth_token {
                request = request.bearer_auth(token);
            }

            for (key, value) in &self.config.headers {
                request = request.header(key, value);
            }

            match request.json(payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        return Ok(body);
                    }

                    last_error = Some(UploadError::Rejected {
                        status: status.as_u16(),
                        body,
                    });

                    // Don't retry on client errors (4xx)
                    if status.is_client_error() {
                        break;
                    }
                }
                Err(e) => {
                    last_error = Some(UploadError::Http(e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| UploadError::InvalidResponse("no attempt made".into())))
    }
}

#[async_trait]
impl UploadSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn dispatch(&self, plan: &ReconcilePlan) -> UploadResult<DispatchReport> {
        if !plan.has_decisions() {
            return Ok(DispatchReport::default());
        }

        let payload = DispatchPayload::from_plan(plan);
        let body = self.send_with_retry(&payload).await.inspect_err(|e| {
            tracing::error!(
                extension = %plan.extension,
                url = %self.config.url,
                error = %e,
                "Dispatch webhook failed"
            );
        })?;

        if body.trim().is_empty() {
            return Ok(DispatchReport::acknowledge_all(plan));
        }

        let ack: Acknowledgement = serde_json::from_str(&body)
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;
        let report = DispatchReport::from_acknowledged(plan, ack.uploaded, ack.deleted);

        tracing::info!(
            extension = %plan.extension,
            uploaded = report.uploaded.len(),
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            "Dispatch acknowledged"
        );
        Ok(report)
    }
}

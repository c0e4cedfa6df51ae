//! Webhook delivery with exponential-backoff retry.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`Notification`] to an external
//! URL. Failed attempts are retried with backoff (1 s, 2 s, 4 s by default).

use std::time::Duration;

use crate::notify::Notification;

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// HTTP request timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// Delivers notifications to one webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: String,
    retry_delays: Vec<Duration>,
}

impl WebhookDelivery {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default webhook HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            url: url.into(),
            retry_delays: RETRY_DELAYS.to_vec(),
        }
    }

    /// Replace the backoff schedule. One attempt is made per delay plus a
    /// final attempt.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver a notification, retrying with backoff. Returns on the first
    /// successful attempt.
    pub async fn deliver(&self, notification: &Notification) -> Result<(), WebhookError> {
        for (attempt, delay) in self.retry_delays.iter().enumerate() {
            match self.try_send(notification).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        url = %self.url,
                        error = %e,
                        "Webhook delivery attempt failed, retrying",
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }

        self.try_send(notification).await.inspect_err(|e| {
            tracing::error!(
                url = %self.url,
                error = %e,
                "Webhook delivery failed after all retries"
            );
        })
    }

    async fn try_send(&self, notification: &Notification) -> Result<(), WebhookError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

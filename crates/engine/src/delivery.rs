//! Delivery provider seam.
//!
//! Telephony/messaging integration lives behind the CRM's internal
//! message-gateway service; the engine only distinguishes transient
//! failures (retried per the step's policy) from permanent ones (which
//! exhaust the step immediately).

use std::time::Duration;

use async_trait::async_trait;
use sendjoy_core::types::DbId;
use sendjoy_core::workflow::ActionKind;

/// HTTP request timeout for a single gateway call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Outcome classification for a failed delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// Retryable: network trouble, gateway overload, provider hiccup.
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Not retryable: the send can never succeed (bad number, rejected
    /// media). Exhausts the step's retry budget immediately.
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Sends a message or media action to a contact.
#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn send(
        &self,
        contact_id: DbId,
        action: ActionKind,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError>;
}

// ---------------------------------------------------------------------------
// GatewayDelivery
// ---------------------------------------------------------------------------

/// Production provider: POSTs sends to the message-gateway service.
///
/// Classification: connection/timeout errors and 5xx/429 responses are
/// transient; any other non-2xx response is permanent.
pub struct GatewayDelivery {
    client: reqwest::Client,
    base_url: String,
}

impl GatewayDelivery {
    /// Build a provider for the given gateway base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Build a provider from the `MESSAGE_GATEWAY_URL` environment variable.
    pub fn from_env() -> Self {
        let base_url = std::env::var("MESSAGE_GATEWAY_URL")
            .unwrap_or_else(|_| "http://localhost:4010".into());
        Self::new(base_url)
    }
}

#[async_trait]
impl DeliveryProvider for GatewayDelivery {
    async fn send(
        &self,
        contact_id: DbId,
        action: ActionKind,
        payload: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "contact_id": contact_id,
            "action": action,
            "payload": payload,
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("gateway request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let detail = format!("gateway returned HTTP {}", status.as_u16());
        if status.is_server_error() || status.as_u16() == 429 {
            Err(DeliveryError::Transient(detail))
        } else {
            Err(DeliveryError::Permanent(detail))
        }
    }
}

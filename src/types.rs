use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadFormat {
    #[default]
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "form-data")]
    FormData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub form_id: String,
    pub url: String,
    pub secret: String,
    pub enabled: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload_format: PayloadFormat,
    pub retries_enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Options accepted when registering a webhook. Unset values fall back to
/// JSON payloads with retries on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWebhook {
    pub url: String,
    pub secret: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub payload_format: Option<PayloadFormat>,
    #[serde(default)]
    pub retries_enabled: Option<bool>,
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookUpdate {
    pub url: Option<String>,
    pub secret: Option<String>,
    pub enabled: Option<bool>,
    pub headers: Option<HashMap<String, String>>,
    pub payload_format: Option<PayloadFormat>,
    pub retries_enabled: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Failed,
}

/// Final outcome of one webhook's attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub status: DeliveryStatus,
    /// 0 when no HTTP response was received (network error or timeout).
    pub response_code: u16,
    pub response_body: String,
    pub attempt_count: u32,
}

/// One row per (webhook, submission), written after the attempt sequence ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookLog {
    pub id: String,
    pub webhook_id: String,
    pub form_id: String,
    pub submission_id: String,
    pub status: DeliveryStatus,
    pub response_code: u16,
    pub response_body: String,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Wire body delivered to every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDeliveryPayload {
    pub form_id: String,
    pub response_id: String,
    pub data: serde_json::Map<String, serde_json::Value>,
}

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::multipart::Form;
use std::time::Duration;

use crate::config::DispatcherConfig;
use crate::signing::{sign_payload, SIGNATURE_HEADER};
use crate::types::{DeliveryResult, DeliveryStatus, PayloadFormat, Webhook, WebhookDeliveryPayload};

/// Waits out the backoff between attempts. Swapped out in tests to observe
/// the schedule without real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A single attempt that did not end in a 2xx.
struct AttemptFailure {
    /// 0 when no HTTP response arrived.
    response_code: u16,
    message: String,
}

impl AttemptFailure {
    fn transport(message: String) -> Self {
        Self {
            response_code: 0,
            message,
        }
    }

    fn is_client_error(&self) -> bool {
        (400..500).contains(&self.response_code)
    }
}

/// Deliver `payload` to one webhook, retrying with exponential backoff.
///
/// Attempts run strictly one after another. The sequence ends at the first
/// 2xx or once the attempt ceiling for this webhook is reached; every failure
/// is reported through the returned [`DeliveryResult`], never as an error.
pub async fn send_webhook(
    client: &reqwest::Client,
    config: &DispatcherConfig,
    sleeper: &dyn Sleeper,
    webhook: &Webhook,
    payload: &WebhookDeliveryPayload,
) -> DeliveryResult {
    let max_attempts = config.max_attempts(webhook.retries_enabled);
    let mut attempt = 1;

    loop {
        tracing::debug!(
            webhook_id = %webhook.id,
            url = %webhook.url,
            attempt,
            max_attempts,
            "sending webhook"
        );

        let failure = match attempt_delivery(client, config, webhook, payload).await {
            Ok(response_code) => {
                return DeliveryResult {
                    status: DeliveryStatus::Success,
                    response_code,
                    response_body: "OK".into(),
                    attempt_count: attempt,
                };
            }
            Err(failure) => failure,
        };

        tracing::warn!(
            webhook_id = %webhook.id,
            attempt,
            response_code = failure.response_code,
            "webhook attempt failed: {}",
            failure.message
        );

        let give_up = attempt >= max_attempts
            || (!config.retry_client_errors && failure.is_client_error());
        if give_up {
            return DeliveryResult {
                status: DeliveryStatus::Failed,
                response_code: failure.response_code,
                response_body: truncate_chars(&failure.message, config.response_body_limit),
                attempt_count: attempt,
            };
        }

        sleeper.sleep(config.backoff_after(attempt)).await;
        attempt += 1;
    }
}

async fn attempt_delivery(
    client: &reqwest::Client,
    config: &DispatcherConfig,
    webhook: &Webhook,
    payload: &WebhookDeliveryPayload,
) -> Result<u16, AttemptFailure> {
    let mut headers = HeaderMap::new();
    for (name, value) in &webhook.headers {
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            AttemptFailure::transport(format!("invalid header name {name:?}: {e}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            AttemptFailure::transport(format!("invalid header value for {name}: {e}"))
        })?;
        headers.insert(name, value);
    }
    let user_agent = HeaderValue::from_str(&config.user_agent)
        .map_err(|e| AttemptFailure::transport(format!("invalid user agent: {e}")))?;
    headers.insert(USER_AGENT, user_agent);

    let request = client
        .post(&webhook.url)
        .timeout(config.request_timeout());

    let request = match webhook.payload_format {
        PayloadFormat::Json => {
            let body = serde_json::to_vec(payload)
                .map_err(|e| AttemptFailure::transport(format!("failed to encode payload: {e}")))?;
            let signature = sign_payload(&webhook.secret, &body)
                .map_err(|e| AttemptFailure::transport(e.to_string()))?;
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            headers.insert(
                HeaderName::from_static("x-webhook-signature"),
                HeaderValue::from_str(&signature)
                    .map_err(|e| AttemptFailure::transport(format!("invalid {SIGNATURE_HEADER}: {e}")))?,
            );
            request.headers(headers).body(body)
        }
        // Multipart bodies go out unsigned.
        PayloadFormat::FormData => {
            let data = serde_json::to_string(&payload.data)
                .map_err(|e| AttemptFailure::transport(format!("failed to encode payload: {e}")))?;
            let form = Form::new()
                .text("form_id", payload.form_id.clone())
                .text("response_id", payload.response_id.clone())
                .text("data", data);
            request.headers(headers).multipart(form)
        }
    };

    let response = request
        .send()
        .await
        .map_err(|e| AttemptFailure::transport(describe_transport_error(&e, config)))?;

    let status = response.status();
    if status.is_success() {
        return Ok(status.as_u16());
    }

    let text = response.text().await.unwrap_or_default();
    Err(AttemptFailure {
        response_code: status.as_u16(),
        message: format!("HTTP {}: {text}", status.as_u16()),
    })
}

fn describe_transport_error(e: &reqwest::Error, config: &DispatcherConfig) -> String {
    if e.is_timeout() {
        format!("request timed out after {}ms", config.request_timeout_ms)
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

fn truncate_chars(s: &str, limit: usize) -> String {
    s.chars().take(limit).collect()
}

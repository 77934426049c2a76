use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::delivery::{send_webhook, Sleeper, TokioSleeper};
use crate::error::Result;
use crate::logic::FormData;
use crate::store::{WebhookConfigStore, WebhookLogStore};
use crate::types::{DeliveryResult, DeliveryStatus, Webhook, WebhookDeliveryPayload, WebhookLog};

#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub webhook_id: String,
    #[serde(flatten)]
    pub result: DeliveryResult,
}

/// Fans a stored submission out to every enabled webhook of its form.
pub struct Dispatcher {
    config: DispatcherConfig,
    config_store: Arc<dyn WebhookConfigStore>,
    log_store: Arc<dyn WebhookLogStore>,
    client: reqwest::Client,
    sleeper: Arc<dyn Sleeper>,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        config_store: Arc<dyn WebhookConfigStore>,
        log_store: Arc<dyn WebhookLogStore>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            config,
            config_store,
            log_store,
            client,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Deliver one submission to all enabled webhooks of `form_id` and write one
    /// log row per webhook once its attempts are exhausted.
    ///
    /// The webhook list is read once up front; config edits made while the
    /// deliveries run do not affect them. Only a failure to read that list is
    /// returned as an error.
    pub async fn dispatch(
        &self,
        form_id: &str,
        submission_id: &str,
        data: FormData,
    ) -> Result<Vec<DispatchOutcome>> {
        let webhooks = self.config_store.enabled_webhooks(form_id).await?;
        if webhooks.is_empty() {
            tracing::debug!(form_id = %form_id, "no webhooks to trigger");
            return Ok(Vec::new());
        }

        let payload = WebhookDeliveryPayload {
            form_id: form_id.to_string(),
            response_id: submission_id.to_string(),
            data,
        };

        let deliveries = webhooks
            .iter()
            .map(|webhook| self.deliver_and_log(webhook, &payload));
        Ok(join_all(deliveries).await)
    }

    async fn deliver_and_log(
        &self,
        webhook: &Webhook,
        payload: &WebhookDeliveryPayload,
    ) -> DispatchOutcome {
        let result = send_webhook(
            &self.client,
            &self.config,
            self.sleeper.as_ref(),
            webhook,
            payload,
        )
        .await;

        match result.status {
            DeliveryStatus::Success => tracing::info!(
                webhook_id = %webhook.id,
                form_id = %payload.form_id,
                attempts = result.attempt_count,
                "webhook delivered"
            ),
            DeliveryStatus::Failed => tracing::warn!(
                webhook_id = %webhook.id,
                form_id = %payload.form_id,
                attempts = result.attempt_count,
                response_code = result.response_code,
                "webhook delivery failed"
            ),
        }

        let log = WebhookLog {
            id: Uuid::new_v4().to_string(),
            webhook_id: webhook.id.clone(),
            form_id: payload.form_id.clone(),
            submission_id: payload.response_id.clone(),
            status: result.status,
            response_code: result.response_code,
            response_body: result.response_body.clone(),
            attempt_count: result.attempt_count,
            created_at: Utc::now(),
        };
        if let Err(e) = self.log_store.append_log(log).await {
            tracing::error!(webhook_id = %webhook.id, "failed to write webhook log: {e}");
        }

        DispatchOutcome {
            webhook_id: webhook.id.clone(),
            result,
        }
    }

    /// Run [`Dispatcher::dispatch`] on a background task. The caller gets the
    /// handle back immediately; outcomes and errors only reach the log.
    pub fn spawn_dispatch(
        self: &Arc<Self>,
        form_id: String,
        submission_id: String,
        data: FormData,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            match dispatcher.dispatch(&form_id, &submission_id, data).await {
                Ok(outcomes) => {
                    let failed = outcomes
                        .iter()
                        .filter(|o| o.result.status == DeliveryStatus::Failed)
                        .count();
                    tracing::info!(
                        form_id = %form_id,
                        submission_id = %submission_id,
                        webhooks = outcomes.len(),
                        failed,
                        "dispatch finished"
                    );
                }
                Err(e) => tracing::error!(
                    form_id = %form_id,
                    submission_id = %submission_id,
                    "dispatch failed: {e}"
                ),
            }
        })
    }
}

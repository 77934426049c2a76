use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{NewWebhook, Webhook, WebhookLog, WebhookUpdate};

/// Log rows retained per form. Appending past this drops the oldest row.
const MAX_LOGS_PER_FORM: usize = 1_000;
pub const DEFAULT_LOG_LIMIT: usize = 50;

/// Read side of webhook configuration, as seen by the dispatcher.
#[async_trait]
pub trait WebhookConfigStore: Send + Sync {
    async fn enabled_webhooks(&self, form_id: &str) -> Result<Vec<Webhook>>;
}

/// Append-only sink for delivery outcomes.
#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    async fn append_log(&self, log: WebhookLog) -> Result<()>;
}

#[derive(Default)]
struct Inner {
    webhooks: HashMap<String, Webhook>,
    logs: HashMap<String, VecDeque<WebhookLog>>,
}

/// Webhooks and logs persisted as JSON under a data directory:
/// `webhooks.json` plus `logs/<form_id>.json`.
///
/// Every mutation is rolled back in memory when its file write fails, so the
/// in-memory view never runs ahead of what is on disk. Logs only ever grow
/// by appending, but each form keeps just its newest `MAX_LOGS_PER_FORM` rows.
pub struct JsonFileStore {
    data_dir: PathBuf,
    inner: RwLock<Inner>,
}

impl JsonFileStore {
    /// Open the store, loading whatever is already on disk.
    pub async fn open(data_dir: PathBuf) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir.join("logs")).await?;

        let mut inner = Inner::default();
        let webhooks_path = data_dir.join("webhooks.json");
        if webhooks_path.exists() {
            let content = tokio::fs::read_to_string(&webhooks_path).await?;
            let items: Vec<Webhook> = serde_json::from_str(&content)
                .map_err(|e| Error::Store(format!("failed to parse webhooks.json: {e}")))?;
            for wh in items {
                inner.webhooks.insert(wh.id.clone(), wh);
            }
        }

        let mut entries = tokio::fs::read_dir(data_dir.join("logs")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(form_id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
            else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Vec<WebhookLog>>(&content) {
                Ok(items) => {
                    inner.logs.insert(form_id, VecDeque::from(items));
                }
                Err(e) => tracing::warn!(form_id = %form_id, "skipping unreadable log file: {e}"),
            }
        }

        Ok(Self {
            data_dir,
            inner: RwLock::new(inner),
        })
    }

    async fn save_webhooks(&self, inner: &Inner) -> Result<()> {
        let mut items: Vec<&Webhook> = inner.webhooks.values().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        let content = serde_json::to_string_pretty(&items)?;
        tokio::fs::write(self.data_dir.join("webhooks.json"), content).await?;
        Ok(())
    }

    async fn save_logs(&self, inner: &Inner, form_id: &str) -> Result<()> {
        let path = self.data_dir.join("logs").join(format!("{form_id}.json"));
        let empty = VecDeque::new();
        let logs = inner.logs.get(form_id).unwrap_or(&empty);
        let content = serde_json::to_string_pretty(logs)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn create_webhook(&self, form_id: &str, new: NewWebhook) -> Result<Webhook> {
        validate_form_id(form_id)?;
        validate_url(&new.url)?;

        let wh = Webhook {
            id: Uuid::new_v4().to_string(),
            form_id: form_id.to_string(),
            url: new.url,
            secret: new.secret,
            enabled: true,
            headers: new.headers,
            payload_format: new.payload_format.unwrap_or_default(),
            retries_enabled: new.retries_enabled.unwrap_or(true),
            created_at: Utc::now(),
        };

        let mut inner = self.inner.write().await;
        inner.webhooks.insert(wh.id.clone(), wh.clone());
        if let Err(e) = self.save_webhooks(&inner).await {
            inner.webhooks.remove(&wh.id);
            return Err(e);
        }
        tracing::info!(webhook_id = %wh.id, form_id = %form_id, "webhook created");
        Ok(wh)
    }

    pub async fn update_webhook(&self, id: &str, update: WebhookUpdate) -> Result<Webhook> {
        if let Some(url) = &update.url {
            validate_url(url)?;
        }

        let mut inner = self.inner.write().await;
        let wh = inner
            .webhooks
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let previous = wh.clone();
        if let Some(v) = update.url {
            wh.url = v;
        }
        if let Some(v) = update.secret {
            wh.secret = v;
        }
        if let Some(v) = update.enabled {
            wh.enabled = v;
        }
        if let Some(v) = update.headers {
            wh.headers = v;
        }
        if let Some(v) = update.payload_format {
            wh.payload_format = v;
        }
        if let Some(v) = update.retries_enabled {
            wh.retries_enabled = v;
        }
        let updated = wh.clone();
        if let Err(e) = self.save_webhooks(&inner).await {
            inner.webhooks.insert(previous.id.clone(), previous);
            return Err(e);
        }
        Ok(updated)
    }

    pub async fn delete_webhook(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(removed) = inner.webhooks.remove(id) else {
            return Err(Error::NotFound(id.to_string()));
        };
        if let Err(e) = self.save_webhooks(&inner).await {
            inner.webhooks.insert(removed.id.clone(), removed);
            return Err(e);
        }
        Ok(())
    }

    pub async fn get_webhook(&self, id: &str) -> Option<Webhook> {
        self.inner.read().await.webhooks.get(id).cloned()
    }

    /// All webhooks of a form, newest first.
    pub async fn list_webhooks(&self, form_id: &str) -> Vec<Webhook> {
        let inner = self.inner.read().await;
        let mut items: Vec<Webhook> = inner
            .webhooks
            .values()
            .filter(|w| w.form_id == form_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items
    }

    /// Most recent delivery logs of a form, newest first.
    pub async fn webhook_logs(&self, form_id: &str, limit: usize) -> Vec<WebhookLog> {
        self.inner
            .read()
            .await
            .logs
            .get(form_id)
            .map(|q| q.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl WebhookConfigStore for JsonFileStore {
    async fn enabled_webhooks(&self, form_id: &str) -> Result<Vec<Webhook>> {
        let mut items: Vec<Webhook> = self
            .list_webhooks(form_id)
            .await
            .into_iter()
            .filter(|w| w.enabled)
            .collect();
        items.reverse();
        Ok(items)
    }
}

#[async_trait]
impl WebhookLogStore for JsonFileStore {
    async fn append_log(&self, log: WebhookLog) -> Result<()> {
        validate_form_id(&log.form_id)?;
        let form_id = log.form_id.clone();

        let mut inner = self.inner.write().await;
        let queue = inner.logs.entry(form_id.clone()).or_default();
        let evicted = if queue.len() >= MAX_LOGS_PER_FORM {
            queue.pop_front()
        } else {
            None
        };
        queue.push_back(log);

        if let Err(e) = self.save_logs(&inner, &form_id).await {
            if let Some(queue) = inner.logs.get_mut(&form_id) {
                queue.pop_back();
                if let Some(row) = evicted {
                    queue.push_front(row);
                }
                if queue.is_empty() {
                    inner.logs.remove(&form_id);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Form ids double as log file names.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_form_id(form_id: &str) -> Result<()> {
    if is_safe_id(form_id) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid form id: {form_id:?}")))
    }
}

fn validate_url(url: &str) -> Result<()> {
    match reqwest::Url::parse(url) {
        Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Ok(()),
        Ok(u) => Err(Error::Validation(format!("unsupported URL scheme: {}", u.scheme()))),
        Err(e) => Err(Error::Validation(format!("invalid URL {url:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeliveryStatus, PayloadFormat};

    fn new_hook(url: &str) -> NewWebhook {
        NewWebhook {
            url: url.into(),
            secret: "s3cret".into(),
            ..Default::default()
        }
    }

    fn log_for(webhook_id: &str, form_id: &str, submission_id: &str) -> WebhookLog {
        WebhookLog {
            id: Uuid::new_v4().to_string(),
            webhook_id: webhook_id.into(),
            form_id: form_id.into(),
            submission_id: submission_id.into(),
            status: DeliveryStatus::Success,
            response_code: 200,
            response_body: "OK".into(),
            attempt_count: 1,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();

        let wh = store.create_webhook("form-1", new_hook("https://example.com/hook")).await.unwrap();
        assert!(wh.enabled);
        assert!(wh.retries_enabled);
        assert_eq!(wh.payload_format, PayloadFormat::Json);
        assert_eq!(store.get_webhook(&wh.id).await.unwrap().url, "https://example.com/hook");
    }

    #[tokio::test]
    async fn rejects_bad_urls_and_form_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();

        assert!(matches!(
            store.create_webhook("form-1", new_hook("ftp://example.com")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.create_webhook("form-1", new_hook("not a url")).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            store.create_webhook("../etc", new_hook("https://example.com")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn enabled_webhooks_filters_disabled_and_other_forms() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();

        let a = store.create_webhook("form-1", new_hook("https://a.example")).await.unwrap();
        let b = store.create_webhook("form-1", new_hook("https://b.example")).await.unwrap();
        store.create_webhook("form-2", new_hook("https://c.example")).await.unwrap();
        store
            .update_webhook(&b.id, WebhookUpdate { enabled: Some(false), ..Default::default() })
            .await
            .unwrap();

        let enabled = store.enabled_webhooks("form-1").await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, a.id);
        assert!(store.enabled_webhooks("form-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();

        assert!(matches!(
            store.update_webhook("nope", WebhookUpdate::default()).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(store.delete_webhook("nope").await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let wh = {
            let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();
            let wh = store.create_webhook("form-1", new_hook("https://a.example")).await.unwrap();
            store.append_log(log_for(&wh.id, "form-1", "sub-1")).await.unwrap();
            wh
        };

        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(store.list_webhooks("form-1").await.len(), 1);
        let logs = store.webhook_logs("form-1", DEFAULT_LOG_LIMIT).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].webhook_id, wh.id);
    }

    #[tokio::test]
    async fn failed_webhook_writes_leave_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();
        let kept = store.create_webhook("form-1", new_hook("https://a.example")).await.unwrap();

        // A directory where the file should be makes every write fail.
        let path = dir.path().join("webhooks.json");
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.create_webhook("form-1", new_hook("https://b.example")).await.is_err());
        let enabled = store.enabled_webhooks("form-1").await.unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, kept.id);

        let disable = WebhookUpdate {
            enabled: Some(false),
            url: Some("https://c.example".into()),
            ..Default::default()
        };
        assert!(store.update_webhook(&kept.id, disable).await.is_err());
        let current = store.get_webhook(&kept.id).await.unwrap();
        assert!(current.enabled);
        assert_eq!(current.url, "https://a.example");

        assert!(store.delete_webhook(&kept.id).await.is_err());
        assert!(store.get_webhook(&kept.id).await.is_some());
    }

    #[tokio::test]
    async fn failed_log_write_is_not_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();
        store.append_log(log_for("wh", "form-1", "sub-0")).await.unwrap();

        let path = dir.path().join("logs").join("form-1.json");
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        assert!(store.append_log(log_for("wh", "form-1", "sub-1")).await.is_err());
        assert!(store.append_log(log_for("wh", "form-2", "sub-2")).await.is_ok());

        let logs = store.webhook_logs("form-1", DEFAULT_LOG_LIMIT).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].submission_id, "sub-0");
    }

    #[tokio::test]
    async fn logs_keep_only_the_newest_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();

        for i in 0..MAX_LOGS_PER_FORM + 2 {
            store.append_log(log_for("wh", "form-1", &format!("sub-{i}"))).await.unwrap();
        }
        let logs = store.webhook_logs("form-1", usize::MAX).await;
        assert_eq!(logs.len(), MAX_LOGS_PER_FORM);
        assert_eq!(logs[0].submission_id, format!("sub-{}", MAX_LOGS_PER_FORM + 1));
        assert_eq!(logs[MAX_LOGS_PER_FORM - 1].submission_id, "sub-2");
    }

    #[tokio::test]
    async fn logs_are_newest_first_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().to_path_buf()).await.unwrap();

        for i in 0..5 {
            store.append_log(log_for("wh", "form-1", &format!("sub-{i}"))).await.unwrap();
        }
        let logs = store.webhook_logs("form-1", 2).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].submission_id, "sub-4");
        assert_eq!(logs[1].submission_id, "sub-3");
    }
}

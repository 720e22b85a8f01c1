//! Chat-webhook transport: posts a JSON payload to up to two configured
//! URLs, filtered by minimum severity and deduplicated per
//! `(severity, title)` inside a rolling window.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::{Alert, AlertService, AlertSeverity};
use crate::error::AlertError;
use async_trait::async_trait;

pub struct WebhookAlertService {
    client: reqwest::Client,
    webhook_urls: Vec<String>,
    min_severity: AlertSeverity,
    dedup_window: Duration,
    last_sent: RwLock<HashMap<(AlertSeverity, String), Instant>>,
}

impl WebhookAlertService {
    pub fn new(webhook_urls: Vec<String>, min_severity: AlertSeverity, dedup_window: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_urls,
            min_severity,
            dedup_window,
            last_sent: RwLock::new(HashMap::new()),
        }
    }

    fn should_dedup(&self, alert: &Alert) -> bool {
        let key = (alert.severity, alert.title.clone());
        let now = Instant::now();
        let mut last_sent = self.last_sent.write();
        if let Some(sent_at) = last_sent.get(&key) {
            if now.duration_since(*sent_at) < self.dedup_window {
                return true;
            }
        }
        last_sent.insert(key, now);
        false
    }
}

#[async_trait]
impl AlertService for WebhookAlertService {
    async fn notify(&self, alert: Alert) -> Result<(), AlertError> {
        if alert.severity < self.min_severity {
            tracing::debug!(severity = %alert.severity, title = %alert.title, "alert below min severity, dropped");
            return Ok(());
        }
        if self.should_dedup(&alert) {
            tracing::debug!(severity = %alert.severity, title = %alert.title, "alert deduplicated within window");
            return Ok(());
        }

        tracing::warn!(severity = %alert.severity, title = %alert.title, message = %alert.message, "dispatching alert");

        for url in &self.webhook_urls {
            let response = self
                .client
                .post(url)
                .json(&serde_json::json!({
                    "severity": alert.severity,
                    "title": alert.title,
                    "message": alert.message,
                    "details": alert.details,
                }))
                .send()
                .await
                .map_err(|e| AlertError::Transport(e.to_string()))?;
            if !response.status().is_success() {
                return Err(AlertError::Status(response.status().as_u16()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_suppresses_within_window() {
        let service = WebhookAlertService::new(vec![], AlertSeverity::Info, Duration::from_secs(60));
        let alert = Alert::new(AlertSeverity::Critical, "Scheduler Stopped", "shutdown");
        assert!(!service.should_dedup(&alert));
        assert!(service.should_dedup(&alert));
    }

    #[test]
    fn distinct_titles_are_not_deduplicated() {
        let service = WebhookAlertService::new(vec![], AlertSeverity::Info, Duration::from_secs(60));
        assert!(!service.should_dedup(&Alert::new(AlertSeverity::Warning, "A", "m")));
        assert!(!service.should_dedup(&Alert::new(AlertSeverity::Warning, "B", "m")));
    }
}

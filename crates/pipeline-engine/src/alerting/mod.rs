//! Outbound alerting (§6). Severity-filtered, rate-limited per
//! `(severity, title)` pair, dispatched over up to two configured chat
//! webhooks. Grounded on the original prototype's `monitoring/alert_service.py`
//! (`AlertSeverity`, dedup-by-key bookkeeping), adapted to the teacher's
//! `parking_lot::RwLock<HashMap<..., Instant>>` error-history pattern
//! (`error_handler/mod.rs`).

pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AlertError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Error => "error",
            AlertSeverity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl Alert {
    pub fn new(severity: AlertSeverity, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity, title: title.into(), message: message.into(), details: serde_json::Value::Null }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// The five alert types enumerated in §6, as constructors rather than a
/// closed enum, since the webhook transport only ever needs the
/// rendered [`Alert`].
pub mod kinds {
    use super::{Alert, AlertSeverity};

    pub fn high_error_rate(agent: &str, rate: f64, threshold: f64) -> Alert {
        Alert::new(
            AlertSeverity::Warning,
            "High Error Rate",
            format!("agent \"{agent}\" error rate {rate:.2} exceeds threshold {threshold:.2}"),
        )
    }

    pub fn scheduler_stopped(reason: &str) -> Alert {
        Alert::new(AlertSeverity::Critical, "Scheduler Stopped", reason.to_string())
    }

    pub fn agent_unhealthy(agent: &str) -> Alert {
        Alert::new(AlertSeverity::Warning, "Agent Unhealthy", format!("agent \"{agent}\" is unhealthy"))
    }

    pub fn persistence_error(agent: &str, detail: &str) -> Alert {
        Alert::new(AlertSeverity::Error, "Persistence Error", format!("agent \"{agent}\": {detail}"))
    }

    pub fn upstream_rate_limited(source: &str) -> Alert {
        Alert::new(AlertSeverity::Warning, "Upstream Rate Limit Reached", format!("source \"{source}\" signalled a rate limit"))
    }
}

/// The alert transport every agent and the Engine depend on. Severity
/// filtering and per-`(severity, title)` dedup are the transport's
/// responsibility, not the caller's, so every call site can fire alerts
/// unconditionally without tracking state of its own.
#[async_trait]
pub trait AlertService: Send + Sync {
    async fn notify(&self, alert: Alert) -> Result<(), AlertError>;
}

/// Never sends anything; used by tests and by `Once`/`Status` CLI runs
/// that don't want to touch the network.
pub struct NullAlertService;

#[async_trait]
impl AlertService for NullAlertService {
    async fn notify(&self, alert: Alert) -> Result<(), AlertError> {
        tracing::debug!(severity = %alert.severity, title = %alert.title, "alert suppressed (null alert service)");
        Ok(())
    }
}

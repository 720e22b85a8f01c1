//! The scheduler/lifecycle component: owns the agent set, dispatches each
//! on its own periodic loop, tracks per-agent metrics, and coordinates
//! graceful shutdown. Grounded on `DefaultAgentScheduler`'s
//! `shutdown_notify`/`is_running` pair and its paired scheduler/health-check
//! background loops (`scheduler/mod.rs`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agents::{Agent, AgentRunReport};
use crate::alerting::{kinds, AlertService};
use crate::config::AgentSchedule;
use crate::error::SchedulerError;

/// Live counters for one agent, refreshed after every `process()` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentMetrics {
    pub processed: u64,
    pub errors: u64,
    pub last_duration_ms: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}

impl AgentMetrics {
    fn error_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.errors as f64 / self.processed as f64
        }
    }
}

struct AgentEntry {
    agent: Arc<dyn Agent>,
    schedule: AgentSchedule,
}

/// Owns the agent set, the cancellation signal, and per-agent metrics.
/// `start()` spawns one loop per enabled agent plus a background
/// health-check loop; `stop()` is cooperative and bounded by a timeout.
pub struct Engine {
    entries: Vec<AgentEntry>,
    metrics: Arc<DashMap<String, AgentMetrics>>,
    shutdown_notify: Arc<Notify>,
    is_running: Arc<AtomicBool>,
    alert_service: Arc<dyn AlertService>,
    health_check_interval: Duration,
    error_rate_threshold: f64,
    shutdown_timeout: Duration,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancellation: CancellationToken,
}

impl Engine {
    /// `cancellation` should be the same token handed to every source
    /// adapter's and LLM transport's [`crate::resilience::ResilienceHandles`]
    /// (typically via `build_resilience`), so `stop()` cancelling it
    /// interrupts in-flight HTTP calls too, not just the scheduler loops.
    pub fn new(
        entries: Vec<(Arc<dyn Agent>, AgentSchedule)>,
        alert_service: Arc<dyn AlertService>,
        health_check_interval: Duration,
        error_rate_threshold: f64,
        shutdown_timeout: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        let metrics = Arc::new(DashMap::new());
        let entries: Vec<AgentEntry> = entries
            .into_iter()
            .map(|(agent, schedule)| {
                metrics.insert(agent.name().to_string(), AgentMetrics::default());
                AgentEntry { agent, schedule }
            })
            .collect();

        Self {
            entries,
            metrics,
            shutdown_notify: Arc::new(Notify::new()),
            is_running: Arc::new(AtomicBool::new(false)),
            alert_service,
            health_check_interval,
            error_rate_threshold,
            shutdown_timeout,
            handles: Mutex::new(Vec::new()),
            cancellation,
        }
    }

    pub fn metrics(&self) -> Arc<DashMap<String, AgentMetrics>> {
        self.metrics.clone()
    }

    /// Spawns one periodic loop per enabled agent plus the health-check
    /// loop. Returns immediately; loops run in the background until
    /// `stop()` is called.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let mut handles = self.handles.lock();
        for entry in &self.entries {
            if !entry.schedule.enabled {
                tracing::info!(agent = entry.agent.name(), "agent disabled, not scheduled");
                continue;
            }
            handles.push(self.spawn_agent_loop(entry));
        }
        handles.push(self.spawn_health_check_loop());
        Ok(())
    }

    fn spawn_agent_loop(&self, entry: &AgentEntry) -> JoinHandle<()> {
        let agent = entry.agent.clone();
        let interval_duration = entry.schedule.interval;
        let metrics = self.metrics.clone();
        let shutdown_notify = self.shutdown_notify.clone();
        let is_running = self.is_running.clone();
        let name = agent.name();

        tokio::spawn(async move {
            tracing::info!(agent = name, interval_s = interval_duration.as_secs(), "agent loop started");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval_duration) => {
                        if !is_running.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    _ = shutdown_notify.notified() => {
                        break;
                    }
                }
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
                tokio::select! {
                    _ = run_and_record(agent.as_ref(), &metrics) => {}
                    _ = shutdown_notify.notified() => {
                        tracing::info!(agent = name, "shutdown signalled mid-run, abandoning current iteration");
                        break;
                    }
                }
            }
            agent.cleanup().await;
            tracing::info!(agent = name, "agent loop stopped");
        })
    }

    fn spawn_health_check_loop(&self) -> JoinHandle<()> {
        let metrics = self.metrics.clone();
        let shutdown_notify = self.shutdown_notify.clone();
        let is_running = self.is_running.clone();
        let alert_service = self.alert_service.clone();
        let interval_duration = self.health_check_interval;
        let threshold = self.error_rate_threshold;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval_duration) => {
                        if !is_running.load(Ordering::SeqCst) {
                            break;
                        }
                    }
                    _ = shutdown_notify.notified() => {
                        break;
                    }
                }
                if !is_running.load(Ordering::SeqCst) {
                    break;
                }
                for entry in metrics.iter() {
                    let (name, m) = (entry.key().clone(), entry.value().clone());
                    let rate = m.error_rate();
                    if m.processed > 0 && rate > threshold {
                        let _ = alert_service.notify(kinds::high_error_rate(&name, rate, threshold)).await;
                    }
                    if m.consecutive_errors >= 3 {
                        let _ = alert_service.notify(kinds::agent_unhealthy(&name)).await;
                    }
                }
            }
        })
    }

    /// Flips the cancellation signal, notifies every waiter, cancels the
    /// shared HTTP cancellation token (interrupting any in-flight source/LLM
    /// call), awaits each agent loop's cleanup under a bounded timeout, and
    /// dispatches a critical alert if `reason` is given. A loop that is
    /// still not finished once the timeout elapses is forcibly aborted
    /// rather than left to run unattended in the background.
    pub async fn stop(&self, reason: Option<&str>) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("stopping engine");
        self.shutdown_notify.notify_waiters();
        self.cancellation.cancel();

        if let Some(reason) = reason {
            let _ = self.alert_service.notify(kinds::scheduler_stopped(reason)).await;
        }

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut self.handles.lock());
        for handle in handles {
            let abort_handle = handle.abort_handle();
            if tokio::time::timeout(self.shutdown_timeout, handle).await.is_err() {
                tracing::warn!("agent loop did not finish within shutdown timeout, aborting");
                abort_handle.abort();
            }
        }
        tracing::info!("engine stopped");
    }

    /// Runs `Process()` once for the named agent, or every enabled agent
    /// if `name` is `None`, bypassing the periodic loop entirely.
    pub async fn run_once(&self, name: Option<&str>) -> Result<HashMap<String, AgentRunReport>, SchedulerError> {
        let mut results = HashMap::new();
        match name {
            Some(name) => {
                let entry = self
                    .entries
                    .iter()
                    .find(|e| e.agent.name() == name)
                    .ok_or_else(|| SchedulerError::AgentNotFound(name.to_string()))?;
                let report = run_and_record(entry.agent.as_ref(), &self.metrics).await;
                results.insert(entry.agent.name().to_string(), report);
            }
            None => {
                for entry in &self.entries {
                    if !entry.schedule.enabled {
                        continue;
                    }
                    let report = run_and_record(entry.agent.as_ref(), &self.metrics).await;
                    results.insert(entry.agent.name().to_string(), report);
                }
            }
        }
        Ok(results)
    }
}

/// Invokes `agent.process()`, updates its metrics entry, and logs a span
/// closing with `processed`/`errors`/`duration_ms`. An `Err` here means
/// whole-batch setup failed, not a per-record failure; it still counts
/// as one error toward the consecutive-error counter.
async fn run_and_record(agent: &dyn Agent, metrics: &DashMap<String, AgentMetrics>) -> AgentRunReport {
    let name = agent.name();
    let span = tracing::info_span!("agent_run", agent = name);
    let _guard = span.enter();
    let started = std::time::Instant::now();

    let report = match agent.process().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(agent = name, error = %e, "agent batch setup failed");
            AgentRunReport::new(0, 1)
        }
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    if let Some(mut entry) = metrics.get_mut(name) {
        entry.processed += report.processed;
        entry.errors += report.errors;
        entry.last_duration_ms = duration_ms;
        entry.last_run = Some(Utc::now());
        entry.consecutive_errors = if report.errors > 0 { entry.consecutive_errors + 1 } else { 0 };
    }

    tracing::info!(agent = name, processed = report.processed, errors = report.errors, duration_ms, "agent run complete");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::NullAlertService;
    use crate::error::PipelineError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    struct CountingAgent {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Agent for CountingAgent {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn process(&self) -> Result<AgentRunReport, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AgentRunReport::new(1, 0))
        }
    }

    #[tokio::test]
    async fn run_once_invokes_named_agent_exactly_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let agent: Arc<dyn Agent> = Arc::new(CountingAgent { calls: calls.clone() });
        let schedule = AgentSchedule { interval: Duration::from_secs(3600), batch_size: 1, enabled: true };
        let engine = Engine::new(
            vec![(agent, schedule)],
            Arc::new(NullAlertService),
            Duration::from_secs(3600),
            0.5,
            Duration::from_secs(1),
            CancellationToken::new(),
        );

        let results = engine.run_once(Some("counting")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results["counting"].processed, 1);
    }

    #[tokio::test]
    async fn run_once_unknown_agent_errors() {
        let engine = Engine::new(
            vec![],
            Arc::new(NullAlertService),
            Duration::from_secs(3600),
            0.5,
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        let result = engine.run_once(Some("nope")).await;
        assert!(matches!(result, Err(SchedulerError::AgentNotFound(_))));
    }

    #[tokio::test]
    async fn stop_before_start_is_a_noop() {
        let engine = Engine::new(
            vec![],
            Arc::new(NullAlertService),
            Duration::from_secs(3600),
            0.5,
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        engine.stop(None).await;
    }
}

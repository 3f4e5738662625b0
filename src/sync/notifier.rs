//! UI refresh notifications.
//!
//! Notifications are best-effort: [`RefreshNotifier::notify`] never blocks and never fails.
//! The coalescing notifier keeps at most one pending refresh per employee and delivers
//! them from a background task.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::RefreshConfig;

/// Fire-and-forget "this employee's view changed" signal.
pub trait RefreshNotifier: Send + Sync + fmt::Debug {
    fn notify(&self, employee_id: Uuid);
}

/// Drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl RefreshNotifier for NoopNotifier {
    fn notify(&self, _employee_id: Uuid) {}
}

/// Final destination of a refresh.
#[async_trait]
pub trait RefreshSink: Send + Sync + fmt::Debug {
    async fn deliver(&self, employee_id: Uuid) -> Result<(), String>;
}

/// Only logs refreshes; used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl RefreshSink for LogSink {
    async fn deliver(&self, employee_id: Uuid) -> Result<(), String> {
        info!(employee_id = %employee_id, "Attendance view refresh requested");
        Ok(())
    }
}

/// POSTs `{"employee_id": ...}` to a webhook, once, with a timeout.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RefreshSink for WebhookSink {
    async fn deliver(&self, employee_id: Uuid) -> Result<(), String> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({ "employee_id": employee_id }))
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("webhook returned status {}", response.status()))
        }
    }
}

/// Builds the sink described by configuration.
pub fn sink_from_config(config: &RefreshConfig) -> Arc<dyn RefreshSink> {
    let Some(raw) = config.webhook_url.as_deref() else {
        return Arc::new(LogSink);
    };

    match Url::parse(raw)
        .map_err(|err| err.to_string())
        .and_then(|url| {
            WebhookSink::new(url, Duration::from_secs(config.timeout_seconds))
                .map_err(|err| err.to_string())
        }) {
        Ok(sink) => Arc::new(sink),
        Err(err) => {
            warn!(error = %err, "Refresh webhook unusable, falling back to log-only refreshes");
            Arc::new(LogSink)
        }
    }
}

/// Non-blocking notifier with one pending refresh per employee.
#[derive(Debug, Clone)]
pub struct CoalescingNotifier {
    pending: Arc<Mutex<HashSet<Uuid>>>,
    sender: mpsc::UnboundedSender<Uuid>,
}

impl CoalescingNotifier {
    /// Starts the delivery task. It stops when `shutdown` is cancelled.
    pub fn spawn(sink: Arc<dyn RefreshSink>, shutdown: CancellationToken) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Uuid>();
        let pending: Arc<Mutex<HashSet<Uuid>>> = Arc::default();
        let notifier = Self {
            pending: Arc::clone(&pending),
            sender,
        };

        let handle = tokio::spawn(async move {
            loop {
                let employee_id = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    next = receiver.recv() => match next {
                        Some(employee_id) => employee_id,
                        None => break,
                    },
                };

                // Clear before delivering so a change during delivery schedules another refresh.
                pending
                    .lock()
                    .unwrap_or_else(|poison| poison.into_inner())
                    .remove(&employee_id);

                if let Err(err) = sink.deliver(employee_id).await {
                    warn!(employee_id = %employee_id, error = %err, "Refresh notification dropped");
                }
            }
            debug!("Refresh notifier stopped");
        });

        (notifier, handle)
    }
}

impl RefreshNotifier for CoalescingNotifier {
    fn notify(&self, employee_id: Uuid) {
        let newly_pending = self
            .pending
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .insert(employee_id);

        if newly_pending && self.sender.send(employee_id).is_err() {
            debug!(employee_id = %employee_id, "Refresh notifier closed, notification dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct CountingSink {
        delivered: Mutex<Vec<Uuid>>,
        gate: tokio::sync::Notify,
    }

    #[async_trait]
    impl RefreshSink for CountingSink {
        async fn deliver(&self, employee_id: Uuid) -> Result<(), String> {
            self.gate.notified().await;
            self.delivered.lock().unwrap().push(employee_id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn bursts_for_one_employee_are_coalesced() {
        let sink = Arc::new(CountingSink::default());
        let shutdown = CancellationToken::new();
        let (notifier, handle) = CoalescingNotifier::spawn(sink.clone(), shutdown.clone());

        let employee = Uuid::new_v4();
        // The first delivery blocks on the gate; the burst behind it collapses into one.
        notifier.notify(employee);
        tokio::time::sleep(Duration::from_millis(20)).await;
        for _ in 0..10 {
            notifier.notify(employee);
        }

        sink.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;
        sink.gate.notify_one();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(sink.delivered.lock().unwrap().len(), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn notify_after_shutdown_does_not_panic() {
        let shutdown = CancellationToken::new();
        let (notifier, handle) = CoalescingNotifier::spawn(Arc::new(LogSink), shutdown.clone());
        shutdown.cancel();
        handle.await.unwrap();

        notifier.notify(Uuid::new_v4());
    }
}

use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::adapters::mail::Mailer;
use crate::adapters::push::{PushError, PushProvider};
use crate::domain::event::JobEvent;
use crate::domain::job::{JobKind, JobResult};
use crate::services::device_token_registry::DeviceTokenRegistry;

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    errors: Counter<u64>,
    invalidated_tokens: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fableforge-server");
        Self {
            sent: meter.u64_counter("push_sent_total").with_description("Push notifications sent").build(),
            errors: meter.u64_counter("push_errors_total").with_description("Push notification delivery errors").build(),
            invalidated_tokens: meter
                .u64_counter("push_invalidated_tokens_total")
                .with_description("Device tokens removed after a provider-reported failure")
                .build(),
        }
    }
}

/// Completion Fan-out, push side. Subscribes to every terminal job event on
/// the Event Bus and fans it out to the owner's registered devices. Holds a
/// `Mailer` for parity with the component's declared capabilities, but per
/// the resolved ambiguity around opportunistic failure notifications (see
/// `DESIGN.md`) never calls it — a `Failed` job with zero registered devices
/// is simply not notified.
#[derive(Debug)]
pub struct NotificationDispatcher {
    device_tokens: DeviceTokenRegistry,
    push_provider: Arc<dyn PushProvider>,
    #[allow(dead_code)]
    mailer: Arc<dyn Mailer>,
    metrics: Metrics,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(device_tokens: DeviceTokenRegistry, push_provider: Arc<dyn PushProvider>, mailer: Arc<dyn Mailer>) -> Self {
        Self { device_tokens, push_provider, mailer, metrics: Metrics::new() }
    }

    pub async fn run(self, mut events: broadcast::Receiver<JobEvent>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = events.recv() => {
                    match event {
                        Ok(event) if event.is_notifiable() => {
                            self.dispatch(event).instrument(tracing::debug_span!("dispatch_notification")).await;
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(missed = n, "Notification dispatcher lagged behind the event bus");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        tracing::info!("Notification dispatcher shutting down...");
    }

    #[tracing::instrument(skip(self, event), fields(job_id = %event.job_id(), owner_id = %event.owner_id()))]
    async fn dispatch(&self, event: JobEvent) {
        let owner_id = event.owner_id();
        let devices = match self.device_tokens.list_active(owner_id).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::error!(error = %e, "Failed to look up device tokens for notification fan-out");
                return;
            }
        };

        if devices.is_empty() {
            tracing::debug!("No registered devices for owner, notification is a no-op");
            return;
        }

        let tokens: Vec<String> = devices.into_iter().map(|d| d.token).collect();
        let (title, body) = notification_copy(&event);

        match self.push_provider.send_push(&tokens, &title, &body).await {
            Ok(unregistered) => {
                self.metrics.sent.add(1, &[]);
                if !unregistered.is_empty() {
                    self.metrics.invalidated_tokens.add(unregistered.len() as u64, &[]);
                    if let Err(e) = self.device_tokens.invalidate_many(&unregistered).await {
                        tracing::error!(error = %e, "Failed to invalidate stale device tokens");
                    }
                }
            }
            Err(PushError::QuotaExceeded) => {
                self.metrics.errors.add(1, &[KeyValue::new("reason", "quota_exceeded")]);
            }
            Err(PushError::Other(e)) => {
                tracing::warn!(error = %e, owner_id = %owner_id, "Push delivery failed");
                self.metrics.errors.add(1, &[KeyValue::new("reason", "other")]);
            }
        }
    }
}

/// Builds the notification copy for a terminal job event. Payload stays
/// minimal — a title and a short body, never the job's full payload or
/// result content.
fn notification_copy(event: &JobEvent) -> (String, String) {
    match event {
        JobEvent::Succeeded { kind, result, .. } => (kind_label(*kind).to_string(), succeeded_body(result)),
        JobEvent::Failed { kind, .. } => {
            (kind_label(*kind).to_string(), format!("Your {} could not be completed.", kind_noun(*kind)))
        }
        JobEvent::Submitted { .. } | JobEvent::Progress { .. } | JobEvent::Cancelled { .. } => {
            (String::new(), String::new())
        }
    }
}

fn succeeded_body(result: &JobResult) -> String {
    format!("\"{}\" is ready.", result.title)
}

const fn kind_label(kind: JobKind) -> &'static str {
    match kind {
        JobKind::StoryForPrompt | JobKind::StoryForChild => "Your story is ready",
        JobKind::VoiceClone => "Your voice is ready",
    }
}

const fn kind_noun(kind: JobKind) -> &'static str {
    match kind {
        JobKind::StoryForPrompt | JobKind::StoryForChild => "story",
        JobKind::VoiceClone => "voice clone",
    }
}

use dashmap::DashMap;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, UpDownCounter},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::event::JobEvent;

#[derive(Clone, Debug)]
struct Metrics {
    published_total: Counter<u64>,
    unrouted_total: Counter<u64>,
    active_channels: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("fableforge-server");
        Self {
            published_total: meter
                .u64_counter("job_events_published_total")
                .with_description("Total job events published to the event bus")
                .build(),
            unrouted_total: meter
                .u64_counter("job_events_unrouted_total")
                .with_description("Job events published with no local subscriber for their owner")
                .build(),
            active_channels: meter
                .i64_up_down_counter("job_event_bus_active_channels")
                .with_description("Number of owners with an active event-bus subscription")
                .build(),
        }
    }
}

/// In-process pub/sub for job lifecycle events, one `broadcast` channel per
/// owner so a slow or absent subscriber for one owner never affects another
/// (the fan-out isolation property). Both the SSE Hub and the Notification
/// Dispatcher subscribe independently — one being slow never blocks the
/// other, since each holds its own receiver into the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    channels: Arc<DashMap<Uuid, broadcast::Sender<JobEvent>>>,
    /// Firehose of every event regardless of owner, consumed by the
    /// Notification Dispatcher — it must see terminal events even for
    /// owners with no live SSE subscription.
    firehose: broadcast::Sender<JobEvent>,
    channel_capacity: usize,
    metrics: Metrics,
}

impl EventBus {
    #[must_use]
    pub fn new(channel_capacity: usize) -> Self {
        let (firehose, _rx) = broadcast::channel(channel_capacity);
        Self { channels: Arc::new(DashMap::new()), firehose, channel_capacity, metrics: Metrics::new() }
    }

    /// Subscribes to every event for one owner's jobs. Used by the SSE Hub.
    #[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
    pub fn subscribe(&self, owner_id: Uuid) -> broadcast::Receiver<JobEvent> {
        let tx = self
            .channels
            .entry(owner_id)
            .or_insert_with(|| {
                self.metrics.active_channels.add(1, &[]);
                let (tx, _rx) = broadcast::channel(self.channel_capacity);
                tx
            })
            .value()
            .clone();
        tx.subscribe()
    }

    /// Subscribes to every event for every owner. Used by the Notification
    /// Dispatcher, which must react to terminal events whether or not their
    /// owner currently has an SSE connection open.
    pub fn subscribe_all(&self) -> broadcast::Receiver<JobEvent> {
        self.firehose.subscribe()
    }

    /// Publishes an event to its owner's SSE subscribers and to the
    /// firehose. At-least-once, best-effort: if nobody is subscribed on the
    /// per-owner channel the event is simply dropped there — the Job Store
    /// remains the durable source of truth for job state.
    #[tracing::instrument(skip(self), fields(job_id = %event.job_id(), owner_id = %event.owner_id()))]
    pub fn publish(&self, event: JobEvent) {
        self.metrics.published_total.add(1, &[KeyValue::new("type", event.sse_event_name())]);

        match self.channels.get(&event.owner_id()) {
            Some(tx) if tx.receiver_count() > 0 => {
                let _ = tx.send(event.clone());
            }
            _ => {
                self.metrics.unrouted_total.add(1, &[KeyValue::new("type", event.sse_event_name())]);
            }
        }

        let _ = self.firehose.send(event);
    }

    /// Reclaims channels with no remaining subscribers. Run periodically by
    /// the lease-reaper background worker so the map doesn't grow unbounded
    /// across the lifetime of the process.
    pub fn sweep_idle_channels(&self) {
        self.channels.retain(|_, tx| {
            let active = tx.receiver_count() > 0;
            if !active {
                self.metrics.active_channels.add(-1, &[]);
            }
            active
        });
    }
}

use axum::response::sse::Event;
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use uuid::Uuid;

use crate::domain::event::JobEvent;
use crate::services::event_bus::EventBus;

/// Turns an Event Bus subscription into an SSE byte stream: one named event
/// per job-state change, plus a periodic heartbeat comment so idle
/// connections aren't reaped by intermediate proxies. A lagged receiver
/// (the subscriber fell behind the broadcast channel's buffer) drops the
/// missed events silently — per-owner event delivery is at-least-once, not
/// exactly-once, and a client that needs the current state can always poll
/// `GET /generation/status/{jobId}`.
#[derive(Clone, Debug)]
pub struct SseHub {
    bus: EventBus,
    heartbeat_interval: Duration,
}

impl SseHub {
    #[must_use]
    pub const fn new(bus: EventBus, heartbeat_interval: Duration) -> Self {
        Self { bus, heartbeat_interval }
    }

    /// Streams every job event for `owner_id`.
    pub fn stream_for_owner(&self, owner_id: Uuid) -> impl Stream<Item = Result<Event, Infallible>> + 'static + use<> {
        self.event_stream(owner_id, None)
    }

    /// Streams events for one job only, scoped to its owner.
    pub fn stream_for_job(&self, owner_id: Uuid, job_id: Uuid) -> impl Stream<Item = Result<Event, Infallible>> + 'static + use<> {
        self.event_stream(owner_id, Some(job_id))
    }

    fn event_stream(&self, owner_id: Uuid, job_id_filter: Option<Uuid>) -> impl Stream<Item = Result<Event, Infallible>> + 'static + use<> {
        let rx = self.bus.subscribe(owner_id);

        let events = BroadcastStream::new(rx).filter_map(move |item| {
            let job_id_filter = job_id_filter;
            async move {
                match item {
                    Ok(event) => {
                        if job_id_filter.is_some_and(|wanted| wanted != event.job_id()) {
                            None
                        } else {
                            Some(Ok(to_sse_event(&event)))
                        }
                    }
                    Err(_lagged) => None,
                }
            }
        });

        let heartbeats =
            IntervalStream::new(tokio::time::interval(self.heartbeat_interval)).map(|_| Ok(Event::default().comment("keepalive")));

        stream::select(events, heartbeats)
    }
}

fn to_sse_event(event: &JobEvent) -> Event {
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().id(event.job_id().to_string()).event(event.sse_event_name()).data(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::JobKind;

    #[test]
    fn terminal_events_serialize_with_their_own_event_name() {
        let event = JobEvent::Cancelled { job_id: Uuid::now_v7(), owner_id: Uuid::now_v7(), kind: JobKind::VoiceClone };
        let sse = to_sse_event(&event);
        assert_eq!(format!("{sse:?}").contains("cancelled"), true);
    }
}

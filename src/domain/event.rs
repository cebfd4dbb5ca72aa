use serde::Serialize;
use uuid::Uuid;

use super::job::{JobError, JobKind, JobResult, ProgressStage};

/// Published by the Job Store / Worker Pool onto the Event Bus whenever a
/// job's externally visible state changes. Consumed by the SSE Hub (fan-out
/// to subscribers) and the Notification Dispatcher (fan-out to devices) —
/// each consumer reads the same broadcast independently, so one being slow
/// or absent never blocks the other.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Submitted {
        job_id: Uuid,
        owner_id: Uuid,
        kind: JobKind,
    },
    Progress {
        job_id: Uuid,
        owner_id: Uuid,
        kind: JobKind,
        stage: ProgressStage,
        percent: u8,
    },
    Succeeded {
        job_id: Uuid,
        owner_id: Uuid,
        kind: JobKind,
        result: JobResult,
    },
    Failed {
        job_id: Uuid,
        owner_id: Uuid,
        kind: JobKind,
        error: JobError,
    },
    Cancelled {
        job_id: Uuid,
        owner_id: Uuid,
        kind: JobKind,
    },
}

impl JobEvent {
    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        match self {
            Self::Submitted { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Succeeded { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id, .. } => *job_id,
        }
    }

    #[must_use]
    pub const fn owner_id(&self) -> Uuid {
        match self {
            Self::Submitted { owner_id, .. }
            | Self::Progress { owner_id, .. }
            | Self::Succeeded { owner_id, .. }
            | Self::Failed { owner_id, .. }
            | Self::Cancelled { owner_id, .. } => *owner_id,
        }
    }

    /// Terminal events are the ones the retention sweeper cares about — a
    /// job that reaches any of these never leases again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. } | Self::Cancelled { .. })
    }

    /// Terminal events the Notification Dispatcher should push for.
    /// `Cancelled` is terminal but caller-initiated — the caller already
    /// knows, so it never generates a push.
    #[must_use]
    pub const fn is_notifiable(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    /// Stable name used as the SSE `event:` field.
    #[must_use]
    pub const fn sse_event_name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Progress { .. } => "progress",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{JobPayload, JobPriority};

/// Request body for `POST /generation/async`. The payload's own `kind` tag
/// selects the variant; `priority` is a sibling field rather than part of
/// the tagged payload, since it's a scheduling concern, not a generation
/// input.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    #[serde(flatten)]
    pub payload: JobPayload,

    #[serde(default)]
    pub priority: Option<JobPriority>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobResponse {
    pub job_id: Uuid,
    pub estimated_wait_seconds: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub cancelled: bool,
}

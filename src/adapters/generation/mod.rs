pub mod stub;

use async_trait::async_trait;

use crate::domain::job::{ErrorKind, JobKind, JobPayload, JobResult, ProgressStage};

/// Failure surfaced by a `Generator`. The Worker Pool uses `kind()` to decide
/// between scheduling a retry and moving the job straight to `Failed`.
#[derive(Debug, Clone)]
pub enum GenerationError {
    Retryable(String),
    Permanent(String),
}

impl GenerationError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Retryable(_) => ErrorKind::Retryable,
            Self::Permanent(_) => ErrorKind::Permanent,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(m) | Self::Permanent(m) => m,
        }
    }
}

/// Callback a `Generator` uses to report progress mid-run. Implemented by the
/// worker loop so a generator never touches the Job Store or Event Bus
/// directly — it only knows it reached a named stage.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, stage: ProgressStage);
}

/// External AI content-generation collaborator. One implementation per job
/// kind in production (story text/image pipeline, voice-clone pipeline);
/// this subsystem treats it purely as a capability it calls and waits on.
#[async_trait]
pub trait Generator: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> JobKind;

    async fn generate(
        &self,
        payload: &JobPayload,
        progress: &(dyn ProgressSink),
    ) -> Result<JobResult, GenerationError>;
}

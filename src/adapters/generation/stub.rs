use async_trait::async_trait;
use std::time::Duration;

use super::{GenerationError, Generator, ProgressSink};
use crate::domain::job::{JobKind, JobPayload, JobResult, ProgressStage};

/// Stands in for the real story/voice generation pipelines, which live
/// outside this subsystem and are reached only through the `Generator`
/// trait. Walks through the same progress stages a real pipeline would.
#[derive(Debug, Default)]
pub struct StubGenerator {
    kind: Option<JobKind>,
}

impl StubGenerator {
    #[must_use]
    pub const fn for_kind(kind: JobKind) -> Self {
        Self { kind: Some(kind) }
    }
}

#[async_trait]
impl Generator for StubGenerator {
    fn kind(&self) -> JobKind {
        self.kind.unwrap_or(JobKind::StoryForPrompt)
    }

    async fn generate(
        &self,
        payload: &JobPayload,
        progress: &(dyn ProgressSink),
    ) -> Result<JobResult, GenerationError> {
        tracing::info!(kind = %self.kind(), "STUB: generating content");

        match payload {
            JobPayload::StoryForPrompt(_) | JobPayload::StoryForChild(_) => {
                progress.report(ProgressStage::GeneratingContent).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                progress.report(ProgressStage::GeneratingImage).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            JobPayload::VoiceClone(_) => {
                progress.report(ProgressStage::GeneratingAudio).await;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        progress.report(ProgressStage::Persisting).await;

        Ok(JobResult { artifact_id: uuid::Uuid::now_v7().to_string(), title: "Untitled".to_string() })
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which generator and pool handles a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    StoryForPrompt,
    StoryForChild,
    VoiceClone,
}

impl JobKind {
    pub const ALL: [Self; 3] = [Self::StoryForPrompt, Self::StoryForChild, Self::VoiceClone];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StoryForPrompt => "story_for_prompt",
            Self::StoryForChild => "story_for_child",
            Self::VoiceClone => "voice_clone",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "story_for_prompt" => Some(Self::StoryForPrompt),
            "story_for_child" => Some(Self::StoryForChild),
            "voice_clone" => Some(Self::VoiceClone),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling band. Lower numeric value is scheduled earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High = 1,
    Normal = 5,
    Low = 10,
}

impl JobPriority {
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        self as i16
    }

    #[must_use]
    pub const fn from_i16(value: i16) -> Option<Self> {
        match value {
            1 => Some(Self::High),
            5 => Some(Self::Normal),
            10 => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Processing,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal states are sticky: no further transitions are permitted out of them.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Named checkpoint within one attempt, mapped to a progress percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Queued,
    Processing,
    GeneratingContent,
    GeneratingImage,
    GeneratingAudio,
    Persisting,
    Completed,
}

impl ProgressStage {
    #[must_use]
    pub const fn percent(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 10,
            Self::GeneratingContent => 30,
            Self::GeneratingImage => 50,
            Self::GeneratingAudio => 70,
            Self::Persisting => 90,
            Self::Completed => 100,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::GeneratingContent => "generating_content",
            Self::GeneratingImage => "generating_image",
            Self::GeneratingAudio => "generating_audio",
            Self::Persisting => "persisting",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "processing" => Some(Self::Processing),
            "generating_content" => Some(Self::GeneratingContent),
            "generating_image" => Some(Self::GeneratingImage),
            "generating_audio" => Some(Self::GeneratingAudio),
            "persisting" => Some(Self::Persisting),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Retryable,
    Permanent,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retryable => "retryable",
            Self::Permanent => "permanent",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "retryable" => Some(Self::Retryable),
            "permanent" => Some(Self::Permanent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub artifact_id: String,
    pub title: String,
}

/// Validated, tagged payload carried through the system. Validation happens once,
/// at the HTTP boundary, before `Enqueue` — the payload is already trusted by the
/// time the worker pool sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    StoryForPrompt(StoryForPromptPayload),
    StoryForChild(StoryForChildPayload),
    VoiceClone(VoiceClonePayload),
}

impl JobPayload {
    #[must_use]
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::StoryForPrompt(_) => JobKind::StoryForPrompt,
            Self::StoryForChild(_) => JobKind::StoryForChild,
            Self::VoiceClone(_) => JobKind::VoiceClone,
        }
    }

    /// Validates the payload before it is allowed to reach `Enqueue`.
    ///
    /// # Errors
    /// Returns a human-readable message describing the first validation failure.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::StoryForPrompt(p) => p.validate(),
            Self::StoryForChild(p) => p.validate(),
            Self::VoiceClone(p) => p.validate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryForPromptPayload {
    pub theme_ids: Vec<String>,
    pub min_age: u8,
    pub max_age: u8,
    pub language: String,
    pub prompt: String,
}

impl StoryForPromptPayload {
    fn validate(&self) -> Result<(), String> {
        if self.prompt.trim().is_empty() {
            return Err("Prompt cannot be empty".into());
        }
        if self.prompt.len() > 4000 {
            return Err("Prompt is too long (max 4000 characters)".into());
        }
        if self.min_age > self.max_age {
            return Err("minAge cannot be greater than maxAge".into());
        }
        if self.language.trim().is_empty() {
            return Err("Language cannot be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryForChildPayload {
    pub kid_id: Uuid,
    pub theme_ids: Vec<String>,
    pub language: String,
}

impl StoryForChildPayload {
    fn validate(&self) -> Result<(), String> {
        if self.theme_ids.is_empty() {
            return Err("At least one theme is required".into());
        }
        if self.language.trim().is_empty() {
            return Err("Language cannot be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceClonePayload {
    pub voice_name: String,
    pub sample_uris: Vec<String>,
}

impl VoiceClonePayload {
    fn validate(&self) -> Result<(), String> {
        if self.voice_name.trim().is_empty() {
            return Err("Voice name cannot be empty".into());
        }
        if self.sample_uris.is_empty() {
            return Err("At least one voice sample is required".into());
        }
        Ok(())
    }
}

/// Read-only projection of a job returned by `GetStatus` and `ListOwnerPending`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: Uuid,
    pub owner_id: Uuid,
    pub kind: JobKind,
    pub priority: JobPriority,
    pub state: JobState,
    pub progress: u8,
    pub stage: ProgressStage,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub next_attempt_at: Option<OffsetDateTime>,
    pub submitted_at: OffsetDateTime,
    pub leased_at: Option<OffsetDateTime>,
    pub finished_at: Option<OffsetDateTime>,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
}

impl Job {
    #[must_use]
    pub const fn is_owned_by(&self, owner_id: Uuid) -> bool {
        self.owner_id.as_u128() == owner_id.as_u128()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_matches_stage_table() {
        assert_eq!(ProgressStage::Queued.percent(), 0);
        assert_eq!(ProgressStage::Processing.percent(), 10);
        assert_eq!(ProgressStage::GeneratingContent.percent(), 30);
        assert_eq!(ProgressStage::GeneratingImage.percent(), 50);
        assert_eq!(ProgressStage::GeneratingAudio.percent(), 70);
        assert_eq!(ProgressStage::Persisting.percent(), 90);
        assert_eq!(ProgressStage::Completed.percent(), 100);
    }

    #[test]
    fn priority_ordering_is_high_before_normal_before_low() {
        assert!(JobPriority::High < JobPriority::Normal);
        assert!(JobPriority::Normal < JobPriority::Low);
    }

    #[test]
    fn terminal_states_are_sticky_by_flag() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Queued.is_terminal());
        assert!(!JobState::Processing.is_terminal());
    }

    #[test]
    fn story_for_prompt_rejects_empty_prompt() {
        let payload = StoryForPromptPayload {
            theme_ids: vec![],
            min_age: 3,
            max_age: 6,
            language: "en".into(),
            prompt: "   ".into(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn story_for_prompt_rejects_inverted_age_bounds() {
        let payload = StoryForPromptPayload {
            theme_ids: vec![],
            min_age: 8,
            max_age: 4,
            language: "en".into(),
            prompt: "A dragon learns to share.".into(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn voice_clone_requires_at_least_one_sample() {
        let payload = VoiceClonePayload { voice_name: "Grandma".into(), sample_uris: vec![] };
        assert!(payload.validate().is_err());
    }
}

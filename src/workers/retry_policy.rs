use crate::adapters::generation::GenerationError;
use crate::config::JobConfig;
use crate::domain::job::ErrorKind;

/// Consolidates a Worker Pool's retry discipline into one object:
/// backoff shape (`base_delay_secs`, `factor`, `max_delay_secs`),
/// `max_attempts`, and the failure-classification decision, instantiated
/// once per pool instead of scattered across individual config fields.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub base_delay_secs: i64,
    pub factor: f64,
    pub max_delay_secs: i64,
}

impl RetryPolicy {
    #[must_use]
    pub const fn from_config(config: &JobConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_secs: config.backoff_base_secs,
            factor: config.backoff_factor,
            max_delay_secs: config.backoff_max_secs,
        }
    }

    /// Classifies a generation failure as permanent or retryable. The pool
    /// consults the policy rather than the error directly, so a future
    /// policy change (e.g. capping retries by error type) has one place to
    /// live instead of being threaded through every `Generator`.
    #[must_use]
    pub fn classify(&self, error: &GenerationError) -> ErrorKind {
        error.kind()
    }
}

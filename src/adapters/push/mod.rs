pub mod stub;

use async_trait::async_trait;

/// Classifies a push-send failure the way the dispatcher needs to react to
/// it: a quota error should back off, anything else is retried
/// opportunistically on the next terminal event. Per-token invalidation
/// (a specific token came back unregistered) is reported separately, as
/// part of an otherwise successful batch send — see `send_push`.
#[derive(Debug)]
pub enum PushError {
    QuotaExceeded,
    Other(anyhow::Error),
}

#[async_trait]
pub trait PushProvider: Send + Sync + std::fmt::Debug {
    /// Sends one multicast push addressing every token in `tokens`. An
    /// owner with multiple registered devices gets a single provider call,
    /// not one per device. Returns the subset of `tokens` the provider
    /// reported as unregistered/invalid, so the caller can purge them —
    /// a per-token outcome within an otherwise successful batch.
    async fn send_push(&self, tokens: &[String], title: &str, body: &str) -> Result<Vec<String>, PushError>;
}

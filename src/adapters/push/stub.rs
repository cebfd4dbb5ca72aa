use async_trait::async_trait;

use super::{PushError, PushProvider};

/// Stands in for FCM/APNs. Logs and succeeds unconditionally.
#[derive(Debug, Default)]
pub struct StubPushProvider;

#[async_trait]
impl PushProvider for StubPushProvider {
    async fn send_push(&self, tokens: &[String], title: &str, body: &str) -> Result<Vec<String>, PushError> {
        tracing::info!(tokens = ?tokens, title = %title, body = %body, "STUB: sending multicast push notification");
        Ok(Vec::new())
    }
}

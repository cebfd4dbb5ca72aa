use async_trait::async_trait;

use super::Mailer;

/// Stands in for the transactional email provider.
#[derive(Debug, Default)]
pub struct StubMailer;

#[async_trait]
impl Mailer for StubMailer {
    async fn send(&self, to_owner_email: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        tracing::info!(to = %to_owner_email, subject = %subject, "STUB: sending email");
        Ok(())
    }
}

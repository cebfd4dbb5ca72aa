pub mod stub;

use async_trait::async_trait;

/// Capability held for parity with the component's declared collaborators.
/// The Notification Dispatcher never calls this today — see `DESIGN.md` for
/// why the email-fallback behavior some drafts of this system describe was
/// not implemented.
#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    async fn send(&self, to_owner_email: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

use async_trait::async_trait;

use crate::domain::models::EmailPayload;
use crate::domain::models::EmailTransport;

/// Used when no relay is configured. Every message is refused.
pub struct NoopEmail {}

#[async_trait]
impl EmailTransport for NoopEmail {
    #[allow(clippy::implicit_return)]
    async fn send(&self, payload: &EmailPayload) -> bool {
        tracing::warn!(name = %payload.name, "No email transport configured, dropping message");
        return false;
    }
}

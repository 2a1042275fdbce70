use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;

/// Arguments of the `sendMessage` tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub name: String,
    pub email: String,
    pub message: String,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Returns whether the relay accepted the message.
    async fn send(&self, payload: &EmailPayload) -> bool;
}

pub type EmailBox = Arc<dyn EmailTransport>;

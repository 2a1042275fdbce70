#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "model")]
    Assistant,
}

/// Rich panel the UI renders under an assistant reply.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Widget {
    Projects,
    Experience,
    Skills,
    Contact,
    Story,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
    #[serde(default, rename = "uiComponent", skip_serializing_if = "Option::is_none")]
    pub widget: Option<Widget>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Message {
        return Message {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            widget: None,
        };
    }

    /// Empty assistant message that streamed deltas are appended to.
    pub fn placeholder() -> Message {
        return Message::new(Role::Assistant, "");
    }

    pub fn append(&mut self, text: &str) {
        self.content += text;
    }

    pub fn is_empty(&self) -> bool {
        return self.content.trim().is_empty();
    }
}

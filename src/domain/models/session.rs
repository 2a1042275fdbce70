#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use super::Message;
use super::PersonaTone;
use super::Theme;

/// Current layout of the persisted state file.
pub const SCHEMA_VERSION: u32 = 1;

pub const PROVISIONAL_TITLE_CHARS: usize = 30;

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: i64,
}

impl Session {
    pub fn new(title: &str) -> Session {
        return Session {
            id: Session::create_id(),
            title: title.to_string(),
            messages: vec![],
            created_at: Utc::now().timestamp_millis(),
        };
    }

    pub fn create_id() -> String {
        return Uuid::new_v4().to_string();
    }

    /// Title shown until a generated one arrives.
    pub fn provisional_title(text: &str) -> String {
        return text.trim().chars().take(PROVISIONAL_TITLE_CHARS).collect();
    }

    pub fn message_mut(&mut self, id: &str) -> Option<&mut Message> {
        return self.messages.iter_mut().find(|msg| return msg.id == id);
    }
}

fn default_sidebar_open() -> bool {
    return true;
}

/// Everything the storage collaborator round-trips between runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub tone: PersonaTone,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default = "default_sidebar_open")]
    pub sidebar_open: bool,
}

impl Default for PersistedState {
    fn default() -> PersistedState {
        return PersistedState {
            version: SCHEMA_VERSION,
            sessions: vec![],
            tone: PersonaTone::default(),
            theme: Theme::default(),
            sidebar_open: true,
        };
    }
}

#[cfg(test)]
#[path = "sessions_test.rs"]
mod tests;

use std::path;

use anyhow::bail;
use anyhow::Result;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::models::PersistedState;
use crate::domain::models::Session;
use crate::domain::models::SCHEMA_VERSION;

/// YAML file holding the session list and UI preferences between runs.
pub struct SessionStore {
    pub file_path: path::PathBuf,
}

impl SessionStore {
    pub fn new(file_path: path::PathBuf) -> SessionStore {
        return SessionStore { file_path };
    }

    pub fn default_path() -> path::PathBuf {
        let cache_dir = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        return cache_dir.join("folio/state.yaml");
    }

    /// Missing files load as an empty state. Files written before the state
    /// was versioned hold a bare list of sessions and are migrated.
    pub async fn load(&self) -> Result<PersistedState> {
        if !self.file_path.exists() {
            return Ok(PersistedState::default());
        }

        let payload = fs::read_to_string(&self.file_path).await?;
        return parse_state(&payload);
    }

    pub async fn save(&self, state: &PersistedState) -> Result<()> {
        let payload = serde_yaml::to_string(state)?;

        if let Some(parent) = self.file_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(&self.file_path).await?;
        file.write_all(payload.as_bytes()).await?;

        tracing::debug!(
            path = %self.file_path.display(),
            sessions = state.sessions.len(),
            "Saved state"
        );
        return Ok(());
    }

    pub async fn clear(&self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }

        fs::remove_file(&self.file_path).await?;
        return Ok(());
    }
}

fn parse_state(payload: &str) -> Result<PersistedState> {
    if payload.trim().is_empty() {
        return Ok(PersistedState::default());
    }

    let value: serde_yaml::Value = serde_yaml::from_str(payload)?;

    if value.is_null() {
        return Ok(PersistedState::default());
    }

    if value.is_sequence() {
        let sessions: Vec<Session> = serde_yaml::from_value(value)?;
        tracing::info!(sessions = sessions.len(), "Migrating unversioned session list");
        return Ok(PersistedState {
            sessions,
            ..PersistedState::default()
        });
    }

    let mut state: PersistedState = serde_yaml::from_value(value)?;
    if state.version > SCHEMA_VERSION {
        bail!(format!(
            "State file version {} is newer than the supported version {SCHEMA_VERSION}",
            state.version
        ));
    }
    state.version = SCHEMA_VERSION;

    return Ok(state);
}

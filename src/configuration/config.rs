#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

use std::env;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::ArgMatches;
use clap::Command;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::EnumIter;
use strum::EnumVariantNames;
use strum::IntoEnumIterator;
use tokio::fs;

use crate::domain::models::BackendName;
use crate::domain::models::PersonaTone;
use crate::domain::models::Theme;
use crate::domain::services::SessionStore;

static CONFIG: Lazy<DashMap<String, String>> = Lazy::new(DashMap::new);

#[derive(Clone, Copy, Debug, Eq, PartialEq, EnumIter, EnumVariantNames, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ConfigKey {
    PrimaryBackend,
    #[strum(serialize = "openai-url")]
    OpenAiURL,
    #[strum(serialize = "openai-token")]
    OpenAiToken,
    #[strum(serialize = "openai-model")]
    OpenAiModel,
    GeminiURL,
    GeminiToken,
    GeminiModels,
    TitleModel,
    RealtimeURL,
    VoiceModel,
    VoiceName,
    EmailURL,
    ResendToken,
    OwnerName,
    OwnerEmail,
    OwnerPronunciation,
    SystemPromptFile,
    Tone,
    Theme,
    BackendHealthCheckTimeout,
    VoiceConnectTimeout,
    StateFile,
    ConfigFile,
}

pub struct Config {}

impl Config {
    pub fn get(key: ConfigKey) -> String {
        if let Some(val) = CONFIG.get(&key.to_string()) {
            return val.to_string();
        }

        return "".to_string();
    }

    /// Comma separated values, trimmed, empty entries dropped.
    pub fn get_list(key: ConfigKey) -> Vec<String> {
        return Config::get(key)
            .split(',')
            .map(|entry| return entry.trim().to_string())
            .filter(|entry| return !entry.is_empty())
            .collect();
    }

    pub fn set(key: ConfigKey, value: &str) {
        CONFIG.insert(key.to_string(), value.to_string());
    }

    pub fn default(key: ConfigKey) -> String {
        let default_backend = BackendName::OpenAI.to_string();
        let default_tone = PersonaTone::default().to_string();
        let default_theme = Theme::default().to_string();
        let state_path = SessionStore::default_path().to_string_lossy().to_string();

        #[cfg(not(target_os = "macos"))]
        let config_path = dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("folio/config.toml");
        #[cfg(target_os = "macos")]
        let config_path = dirs::home_dir()
            .unwrap_or_else(env::temp_dir)
            .join(".config/folio/config.toml");
        let config_path = config_path.to_string_lossy().to_string();

        let res = match key {
            ConfigKey::PrimaryBackend => &default_backend,
            ConfigKey::OpenAiURL => "https://api.openai.com",
            ConfigKey::OpenAiToken => "",
            ConfigKey::OpenAiModel => "gpt-4o-mini",
            ConfigKey::GeminiURL => "https://generativelanguage.googleapis.com",
            ConfigKey::GeminiToken => "",
            ConfigKey::GeminiModels => "gemini-3-flash-preview,gemini-2.5-flash,gemini-flash-lite-latest,gemini-2.0-flash,gemma-3-27b-it",
            ConfigKey::TitleModel => "gemma-3-27b-it",
            ConfigKey::RealtimeURL => "wss://generativelanguage.googleapis.com",
            ConfigKey::VoiceModel => "gemini-2.5-flash-native-audio-preview-12-2025",
            ConfigKey::VoiceName => "Sadaltager",
            ConfigKey::EmailURL => "",
            ConfigKey::ResendToken => "",
            ConfigKey::OwnerName => "",
            ConfigKey::OwnerEmail => "",
            ConfigKey::OwnerPronunciation => "",
            ConfigKey::SystemPromptFile => "",
            ConfigKey::Tone => &default_tone,
            ConfigKey::Theme => &default_theme,
            ConfigKey::BackendHealthCheckTimeout => "1000",
            ConfigKey::VoiceConnectTimeout => "10000",

            // Special
            ConfigKey::StateFile => &state_path,
            ConfigKey::ConfigFile => &config_path,
        };

        return res.to_string();
    }

    pub async fn load(cmd: Command, clap_arg_matches: Vec<&ArgMatches>) -> Result<()> {
        for key in ConfigKey::iter() {
            Config::set(key, &Config::default(key))
        }

        let mut config_file = Config::default(ConfigKey::ConfigFile);
        for matches in clap_arg_matches.as_slice() {
            if let Ok(Some(arg_config_file)) =
                matches.try_get_one::<String>(&ConfigKey::ConfigFile.to_string())
            {
                config_file = arg_config_file.to_string();
            }
        }

        let config_path = path::PathBuf::from(config_file);
        if config_path.exists() {
            let toml_str = fs::read_to_string(config_path).await?;
            let doc = toml_str.parse::<toml_edit::Document>()?;

            for key in ConfigKey::iter() {
                let val = match doc.get(&key.to_string()) {
                    Some(val) => val,
                    None => continue,
                };

                // Use clap value parsers to do validation.
                let mut possible_values = vec![];
                if let Some(arg) = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))
                {
                    possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name().to_string())
                        .collect::<Vec<String>>();
                }

                if let Some(val_int) = val.as_integer() {
                    Config::set(key, &val_int.to_string());
                } else if let Some(val_arr) = val.as_array() {
                    let entries = val_arr
                        .iter()
                        .filter_map(|e| return e.as_str())
                        .collect::<Vec<&str>>();
                    Config::set(key, &entries.join(","));
                } else if let Some(val_str) = val.as_str() {
                    if val_str.is_empty() {
                        continue;
                    }
                    if !possible_values.is_empty()
                        && !possible_values.contains(&val_str.to_string())
                    {
                        bail!(format!("config.toml has an invalid value for key '{key}': {val_str}\nPossible values are: {}", possible_values.join(", ")));
                    }
                    Config::set(key, val_str);
                }
            }
        }

        for key in ConfigKey::iter() {
            for matches in clap_arg_matches.as_slice() {
                if let Ok(Some(val)) = matches.try_get_one::<String>(&key.to_string()) {
                    if val.is_empty() {
                        continue;
                    }
                    Config::set(key, val)
                }
            }
        }

        tracing::debug!(
            primary_backend = Config::get(ConfigKey::PrimaryBackend),
            gemini_models = Config::get(ConfigKey::GeminiModels),
            voice_model = Config::get(ConfigKey::VoiceModel),
            tone = Config::get(ConfigKey::Tone),
            state_file = Config::get(ConfigKey::StateFile),
            "config"
        );

        return Ok(());
    }

    /// Commented TOML template listing every key with its default.
    pub fn serialize_default(cmd: Command) -> String {
        let toml_str = ConfigKey::iter()
            .filter_map(|key| {
                if key == ConfigKey::ConfigFile {
                    return None;
                }

                let arg = cmd
                    .get_arguments()
                    .find(|e| return e.get_long() == Some(key.to_string().as_str()))?;

                let mut description = arg.get_help()?.to_string();
                description = description
                    .split("[default:")
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_string();

                if !arg.get_possible_values().is_empty() {
                    let possible_values = arg
                        .get_possible_values()
                        .iter()
                        .map(|e| return e.get_name())
                        .collect::<Vec<_>>()
                        .join(", ");
                    description = format!("{description} [possible values: {}]", possible_values);
                }

                let mut val = Config::default(key);
                if val.is_empty() {
                    val = format!("# {key} = \"\"");
                } else if val.parse::<i32>().is_ok() {
                    val = format!("{key} = {val}");
                } else {
                    val = format!("{key} = \"{val}\"");
                }

                return Some(format!("# {description}\n{val}"));
            })
            .collect::<Vec<String>>()
            .join("\n\n");

        return toml_str;
    }
}

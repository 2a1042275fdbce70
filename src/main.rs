#![deny(clippy::implicit_return)]
#![allow(clippy::needless_return)]

mod application;
mod configuration;
mod domain;
mod infrastructure;

use std::env;
use std::io;
use std::path;
use std::process;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use anyhow::Result;
use tokio::fs;
use tokio::sync::mpsc;
use yansi::Paint;

use crate::application::cli;
use crate::application::repl::Repl;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Event;
use crate::domain::models::PersonaTone;
use crate::domain::models::Theme;
use crate::domain::services::voice::VoiceDevices;
use crate::domain::services::voice::VoiceSessionController;
use crate::domain::services::voice::VoiceSettings;
use crate::domain::services::ChatOrchestrator;
use crate::domain::services::ChatServices;
use crate::domain::services::PromptBuilder;
use crate::domain::services::SessionStore;
use crate::domain::services::TextCompletionOrchestrator;
use crate::domain::services::ToolRegistry;
use crate::infrastructure::audio::AudioManager;
use crate::infrastructure::backends::BackendManager;
use crate::infrastructure::email::EmailManager;
use crate::infrastructure::realtime::RealtimeManager;

fn handle_error(err: Error) {
    eprintln!(
        "{}",
        Paint::red(format!(
            "Oh no! Folio has failed with the following app version and error.\n\nVersion: {}\nError: {}",
            env!("CARGO_PKG_VERSION"),
            err
        ))
    );

    let backtrace = err.backtrace();
    if backtrace.to_string() == "disabled backtrace" {
        let args = env::args().collect::<Vec<String>>().join(" ");
        eprintln!("\nRunning the following can help explain further what the issue is:");
        eprintln!("\nRUST_BACKTRACE=1 {args}");
    } else {
        eprintln!("\n{}", backtrace);
    }

    process::exit(1);
}

async fn health_check(completion: &TextCompletionOrchestrator) {
    if completion.backends().is_empty() {
        eprintln!(
            "{}",
            Paint::yellow("No text provider is configured. Set gemini-token or openai-token to chat.")
        );
        return;
    }

    for backend in completion.backends() {
        if let Err(err) = backend.health_check().await {
            tracing::warn!(
                backend = %backend.name(),
                model = %backend.model(),
                error = ?err,
                "Backend failed its health check"
            );
            eprintln!(
                "{}",
                Paint::yellow(format!(
                    "{} ({}) is not reachable, replies will fall back to the next provider.",
                    backend.name(),
                    backend.model()
                ))
            );
        }
    }
}

async fn start_chat() -> Result<()> {
    let owner_name = Config::get(ConfigKey::OwnerName);
    let prompt_file = Config::get(ConfigKey::SystemPromptFile);
    let base_prompt = if prompt_file.is_empty() {
        "".to_string()
    } else {
        fs::read_to_string(&prompt_file).await?
    };
    let prompts = Arc::new(PromptBuilder::new(
        &base_prompt,
        &owner_name,
        &Config::get(ConfigKey::OwnerPronunciation),
    ));
    let email = EmailManager::get();

    let chat_tools = ToolRegistry::chat(&owner_name);
    let completion =
        TextCompletionOrchestrator::new(BackendManager::cascade(), chat_tools.declarations());
    health_check(&completion).await;

    let services = ChatServices {
        completion: Arc::new(completion),
        titles: Arc::new(BackendManager::title_generator()),
        tools: Arc::new(chat_tools),
        prompts: prompts.clone(),
        email: email.clone(),
    };

    let store = SessionStore::new(path::PathBuf::from(Config::get(ConfigKey::StateFile)));
    let is_first_run = !store.file_path.exists();
    let mut state = store.load().await?;
    // Saved preferences win over configured ones.
    if is_first_run {
        state.tone = PersonaTone::from_str(&Config::get(ConfigKey::Tone)).unwrap_or_default();
        state.theme = Theme::from_str(&Config::get(ConfigKey::Theme)).unwrap_or_default();
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<Event>();
    let chat = ChatOrchestrator::from_persisted(services, state, event_tx);

    let (voice_tx, voice_rx) = mpsc::unbounded_channel();
    let voice = VoiceSessionController::new(
        VoiceDevices {
            capture: AudioManager::capture(),
            playback: AudioManager::playback(),
            connector: RealtimeManager::get(),
        },
        VoiceSettings {
            model: Config::get(ConfigKey::VoiceModel),
            voice_name: Config::get(ConfigKey::VoiceName),
            connect_timeout: Duration::from_millis(
                Config::get(ConfigKey::VoiceConnectTimeout).parse::<u64>()?,
            ),
        },
        Arc::new(ToolRegistry::voice(&owner_name)),
        prompts,
        email,
        voice_tx,
    );

    return Repl::new(chat, voice, store, io::stdout())
        .run(event_rx, voice_rx)
        .await;
}

#[tokio::main]
async fn main() {
    better_panic::Settings::auto().install();

    let debug_log_dir = env::var("FOLIO_LOG_DIR").unwrap_or_else(|_| {
        return dirs::cache_dir()
            .unwrap_or_else(env::temp_dir)
            .join("folio")
            .to_string_lossy()
            .to_string();
    });

    let file_appender = tracing_appender::rolling::never(debug_log_dir, "debug.log");
    let (writer, _guard) = tracing_appender::non_blocking(file_appender);
    if env::var("RUST_LOG")
        .unwrap_or_else(|_| return "".to_string())
        .contains("folio")
    {
        tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(writer)
            .init();
    }

    let ready = match cli::parse().await {
        Ok(ready) => ready,
        Err(err) => {
            handle_error(err);
            return;
        }
    };
    if !ready {
        process::exit(0);
    }

    if let Err(err) = start_chat().await {
        handle_error(err);
    }

    process::exit(0);
}

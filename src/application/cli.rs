#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use chrono::TimeZone;
use chrono::Utc;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::help_text;
use crate::domain::models::BackendName;
use crate::domain::models::PersonaTone;
use crate::domain::models::Session;
use crate::domain::models::Theme;
use crate::domain::services::SessionStore;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

fn format_session(idx: usize, session: &Session) -> String {
    let created = match Utc.timestamp_millis_opt(session.created_at).single() {
        Some(date) => date.format("%Y-%m-%d %H:%M").to_string(),
        None => "unknown date".to_string(),
    };

    let mut title = session.title.to_string();
    if title.chars().count() > 60 {
        title = format!("{}...", title.chars().take(57).collect::<String>());
    }

    return format!(
        "{}. {title} ({created}, {} messages)",
        idx + 1,
        session.messages.len()
    );
}

async fn print_sessions_list(store: &SessionStore) -> Result<()> {
    let sessions = store
        .load()
        .await?
        .sessions
        .iter()
        .enumerate()
        .map(|(idx, session)| {
            return format_session(idx, session);
        })
        .collect::<Vec<String>>();

    if sessions.is_empty() {
        println!("There are no sessions available. You should start your first one!");
    } else {
        println!("{}", sessions.join("\n"));
    }

    return Ok(());
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_sessions() -> Command {
    return Command::new("sessions")
        .about("Manage saved chat sessions.")
        .arg_required_else_help(true)
        .subcommand(Command::new("list").about("List saved sessions, newest first."))
        .subcommand(Command::new("clear").about("Delete every saved session and preference."))
        .subcommand(Command::new("path").about("Print the path of the state file."));
}

fn subcommand_chat() -> Command {
    return Command::new("chat").about("Start a chat session in the terminal.");
}

fn arg_config(key: ConfigKey, env: &str, help: &str) -> Arg {
    let mut help = help.to_string();
    let default = Config::default(key);
    if !default.is_empty() {
        help = format!("{help} [default: {default}]");
    }

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env.to_string())
        .num_args(1)
        .help(help)
        .global(true);
}

fn arg_primary_backend() -> Arg {
    return arg_config(
        ConfigKey::PrimaryBackend,
        "FOLIO_PRIMARY_BACKEND",
        "Backend tried first for text chat, before the Gemini model cascade.",
    )
    .short('b')
    .value_parser(PossibleValuesParser::new(BackendName::VARIANTS));
}

fn arg_tone() -> Arg {
    return arg_config(
        ConfigKey::Tone,
        "FOLIO_TONE",
        "Persona tone the assistant starts with.",
    )
    .value_parser(PossibleValuesParser::new(PersonaTone::VARIANTS));
}

fn arg_theme() -> Arg {
    return arg_config(ConfigKey::Theme, "FOLIO_THEME", "Colour theme.")
        .value_parser(PossibleValuesParser::new(Theme::VARIANTS));
}

fn config_args() -> Vec<Arg> {
    return vec![
        arg_primary_backend(),
        arg_config(
            ConfigKey::OpenAiURL,
            "FOLIO_OPENAI_URL",
            "OpenAI API URL. Can be swapped to a compatible proxy.",
        ),
        arg_config(
            ConfigKey::OpenAiToken,
            "FOLIO_OPENAI_TOKEN",
            "OpenAI API token. OpenAI is skipped when unset.",
        ),
        arg_config(
            ConfigKey::OpenAiModel,
            "FOLIO_OPENAI_MODEL",
            "OpenAI model used for text chat.",
        ),
        arg_config(ConfigKey::GeminiURL, "FOLIO_GEMINI_URL", "Gemini API URL."),
        arg_config(
            ConfigKey::GeminiToken,
            "FOLIO_GEMINI_TOKEN",
            "Gemini API key, used for text chat, titles and voice.",
        ),
        arg_config(
            ConfigKey::GeminiModels,
            "FOLIO_GEMINI_MODELS",
            "Comma separated Gemini models tried in order when a provider fails.",
        ),
        arg_config(
            ConfigKey::TitleModel,
            "FOLIO_TITLE_MODEL",
            "Gemini model that names new sessions.",
        ),
        arg_config(
            ConfigKey::RealtimeURL,
            "FOLIO_REALTIME_URL",
            "Websocket URL of the realtime voice API.",
        ),
        arg_config(
            ConfigKey::VoiceModel,
            "FOLIO_VOICE_MODEL",
            "Model used for voice conversations.",
        ),
        arg_config(
            ConfigKey::VoiceName,
            "FOLIO_VOICE_NAME",
            "Prebuilt voice the assistant speaks with.",
        ),
        arg_config(
            ConfigKey::EmailURL,
            "FOLIO_EMAIL_URL",
            "Relay endpoint receiving contact messages as JSON.",
        ),
        arg_config(
            ConfigKey::ResendToken,
            "FOLIO_RESEND_TOKEN",
            "Resend API key. Takes precedence over the email relay.",
        ),
        arg_config(
            ConfigKey::OwnerName,
            "FOLIO_OWNER_NAME",
            "Name of the person the portfolio is about.",
        ),
        arg_config(
            ConfigKey::OwnerEmail,
            "FOLIO_OWNER_EMAIL",
            "Address contact messages are delivered to.",
        ),
        arg_config(
            ConfigKey::OwnerPronunciation,
            "FOLIO_OWNER_PRONUNCIATION",
            "How the voice assistant should pronounce the owner's name.",
        ),
        arg_config(
            ConfigKey::SystemPromptFile,
            "FOLIO_SYSTEM_PROMPT_FILE",
            "Path to a file with the resume prompt. A generic prompt is used when unset.",
        ),
        arg_tone(),
        arg_theme(),
        arg_config(
            ConfigKey::BackendHealthCheckTimeout,
            "FOLIO_BACKEND_HEALTH_CHECK_TIMEOUT",
            "Time to wait in milliseconds before timing out when doing a healthcheck for a backend.",
        ),
        arg_config(
            ConfigKey::VoiceConnectTimeout,
            "FOLIO_VOICE_CONNECT_TIMEOUT",
            "Time to wait in milliseconds for the realtime voice handshake.",
        ),
        arg_config(
            ConfigKey::StateFile,
            "FOLIO_STATE_FILE",
            "Path of the YAML file sessions are saved to.",
        ),
        arg_config(
            ConfigKey::ConfigFile,
            "FOLIO_CONFIG_FILE",
            "Path to configuration file",
        )
        .short('c'),
    ];
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") {
                return Paint::new(format!("CHAT {line}"))
                    .underline()
                    .bold()
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("folio")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(subcommand_chat())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_sessions())
        .args(config_args());
}

async fn load_config(matches: &ArgMatches, subcmd_matches: Option<&ArgMatches>) -> Result<()> {
    let mut all_matches = vec![matches];
    if let Some(subcmd_matches) = subcmd_matches {
        all_matches.push(subcmd_matches);
    }
    return Config::load(build(), all_matches).await;
}

/// Returns true when the chat should start.
pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("chat", subcmd_matches)) => {
            load_config(&matches, Some(subcmd_matches)).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(false);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("sessions", subcmd_matches)) => {
            load_config(&matches, Some(subcmd_matches)).await?;
            let store = SessionStore::new(path::PathBuf::from(Config::get(ConfigKey::StateFile)));

            match subcmd_matches.subcommand() {
                Some(("list", _)) => {
                    print_sessions_list(&store).await?;
                }
                Some(("clear", _)) => {
                    store.clear().await?;
                    println!("Deleted all sessions");
                }
                Some(("path", _)) => {
                    println!("{}", store.file_path.to_string_lossy());
                }
                _ => {
                    subcommand_sessions().print_long_help()?;
                }
            }
            return Ok(false);
        }
        _ => {
            load_config(&matches, None).await?;
        }
    }

    return Ok(true);
}

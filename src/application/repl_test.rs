use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use tokio::sync::mpsc;

use super::describe_effect;
use super::Repl;
use crate::domain::models::BackendBox;
use crate::domain::models::Event;
use crate::domain::models::PersonaTone;
use crate::domain::models::Session;
use crate::domain::models::ToolEffect;
use crate::domain::models::View;
use crate::domain::models::VoiceEvent;
use crate::domain::models::Widget;
use crate::domain::services::fakes::FakeBackend;
use crate::domain::services::fakes::FakeCapture;
use crate::domain::services::fakes::FakeConnector;
use crate::domain::services::fakes::FakeEmail;
use crate::domain::services::fakes::FakePlayback;
use crate::domain::services::voice::VoiceDevices;
use crate::domain::services::voice::VoiceSessionController;
use crate::domain::services::voice::VoiceSettings;
use crate::domain::services::ChatOrchestrator;
use crate::domain::services::ChatServices;
use crate::domain::services::PromptBuilder;
use crate::domain::services::SessionStore;
use crate::domain::services::TextCompletionOrchestrator;
use crate::domain::services::TitleGenerator;
use crate::domain::services::ToolRegistry;

struct Harness {
    repl: Repl<Vec<u8>>,
    events: mpsc::UnboundedReceiver<Event>,
    _voice_events: mpsc::UnboundedReceiver<VoiceEvent>,
}

fn harness() -> Harness {
    let tools = ToolRegistry::chat("Ada");
    let backend: BackendBox = Box::new(FakeBackend::text("primary", "A compiler."));
    let email = Arc::new(FakeEmail::new(true));
    let prompts = Arc::new(PromptBuilder::new("base", "Ada", ""));

    let services = ChatServices {
        completion: Arc::new(TextCompletionOrchestrator::new(
            vec![backend],
            tools.declarations(),
        )),
        titles: Arc::new(TitleGenerator::new(None, None)),
        tools: Arc::new(tools),
        prompts: prompts.clone(),
        email: email.clone(),
    };
    let (tx, events) = mpsc::unbounded_channel();
    let chat = ChatOrchestrator::new(services, tx);

    let (voice_tx, voice_events) = mpsc::unbounded_channel();
    let voice = VoiceSessionController::new(
        VoiceDevices {
            capture: Arc::new(FakeCapture::new(16_000)),
            playback: Arc::new(FakePlayback::default()),
            connector: Arc::new(FakeConnector::default()),
        },
        VoiceSettings {
            model: "native-audio".to_string(),
            voice_name: "Sadaltager".to_string(),
            connect_timeout: Duration::from_secs(5),
        },
        Arc::new(ToolRegistry::voice("Ada")),
        prompts,
        email,
        voice_tx,
    );

    let store = SessionStore::new(
        std::env::temp_dir().join(format!("folio-repl-{}.yaml", Session::create_id())),
    );

    return Harness {
        repl: Repl::new(chat, voice, store, vec![]),
        events,
        _voice_events: voice_events,
    };
}

fn output(repl: &Repl<Vec<u8>>) -> String {
    return String::from_utf8_lossy(&repl.out).to_string();
}

#[test]
fn it_describes_tool_effects() {
    insta::assert_snapshot!(format!(
        "{}\n{}\n{}",
        describe_effect(&ToolEffect::OpenContact),
        describe_effect(&ToolEffect::ShowWidget(Widget::Projects)),
        describe_effect(&ToolEffect::Navigate(View::Story))
    ), @r###"
    Opening the contact form.
    Showing the projects panel.
    Navigating to the story page.
    "###);
}

#[tokio::test]
async fn it_streams_replies_and_saves_the_session() -> Result<()> {
    let mut h = harness();

    assert!(h.repl.handle_line("What did Ada build?").await?);
    assert!(h.repl.streaming.is_some());

    while h.repl.streaming.is_some() {
        let event = match tokio::time::timeout(Duration::from_secs(5), h.events.recv()).await? {
            Some(event) => event,
            None => bail!("Event channel closed"),
        };
        h.repl.handle_event(event).await?;
    }

    let out = output(&h.repl);
    assert!(out.contains("assistant> "));
    assert!(out.contains("A compiler."));

    let saved = h.repl.store.load().await?;
    assert_eq!(saved.sessions.len(), 1);
    assert_eq!(saved.sessions[0].messages[1].content, "A compiler.");

    h.repl.store.clear().await?;
    return Ok(());
}

#[tokio::test]
async fn it_lists_and_selects_sessions() -> Result<()> {
    let mut h = harness();

    h.repl.handle_line("/new").await?;
    h.repl.handle_line("/new").await?;
    h.repl.handle_line("/sessions").await?;

    let out = output(&h.repl);
    assert!(out.contains("* 1. New Chat"));
    assert!(out.contains("  2. New Chat"));

    let second = h.repl.chat.sessions[1].id.to_string();
    h.repl.handle_line("/select 2").await?;
    assert_eq!(h.repl.chat.current_session_id, Some(second));

    h.repl.handle_line("/select 9").await?;
    assert!(output(&h.repl).contains("No session at that position."));

    return Ok(());
}

#[tokio::test]
async fn it_changes_tone() -> Result<()> {
    let mut h = harness();

    h.repl.handle_line("/tone casual").await?;
    assert_eq!(h.repl.chat.tone, PersonaTone::Casual);

    h.repl.handle_line("/tone pirate").await?;
    assert_eq!(h.repl.chat.tone, PersonaTone::Casual);
    assert!(output(&h.repl).contains("Unknown tone 'pirate'. Possible values are: professional, technical, casual"));

    h.repl.store.clear().await?;
    return Ok(());
}

#[tokio::test]
async fn it_rejects_unknown_commands() -> Result<()> {
    let mut h = harness();

    assert!(h.repl.handle_line("/dance").await?);
    assert!(output(&h.repl).contains("Unknown command."));
    assert!(h.repl.chat.sessions.is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_needs_a_voice_session_to_mute() -> Result<()> {
    let mut h = harness();

    h.repl.handle_line("/mic").await?;
    h.repl.handle_line("/speaker").await?;

    let out = output(&h.repl);
    assert_eq!(out.matches("No voice session running.").count(), 2);

    return Ok(());
}

#[tokio::test]
async fn it_drives_the_voice_session() -> Result<()> {
    let mut h = harness();

    h.repl.handle_line("/voice").await?;
    assert!(h.repl.voice.is_connected());

    h.repl.handle_line("/mic").await?;
    assert!(output(&h.repl).contains("Microphone muted."));
    assert!(h.repl.voice.is_mic_muted());

    h.repl.handle_line("/hangup").await?;
    assert!(!h.repl.voice.is_connected());

    return Ok(());
}

#[tokio::test]
async fn it_applies_voice_tool_effects() -> Result<()> {
    let mut h = harness();

    h.repl
        .handle_voice_event(VoiceEvent::ToolEffect(ToolEffect::Navigate(View::Projects)))?;
    h.repl.handle_voice_event(VoiceEvent::ToolEffect(ToolEffect::OpenContact))?;

    assert_eq!(h.repl.chat.current_view, View::Projects);
    assert!(h.repl.chat.contact_form_open);
    assert!(output(&h.repl).contains("Navigating to the projects page."));

    return Ok(());
}

#[tokio::test]
async fn it_toggles_the_sidebar_and_closes_the_contact_form() -> Result<()> {
    let mut h = harness();

    h.repl.handle_line("/sidebar").await?;
    assert!(!h.repl.chat.sidebar_open);
    assert!(output(&h.repl).contains("Session list hidden."));
    assert!(!h.repl.store.load().await?.sidebar_open);

    h.repl.handle_line("/close").await?;
    assert!(output(&h.repl).contains("The contact form is not open."));

    h.repl.handle_voice_event(VoiceEvent::ToolEffect(ToolEffect::OpenContact))?;
    h.repl.handle_line("/close").await?;
    assert!(!h.repl.chat.contact_form_open);
    assert!(output(&h.repl).contains("Contact form closed."));

    h.repl.store.clear().await?;
    return Ok(());
}

#[tokio::test]
async fn it_quits() -> Result<()> {
    let mut h = harness();

    assert!(!h.repl.handle_line("/quit").await?);

    return Ok(());
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use serde_json::json;
use tokio::sync::mpsc;

use super::ChatOrchestrator;
use super::ChatServices;
use crate::domain::models::BackendBox;
use crate::domain::models::BackendResponse;
use crate::domain::models::ErrorKind;
use crate::domain::models::Event;
use crate::domain::models::PersonaTone;
use crate::domain::models::Role;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolEffect;
use crate::domain::models::View;
use crate::domain::models::Widget;
use crate::domain::services::fakes::FakeBackend;
use crate::domain::services::fakes::FakeEmail;
use crate::domain::services::fakes::Script;
use crate::domain::services::PromptBuilder;
use crate::domain::services::TextCompletionOrchestrator;
use crate::domain::services::TitleGenerator;
use crate::domain::services::ToolRegistry;

fn services(backends: Vec<BackendBox>, title: Option<FakeBackend>) -> ChatServices {
    let tools = ToolRegistry::chat("Ada");
    let title_backend = title.map(|backend| {
        let boxed: BackendBox = Box::new(backend);
        return boxed;
    });

    return ChatServices {
        completion: Arc::new(TextCompletionOrchestrator::new(
            backends,
            tools.declarations(),
        )),
        titles: Arc::new(TitleGenerator::new(title_backend, None)),
        tools: Arc::new(tools),
        prompts: Arc::new(PromptBuilder::new("base", "Ada", "")),
        email: Arc::new(FakeEmail::new(true)),
    };
}

fn tool_then_text(call: &str, text: &str) -> FakeBackend {
    return FakeBackend::new(
        "primary",
        vec![
            Script::Respond(vec![
                BackendResponse::ToolCall(ToolCall::new("call_1", call, json!({}))),
                BackendResponse::Done,
            ]),
            Script::Respond(vec![
                BackendResponse::Text(text.to_string()),
                BackendResponse::Done,
            ]),
        ],
    );
}

async fn drain(
    chat: &mut ChatOrchestrator,
    rx: &mut mpsc::UnboundedReceiver<Event>,
    expect_title: bool,
) -> Result<()> {
    let mut complete = false;
    let mut titled = !expect_title;

    while !(complete && titled) {
        let event = match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await? {
            Some(event) => event,
            None => bail!("Event channel closed"),
        };
        if matches!(event, Event::TurnComplete(_)) {
            complete = true;
        }
        if matches!(event, Event::TitleGenerated(_, _)) {
            titled = true;
        }
        chat.handle_event(event);
    }

    return Ok(());
}

#[tokio::test]
async fn it_creates_a_session_and_titles_it() -> Result<()> {
    let title = FakeBackend::new("title", vec![]).with_title(Ok("Portfolio Projects".to_string()));
    let backend = FakeBackend::text("primary", "I have built a few things.");
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], Some(title)), tx);

    chat.send_message("Tell me about your projects")?;

    assert_eq!(chat.sessions.len(), 1);
    let session = chat.current_session().unwrap();
    assert_eq!(session.title, "Tell me about your projects");
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].role, Role::User);
    assert_eq!(session.messages[1].role, Role::Assistant);
    assert!(session.messages[1].content.is_empty());
    assert!(chat.is_loading());

    drain(&mut chat, &mut rx, true).await?;

    let session = chat.current_session().unwrap();
    assert_eq!(session.title, "Portfolio Projects");
    assert_eq!(session.messages[1].content, "I have built a few things.");
    assert!(!chat.is_loading());
    return Ok(());
}

#[tokio::test]
async fn it_titles_only_the_first_message() -> Result<()> {
    let title = FakeBackend::new("title", vec![]).with_title(Ok("Greetings".to_string()));
    let title_prompts = title.title_prompts.clone();
    let backend = FakeBackend::new(
        "primary",
        vec![
            Script::Respond(vec![BackendResponse::Text("Hi!".to_string())]),
            Script::Respond(vec![BackendResponse::Text("Sure.".to_string())]),
        ],
    );
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], Some(title)), tx);

    chat.send_message("Hello")?;
    drain(&mut chat, &mut rx, true).await?;
    chat.send_message("Tell me more")?;
    drain(&mut chat, &mut rx, false).await?;

    assert_eq!(title_prompts.lock().len(), 1);
    assert_eq!(chat.current_session().unwrap().title, "Greetings");
    assert_eq!(chat.current_session().unwrap().messages.len(), 4);
    return Ok(());
}

#[tokio::test]
async fn it_keeps_the_provisional_title_when_generation_fails() -> Result<()> {
    let backend = FakeBackend::text("primary", "ok");
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], None), tx);

    chat.send_message("Which distributed databases have you operated in production?")?;
    drain(&mut chat, &mut rx, false).await?;

    assert_eq!(chat.current_session().unwrap().title, "Which distributed databases ha");
    return Ok(());
}

#[tokio::test]
async fn it_tags_only_the_streaming_reply() -> Result<()> {
    let backend = tool_then_text("showProjects", "Here are a few highlights.");
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], None), tx);

    let target = chat.send_message("Show me your projects")?;
    drain(&mut chat, &mut rx, false).await?;

    let session = chat.current_session().unwrap();
    assert_eq!(session.messages[0].widget, None);
    assert_eq!(session.messages[1].id, target.message_id);
    assert_eq!(session.messages[1].widget, Some(Widget::Projects));
    assert_eq!(session.messages[1].content, "Here are a few highlights.");
    return Ok(());
}

#[tokio::test]
async fn it_applies_navigation_and_contact_effects() -> Result<()> {
    let backend = FakeBackend::new(
        "primary",
        vec![
            Script::Respond(vec![
                BackendResponse::ToolCall(ToolCall::new("a", "showAbout", json!({}))),
                BackendResponse::ToolCall(ToolCall::new("b", "openContact", json!({}))),
                BackendResponse::Done,
            ]),
            Script::Respond(vec![BackendResponse::Text("Done.".to_string())]),
        ],
    );
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], None), tx);

    chat.send_message("Who are you and how do I reach you?")?;
    drain(&mut chat, &mut rx, false).await?;

    assert_eq!(chat.current_view, View::About);
    assert!(chat.contact_form_open);
    assert_eq!(
        chat.current_session().unwrap().messages[1].widget,
        Some(Widget::Contact)
    );
    chat.close_contact_form();
    assert!(!chat.contact_form_open);
    return Ok(());
}

#[test]
fn it_applies_voice_effects_without_a_reply_to_tag() {
    let (tx, _rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![], None), tx);

    chat.apply_effect(ToolEffect::Navigate(View::Projects), None);
    assert_eq!(chat.current_view, View::Projects);

    chat.apply_effect(ToolEffect::ShowWidget(Widget::Skills), None);
    chat.apply_effect(ToolEffect::OpenContact, None);
    assert!(chat.contact_form_open);
    assert!(chat.sessions.is_empty());
}

#[tokio::test]
async fn it_writes_errors_into_the_placeholder() -> Result<()> {
    let backends: Vec<BackendBox> = vec![
        Box::new(FakeBackend::failing("a", ErrorKind::Overloaded)),
        Box::new(FakeBackend::failing("b", ErrorKind::Overloaded)),
    ];
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(backends, None), tx);

    chat.send_message("Hello?")?;
    drain(&mut chat, &mut rx, false).await?;

    let session = chat.current_session().unwrap();
    assert_eq!(
        session.messages[1].content,
        ErrorKind::Overloaded.chat_message()
    );
    assert!(!chat.is_loading());
    return Ok(());
}

#[tokio::test]
async fn it_rejects_a_second_send_while_streaming() -> Result<()> {
    let backend = FakeBackend::new(
        "primary",
        vec![
            Script::Respond(vec![BackendResponse::Text("one".to_string())]),
            Script::Respond(vec![BackendResponse::Text("two".to_string())]),
        ],
    );
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], None), tx);

    chat.send_message("first")?;
    assert!(chat.send_message("second").is_err());
    assert_eq!(chat.current_session().unwrap().messages.len(), 2);

    drain(&mut chat, &mut rx, false).await?;
    chat.send_message("second")?;
    drain(&mut chat, &mut rx, false).await?;

    let contents = chat
        .current_session()
        .unwrap()
        .messages
        .iter()
        .map(|msg| return msg.content.to_string())
        .collect::<Vec<String>>();
    assert_eq!(contents, vec!["first", "one", "second", "two"]);
    return Ok(());
}

#[tokio::test]
async fn it_keeps_streaming_into_the_original_session() -> Result<()> {
    let backend = FakeBackend::text("primary", "answer");
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], None), tx);

    let target = chat.send_message("question")?;
    let other = chat.new_session();
    drain(&mut chat, &mut rx, false).await?;

    assert_eq!(chat.current_session_id, Some(other));
    assert!(chat.current_session().unwrap().messages.is_empty());
    chat.select_session(&target.session_id)?;
    assert_eq!(chat.current_session().unwrap().messages[1].content, "answer");
    assert_eq!(chat.sessions.len(), 2);
    assert_eq!(chat.sessions[1].id, target.session_id);
    return Ok(());
}

#[tokio::test]
async fn it_drops_output_after_clearing_history() -> Result<()> {
    let backend = FakeBackend::text("primary", "late");
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], None), tx);

    chat.send_message("question")?;
    chat.clear_all_history();
    drain(&mut chat, &mut rx, false).await?;

    assert!(chat.sessions.is_empty());
    assert!(chat.current_session().is_none());
    assert!(!chat.is_loading());
    return Ok(());
}

#[tokio::test]
async fn it_restores_persisted_state() -> Result<()> {
    let backend = FakeBackend::text("primary", "hey");
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![Box::new(backend)], None), tx.clone());
    chat.set_tone(PersonaTone::Casual);
    chat.send_message("hi")?;
    drain(&mut chat, &mut rx, false).await?;
    let older = chat.current_session_id.clone();
    chat.new_session();

    let state = chat.snapshot();
    let restored = ChatOrchestrator::from_persisted(services(vec![], None), state, tx);

    assert_eq!(restored.tone, PersonaTone::Casual);
    assert_eq!(restored.sessions.len(), 2);
    assert_eq!(restored.current_session_id, chat.current_session_id);
    assert_eq!(restored.sessions[1].id, older.unwrap());
    return Ok(());
}

#[test]
fn it_rejects_unknown_sessions_and_empty_messages() {
    let (tx, _rx) = mpsc::unbounded_channel::<Event>();
    let mut chat = ChatOrchestrator::new(services(vec![], None), tx);

    assert!(chat.select_session("missing").is_err());
    assert!(chat.send_message("   ").is_err());
    assert!(chat.sessions.is_empty());
    assert!(!chat.toggle_sidebar());
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use tokio::sync::mpsc;

use super::PromptBuilder;
use super::TextCompletionOrchestrator;
use super::TitleGenerator;
use super::ToolContext;
use super::ToolRegistry;
use super::ToolRunner;
use crate::domain::models::EmailBox;
use crate::domain::models::Event;
use crate::domain::models::Message;
use crate::domain::models::PersistedState;
use crate::domain::models::PersonaTone;
use crate::domain::models::Role;
use crate::domain::models::Session;
use crate::domain::models::Theme;
use crate::domain::models::ToolEffect;
use crate::domain::models::TurnTarget;
use crate::domain::models::View;
use crate::domain::models::Widget;
use crate::domain::models::DEFAULT_SESSION_TITLE;
use crate::domain::models::SCHEMA_VERSION;

/// Shared collaborators handed to every chat worker.
#[derive(Clone)]
pub struct ChatServices {
    pub completion: Arc<TextCompletionOrchestrator>,
    pub titles: Arc<TitleGenerator>,
    pub tools: Arc<ToolRegistry>,
    pub prompts: Arc<PromptBuilder>,
    pub email: EmailBox,
}

/// Owns the session list and the chat facing UI state. Workers never touch
/// it directly, their output comes back as `Event`s through `handle_event`.
pub struct ChatOrchestrator {
    pub sessions: Vec<Session>,
    pub current_session_id: Option<String>,
    pub current_view: View,
    pub contact_form_open: bool,
    pub tone: PersonaTone,
    pub theme: Theme,
    pub sidebar_open: bool,
    in_flight: HashSet<String>,
    services: ChatServices,
    tx: mpsc::UnboundedSender<Event>,
}

impl ChatOrchestrator {
    pub fn new(services: ChatServices, tx: mpsc::UnboundedSender<Event>) -> ChatOrchestrator {
        return ChatOrchestrator::from_persisted(services, PersistedState::default(), tx);
    }

    pub fn from_persisted(
        services: ChatServices,
        state: PersistedState,
        tx: mpsc::UnboundedSender<Event>,
    ) -> ChatOrchestrator {
        let current_session_id = state.sessions.first().map(|session| {
            return session.id.to_string();
        });

        return ChatOrchestrator {
            sessions: state.sessions,
            current_session_id,
            current_view: View::Chat,
            contact_form_open: false,
            tone: state.tone,
            theme: state.theme,
            sidebar_open: state.sidebar_open,
            in_flight: HashSet::new(),
            services,
            tx,
        };
    }

    pub fn snapshot(&self) -> PersistedState {
        return PersistedState {
            version: SCHEMA_VERSION,
            sessions: self.sessions.clone(),
            tone: self.tone,
            theme: self.theme,
            sidebar_open: self.sidebar_open,
        };
    }

    pub fn current_session(&self) -> Option<&Session> {
        let id = self.current_session_id.as_ref()?;
        return self.sessions.iter().find(|session| return &session.id == id);
    }

    fn session_mut(&mut self, id: &str) -> Option<&mut Session> {
        return self.sessions.iter_mut().find(|session| return session.id == id);
    }

    /// True while the current session has a turn streaming.
    pub fn is_loading(&self) -> bool {
        return match &self.current_session_id {
            Some(id) => self.in_flight.contains(id),
            None => false,
        };
    }

    pub fn new_session(&mut self) -> String {
        let session = Session::new(DEFAULT_SESSION_TITLE);
        let id = session.id.to_string();
        self.sessions.insert(0, session);
        self.current_session_id = Some(id.to_string());
        self.current_view = View::Chat;
        tracing::info!(session_id = id, "Created chat session");
        return id;
    }

    pub fn select_session(&mut self, id: &str) -> Result<()> {
        if !self.sessions.iter().any(|session| return session.id == id) {
            bail!(format!("No session found for id {id}"));
        }
        self.current_session_id = Some(id.to_string());
        self.current_view = View::Chat;
        return Ok(());
    }

    /// Turns still streaming keep running, but their output is discarded.
    pub fn clear_all_history(&mut self) {
        self.sessions.clear();
        self.current_session_id = None;
        self.in_flight.clear();
        self.current_view = View::Chat;
        tracing::info!("Cleared all chat sessions");
    }

    pub fn set_tone(&mut self, tone: PersonaTone) {
        self.tone = tone;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn toggle_sidebar(&mut self) -> bool {
        self.sidebar_open = !self.sidebar_open;
        return self.sidebar_open;
    }

    pub fn close_contact_form(&mut self) {
        self.contact_form_open = false;
    }

    /// Appends the user message and an empty assistant placeholder, then
    /// streams the reply in the background. Returns the placeholder the
    /// reply is written into.
    pub fn send_message(&mut self, text: &str) -> Result<TurnTarget> {
        let text = text.trim().to_string();
        if text.is_empty() {
            bail!("Cannot send an empty message");
        }

        let existing = self
            .current_session()
            .map(|session| return session.id.to_string());
        let session_id = match existing {
            Some(id) => id,
            None => self.new_session(),
        };
        if self.in_flight.contains(&session_id) {
            bail!("A reply is still streaming for this session");
        }
        self.current_view = View::Chat;

        let session = match self.session_mut(&session_id) {
            Some(session) => session,
            None => bail!(format!("No session found for id {session_id}")),
        };

        let history = session.messages.clone();
        let is_first_message = session.messages.is_empty();
        if is_first_message {
            session.title = Session::provisional_title(&text);
        }
        session.messages.push(Message::new(Role::User, &text));
        let placeholder = Message::placeholder();
        let target = TurnTarget {
            session_id: session_id.to_string(),
            message_id: placeholder.id.to_string(),
        };
        session.messages.push(placeholder);
        self.in_flight.insert(session_id.to_string());

        if is_first_message {
            self.spawn_title(&session_id, &text);
        }
        self.spawn_completion(target.clone(), history, text);

        return Ok(target);
    }

    fn spawn_title(&self, session_id: &str, text: &str) {
        let titles = self.services.titles.clone();
        let tx = self.tx.clone();
        let session_id = session_id.to_string();
        let text = text.to_string();

        tokio::spawn(async move {
            if let Some(title) = titles.generate(&text).await {
                let _ = tx.send(Event::TitleGenerated(session_id, title));
            }
        });
    }

    fn spawn_completion(&self, target: TurnTarget, history: Vec<Message>, text: String) {
        let services = self.services.clone();
        let system_prompt = services.prompts.system_prompt(self.tone);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let effect_tx = tx.clone();
            let effect_target = target.clone();
            let context = ToolContext::new(
                move |effect| {
                    let _ = effect_tx.send(Event::ToolEffect(effect_target.clone(), effect));
                },
                services.email.clone(),
            );
            let runner = ToolRunner::new(services.tools.clone(), context);

            let delta_tx = tx.clone();
            let delta_target = target.clone();
            services
                .completion
                .complete(
                    &history,
                    &text,
                    &system_prompt,
                    move |delta| {
                        let _ = delta_tx.send(Event::TextDelta(delta_target.clone(), delta));
                    },
                    &runner,
                )
                .await;

            let _ = tx.send(Event::TurnComplete(target));
        });
    }

    /// Applies worker output. Events for sessions that no longer exist are
    /// dropped.
    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::TextDelta(target, text) => {
                if let Some(msg) = self.message_mut(&target) {
                    msg.append(&text);
                }
            }
            Event::ToolEffect(target, effect) => self.apply_effect(effect, Some(&target)),
            Event::TurnComplete(target) => {
                self.in_flight.remove(&target.session_id);
            }
            Event::TitleGenerated(session_id, title) => {
                if let Some(session) = self.session_mut(&session_id) {
                    tracing::debug!(session_id, title, "Generated session title");
                    session.title = title;
                }
            }
        }
    }

    /// Applies a tool effect from either channel. Widgets only land on the
    /// reply of a text turn, voice effects carry no target.
    pub fn apply_effect(&mut self, effect: ToolEffect, target: Option<&TurnTarget>) {
        let widget = match effect {
            ToolEffect::ShowWidget(widget) => Some(widget),
            ToolEffect::Navigate(view) => {
                self.current_view = view;
                None
            }
            ToolEffect::OpenContact => {
                self.contact_form_open = true;
                Some(Widget::Contact)
            }
        };

        if let (Some(widget), Some(target)) = (widget, target) {
            if let Some(msg) = self.message_mut(target) {
                msg.widget = Some(widget);
            }
        }
    }

    fn message_mut(&mut self, target: &TurnTarget) -> Option<&mut Message> {
        return self
            .session_mut(&target.session_id)?
            .message_mut(&target.message_id);
    }
}

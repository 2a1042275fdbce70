#[cfg(test)]
#[path = "repl_test.rs"]
mod tests;

use std::io::Write;
use std::str::FromStr;

use anyhow::Result;
use strum::VariantNames;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use yansi::Paint;

use crate::domain::models::help_text;
use crate::domain::models::Event;
use crate::domain::models::PersonaTone;
use crate::domain::models::Role;
use crate::domain::models::SlashCommand;
use crate::domain::models::ToolEffect;
use crate::domain::models::TurnTarget;
use crate::domain::models::VoiceEvent;
use crate::domain::services::voice::VoiceSessionController;
use crate::domain::services::ChatOrchestrator;
use crate::domain::services::SessionStore;

pub fn describe_effect(effect: &ToolEffect) -> String {
    return match effect {
        ToolEffect::OpenContact => "Opening the contact form.".to_string(),
        ToolEffect::ShowWidget(widget) => format!("Showing the {widget} panel."),
        ToolEffect::Navigate(view) => format!("Navigating to the {view} page."),
    };
}

/// Line based terminal front end. Reads user input, drives both channels and
/// writes whatever comes back.
pub struct Repl<W: Write> {
    chat: ChatOrchestrator,
    voice: VoiceSessionController,
    store: SessionStore,
    out: W,
    streaming: Option<TurnTarget>,
}

impl<W: Write> Repl<W> {
    pub fn new(
        chat: ChatOrchestrator,
        voice: VoiceSessionController,
        store: SessionStore,
        out: W,
    ) -> Repl<W> {
        return Repl {
            chat,
            voice,
            store,
            out,
            streaming: None,
        };
    }

    fn prompt(&mut self) -> Result<()> {
        if self.streaming.is_none() {
            write!(self.out, "{}", Paint::cyan("you> ").bold())?;
            self.out.flush()?;
        }
        return Ok(());
    }

    fn notice(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", Paint::new(text).dimmed())?;
        return Ok(());
    }

    fn warning(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", Paint::red(text))?;
        return Ok(());
    }

    async fn save(&self) -> Result<()> {
        return self.store.save(&self.chat.snapshot()).await;
    }

    fn print_sessions(&mut self) -> Result<()> {
        if self.chat.sessions.is_empty() {
            return self.notice("No sessions yet. Say something to start one.");
        }

        let current = self.chat.current_session_id.clone().unwrap_or_default();
        let lines = self
            .chat
            .sessions
            .iter()
            .enumerate()
            .map(|(idx, session)| {
                let marker = if session.id == current { "*" } else { " " };
                return format!("{marker} {}. {}", idx + 1, session.title);
            })
            .collect::<Vec<String>>();

        writeln!(self.out, "{}", lines.join("\n"))?;
        return Ok(());
    }

    fn print_transcript(&mut self) -> Result<()> {
        let lines = match self.chat.current_session() {
            Some(session) => session
                .messages
                .iter()
                .map(|msg| {
                    let author = match msg.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    return format!("{author}> {}", msg.content);
                })
                .collect::<Vec<String>>(),
            None => vec![],
        };

        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        return Ok(());
    }

    async fn handle_command(&mut self, cmd: SlashCommand) -> Result<bool> {
        if cmd.is_quit() {
            return Ok(false);
        }

        if cmd.is_help() {
            writeln!(self.out, "{}", help_text())?;
        } else if cmd.is_new_session() {
            self.chat.new_session();
            self.notice("Started a new session.")?;
            if self.chat.sidebar_open {
                self.print_sessions()?;
            }
        } else if cmd.is_list_sessions() {
            self.print_sessions()?;
        } else if cmd.is_select_session() {
            let id = cmd
                .index_arg()
                .and_then(|idx| return self.chat.sessions.get(idx))
                .map(|session| return session.id.to_string());
            match id {
                Some(id) => {
                    self.chat.select_session(&id)?;
                    if self.chat.sidebar_open {
                        self.print_sessions()?;
                    }
                    self.print_transcript()?;
                }
                None => self.warning("No session at that position. Run /sessions to list them.")?,
            }
        } else if cmd.is_clear_history() {
            self.chat.clear_all_history();
            self.streaming = None;
            self.store.clear().await?;
            self.notice("Deleted every session.")?;
        } else if cmd.is_tone() {
            let name = cmd.args.first().cloned().unwrap_or_default();
            match PersonaTone::from_str(&name) {
                Ok(tone) => {
                    self.chat.set_tone(tone);
                    self.save().await?;
                    self.notice(&format!("Tone set to {tone}."))?;
                    if self.voice.is_connected() {
                        if let Err(err) = self.voice.reconnect(tone).await {
                            tracing::debug!(error = ?err, "Voice reconnect failed");
                        }
                    }
                }
                Err(_) => self.warning(&format!(
                    "Unknown tone '{name}'. Possible values are: {}",
                    PersonaTone::VARIANTS.join(", ")
                ))?,
            }
        } else if cmd.is_theme() {
            let theme = self.chat.theme.toggled();
            self.chat.set_theme(theme);
            self.save().await?;
            self.notice(&format!("Theme set to {theme}."))?;
        } else if cmd.is_sidebar() {
            if self.chat.toggle_sidebar() {
                self.print_sessions()?;
            } else {
                self.notice("Session list hidden.")?;
            }
            self.save().await?;
        } else if cmd.is_close_contact() {
            if self.chat.contact_form_open {
                self.chat.close_contact_form();
                self.notice("Contact form closed.")?;
            } else {
                self.warning("The contact form is not open.")?;
            }
        } else if cmd.is_voice() {
            let tone = self.chat.tone;
            let res = if self.voice.is_connected() {
                self.voice.reconnect(tone).await
            } else {
                self.voice.connect(tone).await
            };
            // Failures also arrive as voice events.
            if let Err(err) = res {
                tracing::debug!(error = ?err, "Voice connect failed");
            }
        } else if cmd.is_mic() {
            if !self.voice.is_connected() {
                self.warning("No voice session running. Start one with /voice.")?;
            } else if self.voice.toggle_mic() {
                self.notice("Microphone muted.")?;
            } else {
                self.notice("Microphone live.")?;
            }
        } else if cmd.is_speaker() {
            if !self.voice.is_connected() {
                self.warning("No voice session running. Start one with /voice.")?;
            } else if self.voice.toggle_speaker() {
                self.notice("Speaker muted.")?;
            } else {
                self.notice("Speaker on.")?;
            }
        } else if cmd.is_hangup() {
            self.voice.disconnect();
        }

        return Ok(true);
    }

    /// Returns false once the user asked to quit.
    pub async fn handle_line(&mut self, line: &str) -> Result<bool> {
        let line = line.trim();
        if line.is_empty() {
            self.prompt()?;
            return Ok(true);
        }

        if let Some(cmd) = SlashCommand::parse(line) {
            let keep_going = self.handle_command(cmd).await?;
            if keep_going {
                self.prompt()?;
            }
            return Ok(keep_going);
        }

        if line.starts_with('/') {
            self.warning("Unknown command. Type /help for the list.")?;
            self.prompt()?;
            return Ok(true);
        }

        match self.chat.send_message(line) {
            Ok(target) => {
                write!(self.out, "{}", Paint::green("assistant> ").bold())?;
                self.out.flush()?;
                self.streaming = Some(target);
            }
            Err(err) => {
                self.warning(&err.to_string())?;
                self.prompt()?;
            }
        }

        return Ok(true);
    }

    pub async fn handle_event(&mut self, event: Event) -> Result<()> {
        let is_current = |target: &TurnTarget, streaming: &Option<TurnTarget>| {
            return streaming.as_ref() == Some(target);
        };

        let mut turn_finished = false;
        match &event {
            Event::TextDelta(target, text) => {
                if is_current(target, &self.streaming) {
                    write!(self.out, "{text}")?;
                    self.out.flush()?;
                }
            }
            Event::ToolEffect(target, effect) => {
                if is_current(target, &self.streaming) {
                    writeln!(self.out)?;
                    self.notice(&describe_effect(effect))?;
                }
            }
            Event::TurnComplete(target) => {
                if is_current(target, &self.streaming) {
                    writeln!(self.out)?;
                    self.streaming = None;
                    turn_finished = true;
                }
            }
            Event::TitleGenerated(_, _) => {}
        }

        let should_save = matches!(event, Event::TurnComplete(_) | Event::TitleGenerated(_, _));
        self.chat.handle_event(event);

        if should_save {
            self.save().await?;
        }
        if turn_finished {
            self.prompt()?;
        }

        return Ok(());
    }

    pub fn handle_voice_event(&mut self, event: VoiceEvent) -> Result<()> {
        match event {
            VoiceEvent::State(state) => self.notice(&format!("[voice: {state}]"))?,
            VoiceEvent::Volume(_) => {}
            VoiceEvent::Error(err) => {
                self.warning(&format!("Voice error: {}", err.message))?;
                if err.can_retry {
                    self.notice("Run /voice to try again.")?;
                }
            }
            VoiceEvent::ToolEffect(effect) => {
                self.notice(&describe_effect(&effect))?;
                self.chat.apply_effect(effect, None);
            }
        }

        return Ok(());
    }

    /// Reads stdin until EOF or `/quit`, then hangs up and saves.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut voice_events: mpsc::UnboundedReceiver<VoiceEvent>,
    ) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        writeln!(
            self.out,
            "{}",
            Paint::new("Ask anything about the portfolio. Type /help for commands.").dimmed()
        )?;
        self.prompt()?;

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let line = match line? {
                        Some(line) => line,
                        None => break,
                    };
                    if !self.handle_line(&line).await? {
                        break;
                    }
                }
                Some(event) = events.recv() => self.handle_event(event).await?,
                Some(event) = voice_events.recv() => self.handle_voice_event(event)?,
            }
        }

        self.voice.disconnect();
        self.save().await?;
        tracing::info!("Chat finished");

        return Ok(());
    }
}

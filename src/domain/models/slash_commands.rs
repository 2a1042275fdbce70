#[cfg(test)]
#[path = "slash_commands_test.rs"]
mod tests;

pub struct SlashCommand {
    command: String,
    pub args: Vec<String>,
}

impl SlashCommand {
    pub fn parse(text: &str) -> Option<SlashCommand> {
        let mut args = text
            .split_whitespace()
            .map(|e| return e.to_string())
            .collect::<Vec<String>>();
        if args.is_empty() {
            return None;
        }
        let prefix = args.remove(0);

        let cmd = SlashCommand {
            command: prefix,
            args,
        };
        if cmd.is_quit()
            || cmd.is_help()
            || cmd.is_new_session()
            || cmd.is_list_sessions()
            || cmd.is_select_session()
            || cmd.is_clear_history()
            || cmd.is_tone()
            || cmd.is_theme()
            || cmd.is_sidebar()
            || cmd.is_close_contact()
            || cmd.is_voice()
            || cmd.is_mic()
            || cmd.is_speaker()
            || cmd.is_hangup()
        {
            return Some(cmd);
        }

        return None;
    }

    pub fn is_quit(&self) -> bool {
        return ["/q", "/quit", "/exit"].contains(&self.command.as_str());
    }

    pub fn is_help(&self) -> bool {
        return ["/h", "/help"].contains(&self.command.as_str());
    }

    pub fn is_new_session(&self) -> bool {
        return ["/n", "/new"].contains(&self.command.as_str());
    }

    pub fn is_list_sessions(&self) -> bool {
        return ["/s", "/sessions"].contains(&self.command.as_str());
    }

    pub fn is_select_session(&self) -> bool {
        return self.command == "/select" && self.args.len() == 1;
    }

    pub fn is_clear_history(&self) -> bool {
        return self.command == "/clear";
    }

    pub fn is_tone(&self) -> bool {
        return self.command == "/tone" && self.args.len() == 1;
    }

    pub fn is_theme(&self) -> bool {
        return self.command == "/theme";
    }

    pub fn is_sidebar(&self) -> bool {
        return self.command == "/sidebar";
    }

    pub fn is_close_contact(&self) -> bool {
        return self.command == "/close";
    }

    pub fn is_voice(&self) -> bool {
        return ["/v", "/voice"].contains(&self.command.as_str());
    }

    pub fn is_mic(&self) -> bool {
        return self.command == "/mic";
    }

    pub fn is_speaker(&self) -> bool {
        return self.command == "/speaker";
    }

    pub fn is_hangup(&self) -> bool {
        return self.command == "/hangup";
    }

    /// One based index argument of `/select`, as a zero based position.
    pub fn index_arg(&self) -> Option<usize> {
        let idx = self.args.first()?.parse::<usize>().ok()?;
        if idx == 0 {
            return None;
        }
        return Some(idx - 1);
    }
}

pub fn help_text() -> String {
    let text = r#"
COMMANDS:
- /new (/n) - Start a new chat session.
- /sessions (/s) - List chat sessions, newest first.
- /select [NUMBER] - Switch to the session at the listed position.
- /clear - Delete every chat session.
- /tone [professional|technical|casual] - Change how the assistant talks.
- /theme - Switch between light and dark.
- /sidebar - Show or hide the session list after switching sessions.
- /close - Dismiss the contact form.
- /voice (/v) - Start a voice conversation. Run again to reconnect.
- /mic - Mute or unmute the microphone.
- /speaker - Mute or unmute the assistant's voice.
- /hangup - End the voice conversation.
- /quit /exit (/q) - Exit.
- /help (/h) - Provides this help menu.
        "#;

    return text.trim().to_string();
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::models::EmailBox;
use crate::domain::models::EmailPayload;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolDeclaration;
use crate::domain::models::ToolEffect;
use crate::domain::models::ToolExecutor;
use crate::domain::models::ToolFormat;
use crate::domain::models::View;
use crate::domain::models::Widget;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ToolAction {
    Effect(ToolEffect),
    SendEmail,
}

struct ToolEntry {
    declaration: ToolDeclaration,
    action: ToolAction,
    /// Result reported back to the model once the effect is applied.
    confirmation: String,
    /// Result when the email relay refuses the message.
    failure: String,
}

/// What a handler may touch while running. Effects are forwarded to the
/// owner of the view state, email goes through the configured transport.
pub struct ToolContext {
    on_effect: Box<dyn Fn(ToolEffect) + Send + Sync>,
    email: EmailBox,
}

impl ToolContext {
    pub fn new<F>(on_effect: F, email: EmailBox) -> ToolContext
    where
        F: Fn(ToolEffect) + Send + Sync + 'static,
    {
        return ToolContext {
            on_effect: Box::new(on_effect),
            email,
        };
    }
}

/// Fixed set of tools the models may call, keyed by name.
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

fn owner_label(owner_name: &str) -> String {
    if owner_name.trim().is_empty() {
        return "the portfolio owner".to_string();
    }
    return owner_name.trim().to_string();
}

fn send_message_declaration(owner: &str) -> ToolDeclaration {
    return ToolDeclaration::new(
        "sendMessage",
        &format!("Send an email message to {owner}. Use this when the user provides specific message content to send."),
    )
    .with_parameter("name", "The name of the sender.")
    .with_parameter("email", "The email address of the sender.")
    .with_parameter("message", "The message content.");
}

impl ToolRegistry {
    fn new() -> ToolRegistry {
        return ToolRegistry {
            entries: vec![],
            index: HashMap::new(),
        };
    }

    fn register(
        mut self,
        declaration: ToolDeclaration,
        action: ToolAction,
        confirmation: &str,
        failure: &str,
    ) -> ToolRegistry {
        self.index
            .insert(declaration.name.to_string(), self.entries.len());
        self.entries.push(ToolEntry {
            declaration,
            action,
            confirmation: confirmation.to_string(),
            failure: failure.to_string(),
        });
        return self;
    }

    /// Tools offered to the text providers. `show*` tools tag the reply they
    /// were called from with a widget.
    pub fn chat(owner_name: &str) -> ToolRegistry {
        let owner = owner_label(owner_name);

        return ToolRegistry::new()
            .register(
                ToolDeclaration::new(
                    "openContact",
                    &format!("Open the contact form modal. Use this when the user wants to book a meeting or contact or message {owner}."),
                ),
                ToolAction::Effect(ToolEffect::OpenContact),
                "Opened the contact/booking form.",
                "",
            )
            .register(
                send_message_declaration(&owner),
                ToolAction::SendEmail,
                &format!("Email sent successfully to {owner}."),
                "Failed to send email due to a technical error.",
            )
            .register(
                ToolDeclaration::new(
                    "showProjects",
                    &format!("Display {owner}'s projects in a visual card format. Use this when the user asks to see projects, portfolio, or work examples."),
                ),
                ToolAction::Effect(ToolEffect::ShowWidget(Widget::Projects)),
                "Displayed the projects widget.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showExperience",
                    &format!("Display {owner}'s professional experience timeline. Use this when the user asks about work history or experience."),
                ),
                ToolAction::Effect(ToolEffect::ShowWidget(Widget::Experience)),
                "Displayed the experience timeline widget.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showAbout",
                    &format!("Navigate to the About/Skills page. Use this when the user asks about {owner}'s profile or wants to see the about page."),
                ),
                ToolAction::Effect(ToolEffect::Navigate(View::About)),
                "Displayed the About page.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showSkills",
                    &format!("Display {owner}'s technical skills and expertise. Use this when the user asks about skills, stack, or technologies."),
                ),
                ToolAction::Effect(ToolEffect::ShowWidget(Widget::Skills)),
                "Displayed the skills widget.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showStory",
                    &format!("Display {owner}'s personal story and journey as a timeline. Use this when the user asks about their story, journey, background, or how they started."),
                ),
                ToolAction::Effect(ToolEffect::ShowWidget(Widget::Story)),
                "Displayed the personal story widget.",
                "",
            );
    }

    /// Tools offered over the realtime voice channel. There are no chat
    /// bubbles to tag, so `show*` tools switch whole pages instead.
    pub fn voice(owner_name: &str) -> ToolRegistry {
        let owner = owner_label(owner_name);

        return ToolRegistry::new()
            .register(
                ToolDeclaration::new(
                    "openContact",
                    &format!("Open the contact form modal. Use this when the user wants to book a meeting or contact or send a message to {owner}."),
                ),
                ToolAction::Effect(ToolEffect::OpenContact),
                "Opened the contact form.",
                "",
            )
            .register(
                send_message_declaration(&owner),
                ToolAction::SendEmail,
                "Email sent successfully.",
                "Failed to send email.",
            )
            .register(
                ToolDeclaration::new(
                    "showProjects",
                    &format!("Display {owner}'s projects on the screen. Use this when the user asks to see projects or work."),
                ),
                ToolAction::Effect(ToolEffect::Navigate(View::Projects)),
                "Showing projects page.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showExperience",
                    &format!("Display {owner}'s experience on the screen. Use this when the user asks about work history or career."),
                ),
                ToolAction::Effect(ToolEffect::Navigate(View::Experience)),
                "Showing experience page.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showServices",
                    &format!("Display {owner}'s services on the screen. Use this when the user asks what services {owner} offers or can help with."),
                ),
                ToolAction::Effect(ToolEffect::Navigate(View::Services)),
                "Showing services page.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showAbout",
                    &format!("Display the About page with {owner}'s skills and background. Use this when the user wants to know more about {owner}."),
                ),
                ToolAction::Effect(ToolEffect::Navigate(View::About)),
                "Showing about page.",
                "",
            )
            .register(
                ToolDeclaration::new(
                    "showStory",
                    &format!("Navigate to the story page. Use this when the user asks about {owner}'s full story, biography, or journey."),
                ),
                ToolAction::Effect(ToolEffect::Navigate(View::Story)),
                "Showing story page.",
                "",
            );
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        return self
            .entries
            .iter()
            .map(|entry| return entry.declaration.clone())
            .collect();
    }

    pub fn list_declarations(&self, format: ToolFormat) -> Value {
        return format.render(&self.declarations());
    }

    /// Runs a single call. Unknown names resolve to a result string instead
    /// of an error so the model can recover on its own.
    pub async fn execute(&self, call: &ToolCall, context: &ToolContext) -> Result<String> {
        let entry = match self.index.get(&call.name) {
            Some(idx) => &self.entries[*idx],
            None => {
                tracing::warn!(name = %call.name, "Model called an unknown tool");
                return Ok(format!("Unknown tool: {}", call.name));
            }
        };

        tracing::info!(name = %call.name, id = %call.id, "Executing tool");

        match entry.action {
            ToolAction::Effect(effect) => {
                (context.on_effect)(effect);
            }
            ToolAction::SendEmail => {
                let payload: EmailPayload = serde_json::from_value(call.args.clone())?;
                if !context.email.send(&payload).await {
                    tracing::error!(name = %call.name, "Email relay rejected the message");
                    return Ok(entry.failure.to_string());
                }
            }
        }

        return Ok(entry.confirmation.to_string());
    }
}

/// Binds a registry to the context of one turn.
pub struct ToolRunner {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
}

impl ToolRunner {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> ToolRunner {
        return ToolRunner { registry, context };
    }
}

#[async_trait]
impl ToolExecutor for ToolRunner {
    async fn execute(&self, call: &ToolCall) -> Result<String> {
        return self.registry.execute(call, &self.context).await;
    }
}

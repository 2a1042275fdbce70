#[cfg(test)]
#[path = "backend_test.rs"]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use strum::EnumIter;
use strum::EnumString;
use strum::EnumVariantNames;
use tokio::sync::mpsc;

use super::Message;
use super::ProviderError;
use super::ToolCall;
use super::ToolContinuation;
use super::ToolDeclaration;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, EnumString, EnumVariantNames, strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum BackendName {
    OpenAI,
    Gemini,
}

impl BackendName {
    pub fn parse(text: &str) -> Option<BackendName> {
        return text.parse::<BackendName>().ok();
    }
}

/// One provider request. Identical prompts are replayed across the fallback
/// cascade, so nothing in here is provider specific.
#[derive(Clone, Debug, PartialEq)]
pub struct BackendPrompt {
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub text: String,
    pub tools: Vec<ToolDeclaration>,
    pub continuation: Option<ToolContinuation>,
}

impl BackendPrompt {
    pub fn new(
        system_prompt: &str,
        history: &[Message],
        text: &str,
        tools: &[ToolDeclaration],
    ) -> BackendPrompt {
        return BackendPrompt {
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            text: text.to_string(),
            tools: tools.to_vec(),
            continuation: None,
        };
    }

    pub fn with_continuation(&self, continuation: ToolContinuation) -> BackendPrompt {
        let mut prompt = self.clone();
        prompt.continuation = Some(continuation);
        return prompt;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendResponse {
    Text(String),
    ToolCall(ToolCall),
    Done,
}

#[async_trait]
pub trait Backend {
    fn name(&self) -> BackendName;

    fn model(&self) -> String;

    /// Used at startup to verify all configurations are available to work with
    /// the backend.
    async fn health_check(&self) -> Result<()>;

    /// Streams a completion back through the channel. Text arrives as it is
    /// generated, tool calls once fully assembled, and `Done` closes the
    /// phase. When the prompt carries a continuation the provider is expected
    /// to answer with text only.
    async fn get_completion<'a>(
        &self,
        prompt: &BackendPrompt,
        tx: &'a mpsc::UnboundedSender<BackendResponse>,
    ) -> Result<(), ProviderError>;

    /// Single shot, non streaming generation used for session titles.
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError>;
}

pub type BackendBox = Box<dyn Backend + Send + Sync>;

/// Position in the ordered provider list for a single turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FallbackCursor {
    position: usize,
    len: usize,
}

impl FallbackCursor {
    pub fn new(len: usize) -> FallbackCursor {
        return FallbackCursor { position: 0, len };
    }

    pub fn position(&self) -> usize {
        return self.position;
    }

    pub fn is_last(&self) -> bool {
        return self.position + 1 >= self.len;
    }

    /// Moves to the next provider. Returns false once the list is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.is_last() {
            return false;
        }
        self.position += 1;
        return true;
    }
}

#[cfg(test)]
#[path = "completion_test.rs"]
mod tests;

use tokio::sync::mpsc;

use crate::domain::models::classify;
use crate::domain::models::BackendBox;
use crate::domain::models::BackendPrompt;
use crate::domain::models::BackendResponse;
use crate::domain::models::ErrorKind;
use crate::domain::models::FallbackCursor;
use crate::domain::models::Message;
use crate::domain::models::ProviderError;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolContinuation;
use crate::domain::models::ToolDeclaration;
use crate::domain::models::ToolExecutor;
use crate::domain::models::ToolOutcome;
use crate::domain::models::ToolResult;
use crate::domain::models::TOOL_FAILURE_RESULT;

struct PhaseOutcome {
    result: Result<(), ProviderError>,
    tool_calls: Vec<ToolCall>,
    emitted_text: bool,
}

struct TurnFailure {
    error: ProviderError,
    /// False once anything visible happened, replaying the turn elsewhere
    /// would duplicate text or side effects.
    can_cascade: bool,
}

/// Streams one backend request, forwarding text as it arrives and collecting
/// tool calls until the backend finishes.
async fn stream_phase<F>(
    backend: &BackendBox,
    prompt: &BackendPrompt,
    on_text_delta: &mut F,
) -> PhaseOutcome
where
    F: FnMut(String) + Send,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<BackendResponse>();
    let mut tool_calls: Vec<ToolCall> = vec![];
    let mut emitted_text = false;

    let request = async move {
        let res = backend.get_completion(prompt, &tx).await;
        drop(tx);
        return res;
    };

    let drain = async {
        while let Some(res) = rx.recv().await {
            match res {
                BackendResponse::Text(text) => {
                    if text.is_empty() {
                        continue;
                    }
                    emitted_text = true;
                    on_text_delta(text);
                }
                BackendResponse::ToolCall(call) => {
                    tracing::debug!(name = %call.name, id = %call.id, "Received tool call");
                    tool_calls.push(call);
                }
                BackendResponse::Done => {}
            }
        }
    };

    let (result, _) = tokio::join!(request, drain);

    return PhaseOutcome {
        result,
        tool_calls,
        emitted_text,
    };
}

/// Drives a single user turn against an ordered list of providers.
pub struct TextCompletionOrchestrator {
    backends: Vec<BackendBox>,
    tools: Vec<ToolDeclaration>,
}

impl TextCompletionOrchestrator {
    pub fn new(backends: Vec<BackendBox>, tools: Vec<ToolDeclaration>) -> TextCompletionOrchestrator {
        return TextCompletionOrchestrator { backends, tools };
    }

    pub fn backends(&self) -> &[BackendBox] {
        return &self.backends;
    }

    /// Never fails. Every outcome, including total provider failure, ends up
    /// as text passed to `on_text_delta`.
    pub async fn complete<F>(
        &self,
        history: &[Message],
        user_message: &str,
        system_prompt: &str,
        mut on_text_delta: F,
        tool_executor: &dyn ToolExecutor,
    ) where
        F: FnMut(String) + Send,
    {
        if self.backends.is_empty() {
            tracing::error!("No text completion backends are configured");
            on_text_delta(ErrorKind::AuthConfigError.chat_message().to_string());
            return;
        }

        let history = history
            .iter()
            .filter(|msg| return !msg.is_empty())
            .cloned()
            .collect::<Vec<Message>>();
        let prompt = BackendPrompt::new(system_prompt, &history, user_message, &self.tools);
        let mut cursor = FallbackCursor::new(self.backends.len());

        loop {
            let backend = &self.backends[cursor.position()];
            tracing::info!(
                backend = %backend.name(),
                model = %backend.model(),
                tier = cursor.position() + 1,
                "Requesting completion"
            );

            let failure = match run_turn(backend, &prompt, &mut on_text_delta, tool_executor).await
            {
                Ok(()) => return,
                Err(failure) => failure,
            };

            tracing::error!(
                backend = %backend.name(),
                model = %backend.model(),
                kind = %failure.error.kind,
                status = ?failure.error.status,
                error = %failure.error.message,
                "Completion failed"
            );

            if failure.can_cascade && classify(&failure.error).retryable && cursor.advance() {
                tracing::info!(tier = cursor.position() + 1, "Falling back to next backend");
                continue;
            }

            on_text_delta(failure.error.kind.chat_message().to_string());
            return;
        }
    }
}

async fn run_turn<F>(
    backend: &BackendBox,
    prompt: &BackendPrompt,
    on_text_delta: &mut F,
    tool_executor: &dyn ToolExecutor,
) -> Result<(), TurnFailure>
where
    F: FnMut(String) + Send,
{
    let phase = stream_phase(backend, prompt, on_text_delta).await;
    if let Err(error) = phase.result {
        return Err(TurnFailure {
            error,
            can_cascade: !phase.emitted_text,
        });
    }

    if phase.tool_calls.is_empty() {
        return Ok(());
    }

    let calls = phase.tool_calls;
    let mut results: Vec<ToolResult> = vec![];
    for call in calls.iter() {
        let outcome = match tool_executor.execute(call).await {
            Ok(result) => ToolOutcome::Success(result),
            Err(err) => {
                tracing::warn!(name = %call.name, error = ?err, "Tool execution failed");
                ToolOutcome::Failure(TOOL_FAILURE_RESULT.to_string())
            }
        };
        results.push(ToolResult::new(call, outcome));
    }

    let continuation = prompt.with_continuation(ToolContinuation { calls, results });
    let phase = stream_phase(backend, &continuation, on_text_delta).await;
    if !phase.tool_calls.is_empty() {
        tracing::warn!(
            count = phase.tool_calls.len(),
            "Ignoring tool calls requested during a continuation"
        );
    }

    return phase.result.map_err(|error| {
        return TurnFailure {
            error,
            can_cascade: false,
        };
    });
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::BackendPrompt;
use crate::domain::models::BackendResponse;
use crate::domain::models::ProviderError;
use crate::domain::models::Role;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolFormat;

const TEMPERATURE: f32 = 0.7;

fn convert_err(err: reqwest::Error) -> std::io::Error {
    let err_msg = err.to_string();
    return std::io::Error::new(std::io::ErrorKind::Interrupted, err_msg);
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FunctionRequest {
    name: String,
    /// JSON encoded arguments.
    arguments: String,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ToolCallRequest {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: FunctionRequest,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MessageRequest {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl MessageRequest {
    fn text(role: &str, content: &str) -> MessageRequest {
        return MessageRequest {
            role: role.to_string(),
            content: Some(content.to_string()),
            ..Default::default()
        };
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<MessageRequest>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionDeltaResponse {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionChoiceResponse {
    #[serde(default)]
    delta: CompletionDeltaResponse,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoiceResponse>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GeneratedMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GeneratedChoice {
    message: GeneratedMessage,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GeneratedResponse {
    #[serde(default)]
    choices: Vec<GeneratedChoice>,
}

/// Tool call fragments streamed under the same index.
#[derive(Default, Debug)]
struct PendingToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCall {
    fn into_call(self, index: usize) -> ToolCall {
        let args = if self.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.arguments).unwrap_or_else(|err| {
                tracing::warn!(error = ?err, name = %self.name, "Tool call arguments are not valid JSON");
                return Value::Null;
            })
        };

        let id = if self.id.is_empty() {
            ToolCall::fallback_id(index)
        } else {
            self.id
        };

        return ToolCall::new(&id, &self.name, args);
    }
}

fn build_messages(prompt: &BackendPrompt) -> Vec<MessageRequest> {
    let mut messages = vec![MessageRequest::text("system", &prompt.system_prompt)];

    for msg in prompt.history.iter() {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(MessageRequest::text(role, &msg.content));
    }
    messages.push(MessageRequest::text("user", &prompt.text));

    if let Some(continuation) = &prompt.continuation {
        let tool_calls = continuation
            .calls
            .iter()
            .map(|call| {
                return ToolCallRequest {
                    id: call.id.to_string(),
                    kind: "function".to_string(),
                    function: FunctionRequest {
                        name: call.name.to_string(),
                        arguments: call.args.to_string(),
                    },
                };
            })
            .collect::<Vec<ToolCallRequest>>();

        messages.push(MessageRequest {
            role: "assistant".to_string(),
            tool_calls: Some(tool_calls),
            ..Default::default()
        });

        for result in continuation.results.iter() {
            messages.push(MessageRequest {
                role: "tool".to_string(),
                content: Some(result.outcome.to_json().to_string()),
                tool_call_id: Some(result.call_id.to_string()),
                ..Default::default()
            });
        }
    }

    return messages;
}

pub struct OpenAI {
    url: String,
    token: String,
    model: String,
    timeout: String,
}

impl Default for OpenAI {
    fn default() -> OpenAI {
        return OpenAI {
            url: Config::get(ConfigKey::OpenAiURL),
            token: Config::get(ConfigKey::OpenAiToken),
            model: Config::get(ConfigKey::OpenAiModel),
            timeout: Config::get(ConfigKey::BackendHealthCheckTimeout),
        };
    }
}

impl OpenAI {
    pub fn with_model(mut self, model: &str) -> OpenAI {
        self.model = model.to_string();
        return self;
    }

    pub fn is_configured(&self) -> bool {
        return !self.token.is_empty();
    }

    async fn post(&self, req: &CompletionRequest) -> Result<reqwest::Response, ProviderError> {
        let res = reqwest::Client::new()
            .post(format!("{url}/v1/chat/completions", url = self.url))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(req)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = body,
                "Failed to make completion request to OpenAI"
            );
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        return Ok(res);
    }
}

#[async_trait]
impl Backend for OpenAI {
    fn name(&self) -> BackendName {
        return BackendName::OpenAI;
    }

    fn model(&self) -> String {
        return self.model.to_string();
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("OpenAI URL is not defined");
        }
        if self.token.is_empty() {
            bail!("OpenAI token is not defined");
        }

        // The official API answers its index with a 404 or a 418, so only
        // proxies are checked.
        if self.url == "https://api.openai.com" {
            return Ok(());
        }

        let res = reqwest::Client::new()
            .get(&self.url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        let status = match res {
            Ok(res) => res.status().as_u16(),
            Err(err) => {
                tracing::error!(error = ?err, "OpenAI is not reachable");
                bail!("OpenAI is not reachable");
            }
        };

        if status >= 500 {
            tracing::error!(status = status, "OpenAI health check failed");
            bail!("OpenAI health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn get_completion<'a>(
        &self,
        prompt: &BackendPrompt,
        tx: &'a mpsc::UnboundedSender<BackendResponse>,
    ) -> Result<(), ProviderError> {
        // Continuations answer with text only.
        let tools = if prompt.continuation.is_none() && !prompt.tools.is_empty() {
            Some(ToolFormat::OpenAi.render(&prompt.tools))
        } else {
            None
        };

        let req = CompletionRequest {
            model: self.model.to_string(),
            messages: build_messages(prompt),
            stream: true,
            temperature: TEMPERATURE,
            tools,
        };
        tracing::debug!(body = ?req, "Completion request");

        let res = self.post(&req).await?;
        let stream = res.bytes_stream().map_err(convert_err);
        let mut lines_reader = StreamReader::new(stream).lines();

        let mut pending: BTreeMap<usize, PendingToolCall> = BTreeMap::new();
        while let Some(line) = lines_reader.next_line().await? {
            let mut cleaned_line = line.trim().to_string();
            if !cleaned_line.starts_with("data:") {
                continue;
            }
            cleaned_line = cleaned_line.split_off(5).trim().to_string();
            if cleaned_line.is_empty() {
                continue;
            }
            if cleaned_line == "[DONE]" {
                break;
            }

            let ores: CompletionResponse = match serde_json::from_str(&cleaned_line) {
                Ok(ores) => ores,
                Err(err) => {
                    tracing::warn!(error = ?err, line = cleaned_line, "Skipping stream line");
                    continue;
                }
            };
            tracing::debug!(body = ?ores, "Completion response");

            for choice in ores.choices {
                if let Some(text) = choice.delta.content {
                    if !text.is_empty() {
                        let _ = tx.send(BackendResponse::Text(text));
                    }
                }

                for delta in choice.delta.tool_calls.unwrap_or_default() {
                    let entry = pending.entry(delta.index).or_default();
                    if let Some(id) = delta.id {
                        entry.id = id;
                    }
                    if let Some(function) = delta.function {
                        entry.name += &function.name.unwrap_or_default();
                        entry.arguments += &function.arguments.unwrap_or_default();
                    }
                }
            }
        }

        for (index, call) in pending {
            let _ = tx.send(BackendResponse::ToolCall(call.into_call(index)));
        }
        let _ = tx.send(BackendResponse::Done);

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        let req = CompletionRequest {
            model: self.model.to_string(),
            messages: vec![MessageRequest::text("user", prompt)],
            stream: false,
            temperature: TEMPERATURE,
            tools: None,
        };

        let res = self.post(&req).await?.json::<GeneratedResponse>().await?;
        let text = res
            .choices
            .into_iter()
            .next()
            .and_then(|choice| return choice.message.content)
            .unwrap_or_default();

        return Ok(text);
    }
}

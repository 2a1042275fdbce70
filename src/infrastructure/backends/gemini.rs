#[cfg(test)]
#[path = "gemini_test.rs"]
mod tests;

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

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionResponsePart {
    name: String,
    response: Value,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponsePart>,
}

impl Part {
    fn text(text: &str) -> Part {
        return Part {
            text: Some(text.to_string()),
            ..Default::default()
        };
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn new(role: &str, parts: Vec<Part>) -> Content {
        return Content {
            role: role.to_string(),
            parts,
        };
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Value>,
    generation_config: GenerationConfig,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

impl GenerateContentResponse {
    fn into_parts(self) -> Vec<Part> {
        return self
            .candidates
            .into_iter()
            .filter_map(|candidate| return candidate.content)
            .flat_map(|content| return content.parts)
            .collect();
    }
}

fn api_error(err: &ApiError) -> ProviderError {
    let body = format!("{} {}", err.status, err.message);
    if err.code == 0 {
        return ProviderError::from_message(body.trim());
    }
    return ProviderError::from_status(err.code, body.trim());
}

fn build_contents(prompt: &BackendPrompt) -> Vec<Content> {
    let mut contents = prompt
        .history
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            return Content::new(role, vec![Part::text(&msg.content)]);
        })
        .collect::<Vec<Content>>();
    contents.push(Content::new("user", vec![Part::text(&prompt.text)]));

    if let Some(continuation) = &prompt.continuation {
        let calls = continuation
            .calls
            .iter()
            .map(|call| {
                return Part {
                    function_call: Some(FunctionCallPart {
                        name: call.name.to_string(),
                        args: call.args.clone(),
                    }),
                    ..Default::default()
                };
            })
            .collect::<Vec<Part>>();
        contents.push(Content::new("model", calls));

        let responses = continuation
            .results
            .iter()
            .map(|result| {
                return Part {
                    function_response: Some(FunctionResponsePart {
                        name: result.name.to_string(),
                        response: result.outcome.to_json(),
                    }),
                    ..Default::default()
                };
            })
            .collect::<Vec<Part>>();
        contents.push(Content::new("user", responses));
    }

    return contents;
}

pub struct Gemini {
    url: String,
    token: String,
    model: String,
    timeout: String,
}

impl Default for Gemini {
    fn default() -> Gemini {
        let model = Config::get_list(ConfigKey::GeminiModels)
            .into_iter()
            .next()
            .unwrap_or_default();
        return Gemini::with_model(&model);
    }
}

impl Gemini {
    pub fn with_model(model: &str) -> Gemini {
        return Gemini {
            url: Config::get(ConfigKey::GeminiURL),
            token: Config::get(ConfigKey::GeminiToken),
            model: model.to_string(),
            timeout: Config::get(ConfigKey::BackendHealthCheckTimeout),
        };
    }

    async fn post(
        &self,
        req: &CompletionRequest,
        streaming: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut url = format!(
            "{url}/v1beta/models/{model}:generateContent?key={key}",
            url = self.url,
            model = self.model,
            key = self.token
        );
        if streaming {
            url = format!(
                "{url}/v1beta/models/{model}:streamGenerateContent?alt=sse&key={key}",
                url = self.url,
                model = self.model,
                key = self.token
            );
        }

        let res = reqwest::Client::new().post(url).json(req).send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                model = self.model,
                body = body,
                "Failed to make completion request to Gemini"
            );
            return Err(ProviderError::from_status(status.as_u16(), &body));
        }

        return Ok(res);
    }
}

#[async_trait]
impl Backend for Gemini {
    fn name(&self) -> BackendName {
        return BackendName::Gemini;
    }

    fn model(&self) -> String {
        return self.model.to_string();
    }

    #[allow(clippy::implicit_return)]
    async fn health_check(&self) -> Result<()> {
        if self.url.is_empty() {
            bail!("Gemini URL is not defined");
        }
        if self.token.is_empty() {
            bail!("Gemini token is not defined");
        }

        let url = format!(
            "{url}/v1beta/models/{model}?key={key}",
            url = self.url,
            model = self.model,
            key = self.token
        );

        let res = reqwest::Client::new()
            .get(&url)
            .timeout(Duration::from_millis(self.timeout.parse::<u64>()?))
            .send()
            .await;

        let status = match res {
            Ok(res) => res.status().as_u16(),
            Err(err) => {
                tracing::error!(error = ?err, "Gemini is not reachable");
                bail!("Gemini is not reachable");
            }
        };

        if status >= 400 {
            tracing::error!(status = status, model = self.model, "Gemini health check failed");
            bail!("Gemini health check failed");
        }

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn get_completion<'a>(
        &self,
        prompt: &BackendPrompt,
        tx: &'a mpsc::UnboundedSender<BackendResponse>,
    ) -> Result<(), ProviderError> {
        let tools = if !prompt.tools.is_empty() {
            Some(ToolFormat::Gemini.render(&prompt.tools))
        } else {
            None
        };

        let req = CompletionRequest {
            system_instruction: Some(Content::new("", vec![Part::text(&prompt.system_prompt)])),
            contents: build_contents(prompt),
            tools,
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };
        tracing::debug!(body = ?req, "Completion request");

        let res = self.post(&req, true).await?;
        let stream = res.bytes_stream().map_err(convert_err);
        let mut lines_reader = StreamReader::new(stream).lines();

        let mut call_count = 0;
        while let Some(line) = lines_reader.next_line().await? {
            let mut cleaned_line = line.trim().to_string();
            if !cleaned_line.starts_with("data:") {
                continue;
            }
            cleaned_line = cleaned_line.split_off(5).trim().to_string();
            if cleaned_line.is_empty() {
                continue;
            }

            let ores: GenerateContentResponse = match serde_json::from_str(&cleaned_line) {
                Ok(ores) => ores,
                Err(err) => {
                    tracing::warn!(error = ?err, line = cleaned_line, "Skipping stream line");
                    continue;
                }
            };
            tracing::debug!(body = ?ores, "Completion response");

            if let Some(err) = &ores.error {
                return Err(api_error(err));
            }

            for part in ores.into_parts() {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        let _ = tx.send(BackendResponse::Text(text));
                    }
                }
                if let Some(function_call) = part.function_call {
                    let id = ToolCall::fallback_id(call_count);
                    call_count += 1;
                    let _ = tx.send(BackendResponse::ToolCall(ToolCall::new(
                        &id,
                        &function_call.name,
                        function_call.args,
                    )));
                }
            }
        }

        let _ = tx.send(BackendResponse::Done);

        return Ok(());
    }

    #[allow(clippy::implicit_return)]
    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        let req = CompletionRequest {
            system_instruction: None,
            contents: vec![Content::new("user", vec![Part::text(prompt)])],
            tools: None,
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        let res = self
            .post(&req, false)
            .await?
            .json::<GenerateContentResponse>()
            .await?;

        if let Some(err) = &res.error {
            return Err(api_error(err));
        }

        let text = res
            .into_parts()
            .into_iter()
            .filter_map(|part| return part.text)
            .collect::<Vec<String>>()
            .join("");

        return Ok(text);
    }
}

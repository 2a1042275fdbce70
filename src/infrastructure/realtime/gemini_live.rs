#[cfg(test)]
#[path = "gemini_live_test.rs"]
mod tests;

use std::fmt::Display;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::Sink;
use futures::SinkExt;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::ClientEvent;
use crate::domain::models::ErrorKind;
use crate::domain::models::RealtimeChannel;
use crate::domain::models::RealtimeConnector;
use crate::domain::models::RealtimeSetup;
use crate::domain::models::ServerEvent;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolFormat;
use crate::domain::models::VoiceError;
use crate::domain::models::INPUT_SAMPLE_RATE;

const LIVE_PATH: &str = "/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    data: String,
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LivePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Default, Debug, Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<LivePart>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
}

#[derive(Default, Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallMessage {
    #[serde(default)]
    function_calls: Vec<FunctionCall>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
    #[serde(default)]
    tool_call: Option<ToolCallMessage>,
}

fn setup_message(setup: &RealtimeSetup) -> Value {
    return json!({
        "setup": {
            "model": format!("models/{}", setup.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": setup.voice_name },
                    },
                },
            },
            "systemInstruction": { "parts": [{ "text": setup.system_instruction }] },
            "tools": ToolFormat::Gemini.render(&setup.tools),
        }
    });
}

fn client_message(event: &ClientEvent) -> Value {
    return match event {
        ClientEvent::Audio(pcm) => json!({
            "realtimeInput": {
                "mediaChunks": [{
                    "mimeType": format!("audio/pcm;rate={INPUT_SAMPLE_RATE}"),
                    "data": BASE64.encode(pcm),
                }],
            }
        }),
        ClientEvent::ToolResponse(result) => json!({
            "toolResponse": {
                "functionResponses": [{
                    "id": result.call_id,
                    "name": result.name,
                    "response": result.outcome.to_json(),
                }],
            }
        }),
    };
}

/// One server message may carry several events, they are returned in the
/// order the session loop should apply them.
fn parse_server_message(text: &str) -> Result<Vec<ServerEvent>, serde_json::Error> {
    let msg: ServerMessage = serde_json::from_str(text)?;
    let mut events = vec![];

    if msg.setup_complete.is_some() {
        events.push(ServerEvent::Opened);
    }

    if let Some(content) = msg.server_content {
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }

        let parts = content.model_turn.map(|turn| return turn.parts).unwrap_or_default();
        for part in parts {
            let data = match part.inline_data {
                Some(inline_data) => inline_data.data,
                None => continue,
            };
            match BASE64.decode(data) {
                Ok(pcm) => events.push(ServerEvent::Audio(pcm)),
                Err(err) => tracing::warn!(error = ?err, "Dropping undecodable audio chunk"),
            }
        }

        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if let Some(tool_call) = msg.tool_call {
        let calls = tool_call
            .function_calls
            .into_iter()
            .enumerate()
            .map(|(idx, call)| {
                let id = if call.id.is_empty() {
                    ToolCall::fallback_id(idx)
                } else {
                    call.id
                };
                return ToolCall::new(&id, &call.name, call.args);
            })
            .collect::<Vec<ToolCall>>();

        if !calls.is_empty() {
            events.push(ServerEvent::ToolCall(calls));
        }
    }

    return Ok(events);
}

fn close_event(frame: Option<CloseFrame>) -> ServerEvent {
    return match frame {
        Some(frame) if frame.code != CloseCode::Normal => {
            tracing::error!(code = ?frame.code, reason = %frame.reason, "Realtime session closed abnormally");
            let mut err = VoiceError::from_message(&frame.reason);
            if err.kind == ErrorKind::Unknown && !frame.reason.is_empty() {
                err.message = frame.reason.to_string();
            }
            ServerEvent::Error(err)
        }
        _ => ServerEvent::Closed,
    };
}

fn forward(text: &str, inbound: &mpsc::UnboundedSender<ServerEvent>) {
    let events = match parse_server_message(text) {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(error = ?err, "Skipping unparsable realtime message");
            return;
        }
    };

    for event in events {
        let _ = inbound.send(event);
    }
}

/// Shuttles events between the session and the socket until either side
/// hangs up.
async fn pump<S, R, E>(
    mut sink: S,
    mut stream: R,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    inbound: mpsc::UnboundedSender<ServerEvent>,
) where
    S: Sink<Message> + Unpin,
    S::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        tokio::select! {
            event = outbound.recv() => match event {
                Some(event) => {
                    let payload = client_message(&event).to_string();
                    if let Err(err) = sink.send(Message::Text(payload)).await {
                        let _ = inbound.send(ServerEvent::Error(VoiceError::from_message(&err.to_string())));
                        break;
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => forward(&text, &inbound),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => forward(&text, &inbound),
                    Err(err) => tracing::warn!(error = ?err, "Skipping binary realtime message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let _ = inbound.send(close_event(frame));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    let _ = inbound.send(ServerEvent::Error(VoiceError::from_message(&err.to_string())));
                    break;
                }
                None => {
                    let _ = inbound.send(ServerEvent::Closed);
                    break;
                }
            }
        }
    }

    tracing::debug!("Realtime transport finished");
}

/// Gemini Live API over a websocket.
pub struct GeminiLive {
    url: String,
    token: String,
}

impl Default for GeminiLive {
    fn default() -> GeminiLive {
        return GeminiLive {
            url: Config::get(ConfigKey::RealtimeURL),
            token: Config::get(ConfigKey::GeminiToken),
        };
    }
}

#[async_trait]
impl RealtimeConnector for GeminiLive {
    async fn connect(&self, setup: &RealtimeSetup) -> Result<RealtimeChannel, VoiceError> {
        if self.token.is_empty() {
            return Err(VoiceError::new(ErrorKind::AuthConfigError));
        }

        let url = format!("{}{LIVE_PATH}?key={}", self.url, self.token);
        let (ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|err| {
            tracing::error!(error = ?err, "Failed to connect to the realtime API");
            return VoiceError::from_message(&err.to_string());
        })?;
        let (mut sink, stream) = ws.split();

        let payload = setup_message(setup).to_string();
        tracing::debug!(model = %setup.model, voice = %setup.voice_name, "Sending realtime setup");
        sink.send(Message::Text(payload)).await.map_err(|err| {
            tracing::error!(error = ?err, "Failed to send realtime setup");
            return VoiceError::from_message(&err.to_string());
        })?;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let task = tokio::spawn(pump(sink, stream, outbound_rx, inbound_tx));

        return Ok(RealtimeChannel {
            outbound,
            inbound,
            task: Some(task),
        });
    }
}

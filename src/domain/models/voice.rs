#[cfg(test)]
#[path = "voice_test.rs"]
mod tests;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::ErrorKind;
use super::ToolCall;
use super::ToolDeclaration;
use super::ToolEffect;
use super::ToolResult;

/// Sample rate the realtime provider expects for microphone audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of the audio the realtime provider streams back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured frame.
pub const CAPTURE_FRAME_SIZE: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VoiceState {
    Connecting,
    Listening,
    Speaking,
    Processing,
    Error,
    Disconnected,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct VoiceError {
    pub kind: ErrorKind,
    pub message: String,
    pub can_retry: bool,
}

impl VoiceError {
    pub fn new(kind: ErrorKind) -> VoiceError {
        return VoiceError {
            kind,
            message: kind.voice_message().to_string(),
            can_retry: kind.is_voice_retryable(),
        };
    }

    /// Classifies errors surfaced as plain text by devices and transports.
    pub fn from_message(text: &str) -> VoiceError {
        let lower = text.to_lowercase();
        if lower.contains("notallowederror") || lower.contains("permission denied") {
            return VoiceError::new(ErrorKind::PermissionDenied);
        }
        if lower.contains("notfounderror")
            || lower.contains("no input device")
            || lower.contains("device not available")
            || lower.contains("no microphone")
        {
            return VoiceError::new(ErrorKind::DeviceUnavailable);
        }

        return VoiceError::new(ErrorKind::from_text(text).unwrap_or(ErrorKind::Unknown));
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum VoiceEvent {
    State(VoiceState),
    /// Normalised 0..1-ish loudness for the visualiser.
    Volume(f32),
    Error(VoiceError),
    ToolEffect(ToolEffect),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// PCM16LE mono at `INPUT_SAMPLE_RATE`.
    Audio(Vec<u8>),
    ToolResponse(ToolResult),
}

#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    Opened,
    /// PCM16LE mono at `OUTPUT_SAMPLE_RATE`.
    Audio(Vec<u8>),
    TurnComplete,
    Interrupted,
    ToolCall(Vec<ToolCall>),
    Error(VoiceError),
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RealtimeSetup {
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
}

pub struct RealtimeChannel {
    pub outbound: mpsc::UnboundedSender<ClientEvent>,
    pub inbound: mpsc::UnboundedReceiver<ServerEvent>,
    /// Task pumping the transport, aborted on disconnect.
    pub task: Option<JoinHandle<()>>,
}

#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, setup: &RealtimeSetup) -> Result<RealtimeChannel, VoiceError>;
}

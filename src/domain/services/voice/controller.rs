#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use super::meter::input_level;
use super::meter::OutputAnalyser;
use super::meter::FFT_SIZE;
use super::pcm::duration_secs;
use super::pcm::float_to_pcm16le;
use super::pcm::pcm16le_to_float;
use super::pcm::FrameResampler;
use super::scheduler::PlaybackScheduler;
use crate::domain::models::CaptureDevice;
use crate::domain::models::CaptureStream;
use crate::domain::models::CaptureTrack;
use crate::domain::models::ClientEvent;
use crate::domain::models::EmailBox;
use crate::domain::models::ErrorKind;
use crate::domain::models::PersonaTone;
use crate::domain::models::PlaybackDevice;
use crate::domain::models::PlaybackSink;
use crate::domain::models::RealtimeConnector;
use crate::domain::models::RealtimeSetup;
use crate::domain::models::ServerEvent;
use crate::domain::models::ToolCall;
use crate::domain::models::ToolOutcome;
use crate::domain::models::ToolResult;
use crate::domain::models::VoiceError;
use crate::domain::models::VoiceEvent;
use crate::domain::models::VoiceState;
use crate::domain::models::CAPTURE_FRAME_SIZE;
use crate::domain::models::INPUT_SAMPLE_RATE;
use crate::domain::models::OUTPUT_SAMPLE_RATE;
use crate::domain::services::PromptBuilder;
use crate::domain::services::ToolContext;
use crate::domain::services::ToolRegistry;

/// How often the output meter is sampled while the model speaks.
pub const VOLUME_INTERVAL: Duration = Duration::from_millis(33);

const VOICE_TOOL_FAILURE: &str = "Error executing tool.";

/// Hardware and transport the controller drives.
#[derive(Clone)]
pub struct VoiceDevices {
    pub capture: Arc<dyn CaptureDevice>,
    pub playback: Arc<dyn PlaybackDevice>,
    pub connector: Arc<dyn RealtimeConnector>,
}

#[derive(Clone)]
pub struct VoiceSettings {
    pub model: String,
    pub voice_name: String,
    /// Upper bound for the realtime handshake.
    pub connect_timeout: Duration,
}

struct VoiceShared {
    state: VoiceState,
    mic_muted: bool,
    speaker_muted: bool,
    /// Bumped on every disconnect so a stale session loop can't move the
    /// state of a newer session.
    generation: u64,
}

#[derive(Clone)]
struct StateHandle {
    shared: Arc<Mutex<VoiceShared>>,
    events: mpsc::UnboundedSender<VoiceEvent>,
}

impl StateHandle {
    fn set(&self, state: VoiceState) {
        let mut shared = self.shared.lock();
        if shared.state == state {
            return;
        }
        shared.state = state;
        drop(shared);

        tracing::debug!(state = %state, "Voice state changed");
        let _ = self.events.send(VoiceEvent::State(state));
    }

    fn set_if_current(&self, generation: u64, state: VoiceState) -> bool {
        if self.shared.lock().generation != generation {
            return false;
        }
        self.set(state);
        return true;
    }

    fn fail(&self, generation: u64, err: VoiceError) {
        if !self.set_if_current(generation, VoiceState::Error) {
            return;
        }
        tracing::error!(
            kind = %err.kind,
            can_retry = err.can_retry,
            "Voice session failed"
        );
        let _ = self.events.send(VoiceEvent::Error(err));
    }
}

/// Everything one voice session holds. Acquired together in `acquire`,
/// released together in `release`.
struct SessionResources {
    track: Arc<dyn CaptureTrack>,
    sink: Arc<dyn PlaybackSink>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    transport: Option<JoinHandle<()>>,
    session: JoinHandle<()>,
}

impl SessionResources {
    fn release(self) {
        self.session.abort();
        if let Some(transport) = self.transport {
            transport.abort();
        }
        self.track.stop();
        self.sink.close();
        drop(self.outbound);
    }
}

/// Realtime voice conversation with a single model. Owns the microphone for
/// the lifetime of a session.
pub struct VoiceSessionController {
    devices: VoiceDevices,
    settings: VoiceSettings,
    tools: Arc<ToolRegistry>,
    prompts: Arc<PromptBuilder>,
    email: EmailBox,
    handle: StateHandle,
    resources: Option<SessionResources>,
}

impl VoiceSessionController {
    pub fn new(
        devices: VoiceDevices,
        settings: VoiceSettings,
        tools: Arc<ToolRegistry>,
        prompts: Arc<PromptBuilder>,
        email: EmailBox,
        events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> VoiceSessionController {
        let shared = VoiceShared {
            state: VoiceState::Disconnected,
            mic_muted: false,
            speaker_muted: false,
            generation: 0,
        };

        return VoiceSessionController {
            devices,
            settings,
            tools,
            prompts,
            email,
            handle: StateHandle {
                shared: Arc::new(Mutex::new(shared)),
                events,
            },
            resources: None,
        };
    }

    pub fn state(&self) -> VoiceState {
        return self.handle.shared.lock().state;
    }

    /// False once the session ended, either locally or because the loop
    /// released it after the provider went away.
    pub fn is_connected(&self) -> bool {
        if self.resources.is_none() {
            return false;
        }
        return !matches!(self.state(), VoiceState::Disconnected | VoiceState::Error);
    }

    pub fn is_mic_muted(&self) -> bool {
        return self.handle.shared.lock().mic_muted;
    }

    pub fn is_speaker_muted(&self) -> bool {
        return self.handle.shared.lock().speaker_muted;
    }

    /// Opens the microphone, the speaker and the realtime channel. Fails
    /// without side effects when a session is already running.
    pub async fn connect(&mut self, tone: PersonaTone) -> Result<(), VoiceError> {
        if !self.is_connected() {
            if let Some(stale) = self.resources.take() {
                stale.release();
            }
        }
        if self.resources.is_some() {
            return Err(VoiceError {
                kind: ErrorKind::DeviceUnavailable,
                message: "A voice session is already running.".to_string(),
                can_retry: false,
            });
        }

        let generation = {
            let mut shared = self.handle.shared.lock();
            shared.mic_muted = false;
            shared.speaker_muted = false;
            shared.generation
        };
        self.handle.set(VoiceState::Connecting);
        tracing::info!(model = %self.settings.model, tone = %tone, "Connecting voice session");

        return match self.acquire(tone, generation).await {
            Ok(resources) => {
                self.resources = Some(resources);
                Ok(())
            }
            Err(err) => {
                self.handle.fail(generation, err.clone());
                Err(err)
            }
        };
    }

    async fn acquire(
        &self,
        tone: PersonaTone,
        generation: u64,
    ) -> Result<SessionResources, VoiceError> {
        let CaptureStream {
            sample_rate,
            frames,
            track,
        } = self.devices.capture.open(CAPTURE_FRAME_SIZE)?;
        let track: Arc<dyn CaptureTrack> = Arc::from(track);

        let resampler = match FrameResampler::new(sample_rate, INPUT_SAMPLE_RATE, CAPTURE_FRAME_SIZE) {
            Ok(resampler) => resampler,
            Err(err) => {
                track.stop();
                tracing::error!(error = ?err, sample_rate, "Unsupported capture sample rate");
                return Err(VoiceError::new(ErrorKind::DeviceUnavailable));
            }
        };

        let sink: Arc<dyn PlaybackSink> = match self.devices.playback.open(OUTPUT_SAMPLE_RATE) {
            Ok(sink) => Arc::from(sink),
            Err(err) => {
                track.stop();
                return Err(err);
            }
        };
        sink.set_gain(1.0);

        let setup = RealtimeSetup {
            model: self.settings.model.to_string(),
            voice_name: self.settings.voice_name.to_string(),
            system_instruction: self.prompts.voice_instruction(tone),
            tools: self.tools.declarations(),
        };
        let connecting = self.devices.connector.connect(&setup);
        let channel = match tokio::time::timeout(self.settings.connect_timeout, connecting).await {
            Ok(Ok(channel)) => channel,
            Ok(Err(err)) => {
                track.stop();
                sink.close();
                return Err(err);
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.settings.connect_timeout.as_millis() as u64,
                    "Realtime handshake timed out"
                );
                track.stop();
                sink.close();
                return Err(VoiceError::new(ErrorKind::Timeout));
            }
        };
        track.set_enabled(true);

        let session = SessionLoop {
            handle: self.handle.clone(),
            generation,
            track: track.clone(),
            sink: sink.clone(),
            outbound: channel.outbound.clone(),
            tools: self.tools.clone(),
            email: self.email.clone(),
            resampler,
            scheduler: PlaybackScheduler::default(),
            analyser: OutputAnalyser::default(),
            opened: false,
            model_speaking: false,
        };
        let session = tokio::spawn(session.run(frames, channel.inbound));

        return Ok(SessionResources {
            track,
            sink,
            outbound: channel.outbound,
            transport: channel.task,
            session,
        });
    }

    /// Releases every resource of the running session. Never waits on the
    /// remote end and is safe to call at any time.
    pub fn disconnect(&mut self) {
        self.handle.shared.lock().generation += 1;

        if let Some(resources) = self.resources.take() {
            resources.release();
            tracing::info!("Voice session released");
        }

        self.handle.set(VoiceState::Disconnected);
    }

    pub async fn reconnect(&mut self, tone: PersonaTone) -> Result<(), VoiceError> {
        self.disconnect();
        return self.connect(tone).await;
    }

    /// Returns the new muted flag. Frames keep flowing as silence so the
    /// provider's turn detection carries on.
    pub fn toggle_mic(&mut self) -> bool {
        let resources = match &self.resources {
            Some(resources) if self.is_connected() => resources,
            _ => return self.is_mic_muted(),
        };

        let muted = {
            let mut shared = self.handle.shared.lock();
            shared.mic_muted = !shared.mic_muted;
            shared.mic_muted
        };
        resources.track.set_enabled(!muted);

        tracing::info!(muted, "Toggled microphone");
        return muted;
    }

    /// Returns the new muted flag. Playback keeps its clock, only the gain
    /// drops to zero.
    pub fn toggle_speaker(&mut self) -> bool {
        let resources = match &self.resources {
            Some(resources) if self.is_connected() => resources,
            _ => return self.is_speaker_muted(),
        };

        let muted = {
            let mut shared = self.handle.shared.lock();
            shared.speaker_muted = !shared.speaker_muted;
            shared.speaker_muted
        };
        resources.sink.set_gain(if muted { 0.0 } else { 1.0 });

        tracing::info!(muted, "Toggled speaker");
        return muted;
    }
}

impl Drop for VoiceSessionController {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.release();
        }
    }
}

/// How a session loop ended on its own.
enum SessionEnd {
    Closed,
    Failed(VoiceError),
}

struct SessionLoop {
    handle: StateHandle,
    generation: u64,
    track: Arc<dyn CaptureTrack>,
    sink: Arc<dyn PlaybackSink>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    tools: Arc<ToolRegistry>,
    email: EmailBox,
    resampler: FrameResampler,
    scheduler: PlaybackScheduler,
    analyser: OutputAnalyser,
    /// Audio captured before the provider accepted the setup is dropped.
    opened: bool,
    /// From the first audio chunk of a reply until turn complete.
    model_speaking: bool,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut frames: mpsc::UnboundedReceiver<Vec<f32>>,
        mut inbound: mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        let mut ticker = tokio::time::interval(VOLUME_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tool_tasks: JoinSet<()> = JoinSet::new();

        let end = loop {
            tokio::select! {
                frame = frames.recv() => match frame {
                    Some(frame) => self.send_frame(frame),
                    None => break SessionEnd::Failed(VoiceError::new(ErrorKind::DeviceUnavailable)),
                },
                event = inbound.recv() => match event {
                    Some(event) => {
                        if let Some(end) = self.handle_server_event(event, &mut tool_tasks) {
                            break end;
                        }
                    }
                    None => break SessionEnd::Closed,
                },
                _ = ticker.tick() => self.sample_output(),
                Some(res) = tool_tasks.join_next(), if !tool_tasks.is_empty() => {
                    if let Err(err) = res {
                        tracing::error!(error = ?err, "Voice tool task failed");
                    }
                }
            }
        };

        tool_tasks.abort_all();
        self.track.stop();
        self.sink.close();

        match end {
            SessionEnd::Closed => {
                self.handle.set_if_current(self.generation, VoiceState::Disconnected);
            }
            SessionEnd::Failed(err) => self.handle.fail(self.generation, err),
        }

        tracing::debug!("Voice session loop finished");
    }

    fn state(&self) -> (VoiceState, bool) {
        let shared = self.handle.shared.lock();
        return (shared.state, shared.mic_muted);
    }

    fn send_frame(&mut self, frame: Vec<f32>) {
        if !self.opened {
            return;
        }

        let (_, mic_muted) = self.state();
        let frame = if mic_muted {
            vec![0.0; frame.len()]
        } else {
            frame
        };

        if !self.model_speaking {
            let _ = self
                .handle
                .events
                .send(VoiceEvent::Volume(input_level(&frame)));
        }

        let samples = match self.resampler.process(&frame) {
            Ok(samples) => samples,
            Err(err) => {
                tracing::warn!(error = ?err, "Failed to resample captured audio");
                return;
            }
        };
        if samples.is_empty() {
            return;
        }

        let _ = self.outbound.send(ClientEvent::Audio(float_to_pcm16le(&samples)));
    }

    /// Returns how the session ended once it is over.
    fn handle_server_event(
        &mut self,
        event: ServerEvent,
        tool_tasks: &mut JoinSet<()>,
    ) -> Option<SessionEnd> {
        match event {
            ServerEvent::Opened => {
                tracing::info!("Voice session opened");
                self.opened = true;
                self.handle.set_if_current(self.generation, VoiceState::Listening);
            }
            ServerEvent::Audio(bytes) => {
                self.play(&bytes);
                self.model_speaking = true;
                self.handle.set_if_current(self.generation, VoiceState::Speaking);
            }
            ServerEvent::TurnComplete => {
                self.model_speaking = false;
                self.handle.set_if_current(self.generation, VoiceState::Listening);
            }
            ServerEvent::Interrupted => {
                tracing::debug!("Model interrupted, flushing playback");
                self.sink.flush();
                self.scheduler.reset(self.sink.current_time());
                self.model_speaking = false;
                self.handle.set_if_current(self.generation, VoiceState::Listening);
            }
            ServerEvent::ToolCall(calls) => {
                self.handle.set_if_current(self.generation, VoiceState::Processing);
                self.spawn_tools(calls, tool_tasks);
            }
            ServerEvent::Error(err) => return Some(SessionEnd::Failed(err)),
            ServerEvent::Closed => {
                tracing::info!("Voice session closed by remote");
                return Some(SessionEnd::Closed);
            }
        }

        return None;
    }

    fn play(&mut self, bytes: &[u8]) {
        let samples = pcm16le_to_float(bytes);
        if samples.is_empty() {
            return;
        }

        let duration = duration_secs(samples.len(), OUTPUT_SAMPLE_RATE);
        let chunk = self.scheduler.schedule(self.sink.current_time(), duration);
        tracing::trace!(start = chunk.start, end = chunk.end, "Scheduled reply audio");
        self.sink.enqueue(chunk.start, &samples);
    }

    /// Calls of one message run in order, results go back tagged with the
    /// call id.
    fn spawn_tools(&self, calls: Vec<ToolCall>, tool_tasks: &mut JoinSet<()>) {
        let tools = self.tools.clone();
        let email = self.email.clone();
        let events = self.handle.events.clone();
        let outbound = self.outbound.clone();

        tool_tasks.spawn(async move {
            let context = ToolContext::new(
                move |effect| {
                    let _ = events.send(VoiceEvent::ToolEffect(effect));
                },
                email,
            );

            for call in calls {
                let outcome = match tools.execute(&call, &context).await {
                    Ok(result) => ToolOutcome::Success(result),
                    Err(err) => {
                        tracing::warn!(name = %call.name, error = ?err, "Voice tool failed");
                        ToolOutcome::Success(VOICE_TOOL_FAILURE.to_string())
                    }
                };
                let _ = outbound.send(ClientEvent::ToolResponse(ToolResult::new(&call, outcome)));
            }
        });
    }

    fn sample_output(&mut self) {
        if !self.model_speaking {
            return;
        }

        let mut buf = [0.0f32; FFT_SIZE];
        self.sink.recent_samples(&mut buf);
        let level = self.analyser.level(&buf);
        let _ = self.handle.events.send(VoiceEvent::Volume(level));
    }
}

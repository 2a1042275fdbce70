use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::models::Backend;
use crate::domain::models::BackendName;
use crate::domain::models::BackendPrompt;
use crate::domain::models::BackendResponse;
use crate::domain::models::CaptureDevice;
use crate::domain::models::CaptureStream;
use crate::domain::models::CaptureTrack;
use crate::domain::models::ClientEvent;
use crate::domain::models::EmailPayload;
use crate::domain::models::EmailTransport;
use crate::domain::models::ErrorKind;
use crate::domain::models::PlaybackDevice;
use crate::domain::models::PlaybackSink;
use crate::domain::models::ProviderError;
use crate::domain::models::RealtimeChannel;
use crate::domain::models::RealtimeConnector;
use crate::domain::models::RealtimeSetup;
use crate::domain::models::ServerEvent;
use crate::domain::models::VoiceError;

pub enum Script {
    Respond(Vec<BackendResponse>),
    /// Sends the responses, then fails the request.
    Partial(Vec<BackendResponse>, ProviderError),
    Fail(ProviderError),
}

/// Scripted backend. Each completion request pops the next script, an empty
/// queue answers with a bare `Done`.
pub struct FakeBackend {
    model: String,
    scripts: Mutex<VecDeque<Script>>,
    titles: Mutex<VecDeque<Result<String, ProviderError>>>,
    pub prompts: Arc<Mutex<Vec<BackendPrompt>>>,
    pub title_prompts: Arc<Mutex<Vec<String>>>,
}

impl FakeBackend {
    pub fn new(model: &str, scripts: Vec<Script>) -> FakeBackend {
        return FakeBackend {
            model: model.to_string(),
            scripts: Mutex::new(scripts.into_iter().collect()),
            titles: Mutex::new(VecDeque::new()),
            prompts: Arc::new(Mutex::new(vec![])),
            title_prompts: Arc::new(Mutex::new(vec![])),
        };
    }

    pub fn text(model: &str, text: &str) -> FakeBackend {
        return FakeBackend::new(
            model,
            vec![Script::Respond(vec![
                BackendResponse::Text(text.to_string()),
                BackendResponse::Done,
            ])],
        );
    }

    pub fn failing(model: &str, kind: ErrorKind) -> FakeBackend {
        return FakeBackend::new(
            model,
            vec![Script::Fail(ProviderError::new(kind, "scripted failure"))],
        );
    }

    pub fn with_title(self, title: Result<String, ProviderError>) -> FakeBackend {
        self.titles.lock().push_back(title);
        return self;
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn name(&self) -> BackendName {
        return BackendName::Gemini;
    }

    fn model(&self) -> String {
        return self.model.to_string();
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        return Ok(());
    }

    async fn get_completion<'a>(
        &self,
        prompt: &BackendPrompt,
        tx: &'a mpsc::UnboundedSender<BackendResponse>,
    ) -> Result<(), ProviderError> {
        self.prompts.lock().push(prompt.clone());
        let script = self.scripts.lock().pop_front();

        let responses = match script {
            Some(Script::Respond(responses)) => responses,
            Some(Script::Partial(responses, err)) => {
                for res in responses {
                    let _ = tx.send(res);
                }
                return Err(err);
            }
            Some(Script::Fail(err)) => return Err(err),
            None => vec![BackendResponse::Done],
        };

        for res in responses {
            let _ = tx.send(res);
        }

        return Ok(());
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, ProviderError> {
        self.title_prompts.lock().push(prompt.to_string());
        return match self.titles.lock().pop_front() {
            Some(res) => res,
            None => Err(ProviderError::new(ErrorKind::Unknown, "no title scripted")),
        };
    }
}

pub struct FakeEmail {
    accept: bool,
    pub sent: Arc<Mutex<Vec<EmailPayload>>>,
}

impl FakeEmail {
    pub fn new(accept: bool) -> FakeEmail {
        return FakeEmail {
            accept,
            sent: Arc::new(Mutex::new(vec![])),
        };
    }
}

#[async_trait]
impl EmailTransport for FakeEmail {
    async fn send(&self, payload: &EmailPayload) -> bool {
        self.sent.lock().push(payload.clone());
        return self.accept;
    }
}

#[derive(Default)]
pub struct TrackState {
    pub enabled: AtomicBool,
    pub stopped: AtomicBool,
}

struct FakeTrack(Arc<TrackState>);

impl CaptureTrack for FakeTrack {
    fn set_enabled(&self, enabled: bool) {
        self.0.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.0.stopped.store(true, Ordering::SeqCst);
    }
}

/// Microphone fed by the test through `push`.
pub struct FakeCapture {
    sample_rate: u32,
    error: Option<VoiceError>,
    frames: Mutex<Option<mpsc::UnboundedSender<Vec<f32>>>>,
    pub track: Arc<TrackState>,
}

impl FakeCapture {
    pub fn new(sample_rate: u32) -> FakeCapture {
        return FakeCapture {
            sample_rate,
            error: None,
            frames: Mutex::new(None),
            track: Arc::new(TrackState::default()),
        };
    }

    pub fn failing(error: VoiceError) -> FakeCapture {
        let mut capture = FakeCapture::new(16_000);
        capture.error = Some(error);
        return capture;
    }

    pub fn push(&self, frame: Vec<f32>) {
        if let Some(tx) = self.frames.lock().as_ref() {
            let _ = tx.send(frame);
        }
    }

    /// Ends the frame stream, like a device that was unplugged.
    pub fn close(&self) {
        self.frames.lock().take();
    }
}

impl CaptureDevice for FakeCapture {
    fn open(&self, _frame_size: usize) -> Result<CaptureStream, VoiceError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.frames.lock() = Some(tx);

        return Ok(CaptureStream {
            sample_rate: self.sample_rate,
            frames: rx,
            track: Box::new(FakeTrack(self.track.clone())),
        });
    }
}

pub struct SinkState {
    pub time: Mutex<f64>,
    pub enqueued: Mutex<Vec<(f64, usize)>>,
    pub gain: Mutex<f32>,
    pub flushes: AtomicUsize,
    pub closed: AtomicBool,
}

struct FakeSink(Arc<SinkState>);

impl PlaybackSink for FakeSink {
    fn current_time(&self) -> f64 {
        return *self.0.time.lock();
    }

    fn enqueue(&self, start: f64, samples: &[f32]) {
        self.0.enqueued.lock().push((start, samples.len()));
    }

    fn set_gain(&self, gain: f32) {
        *self.0.gain.lock() = gain;
    }

    fn flush(&self) {
        self.0.flushes.fetch_add(1, Ordering::SeqCst);
        self.0.enqueued.lock().clear();
    }

    fn recent_samples(&self, buf: &mut [f32]) {
        buf.fill(0.0);
    }

    fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

pub struct FakePlayback {
    pub sink: Arc<SinkState>,
}

impl Default for FakePlayback {
    fn default() -> FakePlayback {
        return FakePlayback {
            sink: Arc::new(SinkState {
                time: Mutex::new(0.0),
                enqueued: Mutex::new(vec![]),
                gain: Mutex::new(1.0),
                flushes: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        };
    }
}

impl PlaybackDevice for FakePlayback {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackSink>, VoiceError> {
        return Ok(Box::new(FakeSink(self.sink.clone())));
    }
}

/// Realtime provider driven by the test. `server` pushes provider events,
/// `take_client` hands out what the controller sent.
#[derive(Default)]
pub struct FakeConnector {
    pub setups: Mutex<Vec<RealtimeSetup>>,
    server: Mutex<Option<mpsc::UnboundedSender<ServerEvent>>>,
    client: Mutex<Option<mpsc::UnboundedReceiver<ClientEvent>>>,
}

impl FakeConnector {
    pub fn server(&self, event: ServerEvent) {
        if let Some(tx) = self.server.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    pub fn take_client(&self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        return self.client.lock().take();
    }
}

#[async_trait]
impl RealtimeConnector for FakeConnector {
    async fn connect(&self, setup: &RealtimeSetup) -> Result<RealtimeChannel, VoiceError> {
        self.setups.lock().push(setup.clone());

        let (outbound, client) = mpsc::unbounded_channel();
        let (server, inbound) = mpsc::unbounded_channel();
        *self.server.lock() = Some(server);
        *self.client.lock() = Some(client);

        return Ok(RealtimeChannel {
            outbound,
            inbound,
            task: None,
        });
    }
}

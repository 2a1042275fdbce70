use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;

use cpal::traits::DeviceTrait;
use cpal::traits::HostTrait;
use cpal::traits::StreamTrait;
use cpal::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::timeline::FrameAssembler;
use super::timeline::Timeline;
use crate::domain::models::CaptureDevice;
use crate::domain::models::CaptureStream;
use crate::domain::models::CaptureTrack;
use crate::domain::models::ErrorKind;
use crate::domain::models::PlaybackDevice;
use crate::domain::models::PlaybackSink;
use crate::domain::models::VoiceError;

fn device_error(context: &str, err: impl std::fmt::Display) -> VoiceError {
    tracing::error!(error = %err, "{}", context);
    let mut voice_err = VoiceError::from_message(&err.to_string());
    if voice_err.kind == ErrorKind::Unknown {
        voice_err = VoiceError::new(ErrorKind::DeviceUnavailable);
    }
    return voice_err;
}

/// Streams are not `Send` on every host, so each one lives on its own thread
/// until the returned sender is dropped.
fn spawn_stream<F>(build: F) -> Result<(std_mpsc::Sender<()>, u32), VoiceError>
where
    F: FnOnce() -> Result<(Stream, u32), VoiceError> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32, VoiceError>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    thread::spawn(move || {
        let (stream, rate) = match build() {
            Ok(res) => res,
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                return;
            }
        };
        if let Err(err) = stream.play() {
            let _ = ready_tx.send(Err(device_error("Failed to start audio stream", err)));
            return;
        }
        let _ = ready_tx.send(Ok(rate));

        // Blocks until every sender is gone.
        let _ = stop_rx.recv();
        drop(stream);
        tracing::debug!("Audio stream released");
    });

    let rate = match ready_rx.recv() {
        Ok(res) => res?,
        Err(_) => return Err(VoiceError::new(ErrorKind::DeviceUnavailable)),
    };

    return Ok((stop_tx, rate));
}

struct CpalTrack {
    enabled: Arc<AtomicBool>,
    stop: Mutex<Option<std_mpsc::Sender<()>>>,
}

impl CaptureTrack for CpalTrack {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.stop.lock().take();
    }
}

/// Default input device of the default host.
pub struct CpalCapture {}

impl CaptureDevice for CpalCapture {
    fn open(&self, frame_size: usize) -> Result<CaptureStream, VoiceError> {
        let (frames_tx, frames) = mpsc::unbounded_channel::<Vec<f32>>();
        let enabled = Arc::new(AtomicBool::new(false));
        let callback_enabled = enabled.clone();

        let (stop, sample_rate) = spawn_stream(move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| return VoiceError::new(ErrorKind::DeviceUnavailable))?;
            tracing::info!(
                device = %device.name().unwrap_or_else(|_| return "Unknown".to_string()),
                "Using input device"
            );

            let config: cpal::StreamConfig = device
                .default_input_config()
                .map_err(|err| return device_error("Failed to get input config", err))?
                .into();
            let rate = config.sample_rate.0;
            let mut assembler = FrameAssembler::new(config.channels as usize, frame_size);

            let stream = device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let enabled = callback_enabled.load(Ordering::SeqCst);
                        for frame in assembler.push(data, enabled) {
                            let _ = frames_tx.send(frame);
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "Audio input stream error");
                    },
                    None,
                )
                .map_err(|err| return device_error("Failed to build input stream", err))?;

            return Ok((stream, rate));
        })?;

        return Ok(CaptureStream {
            sample_rate,
            frames,
            track: Box::new(CpalTrack {
                enabled,
                stop: Mutex::new(Some(stop)),
            }),
        });
    }
}

struct CpalSink {
    timeline: Arc<Mutex<Timeline>>,
    stop: Mutex<Option<std_mpsc::Sender<()>>>,
}

impl PlaybackSink for CpalSink {
    fn current_time(&self) -> f64 {
        return self.timeline.lock().current_time();
    }

    fn enqueue(&self, start: f64, samples: &[f32]) {
        self.timeline.lock().enqueue(start, samples);
    }

    fn set_gain(&self, gain: f32) {
        self.timeline.lock().set_gain(gain);
    }

    fn flush(&self) {
        self.timeline.lock().flush();
    }

    fn recent_samples(&self, buf: &mut [f32]) {
        self.timeline.lock().recent_samples(buf);
    }

    fn close(&self) {
        self.timeline.lock().flush();
        self.stop.lock().take();
    }
}

/// Default output device of the default host.
pub struct CpalPlayback {}

impl PlaybackDevice for CpalPlayback {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackSink>, VoiceError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| return VoiceError::new(ErrorKind::DeviceUnavailable))?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|err| return device_error("Failed to get output config", err))?
            .into();

        let timeline = Arc::new(Mutex::new(Timeline::new(sample_rate, config.sample_rate.0)));
        let callback_timeline = timeline.clone();

        let (stop, _) = spawn_stream(move || {
            tracing::info!(
                device = %device.name().unwrap_or_else(|_| return "Unknown".to_string()),
                "Using output device"
            );
            let channels = config.channels as usize;
            let rate = config.sample_rate.0;

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        callback_timeline.lock().render(data, channels);
                    },
                    |err| {
                        tracing::error!(error = %err, "Audio output stream error");
                    },
                    None,
                )
                .map_err(|err| return device_error("Failed to build output stream", err))?;

            return Ok((stream, rate));
        })?;

        return Ok(Box::new(CpalSink {
            timeline,
            stop: Mutex::new(Some(stop)),
        }));
    }
}

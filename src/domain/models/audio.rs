use tokio::sync::mpsc;

use super::VoiceError;

/// Microphone handle held for the lifetime of a voice session.
pub trait CaptureTrack: Send + Sync {
    /// A disabled track keeps streaming frames, but they carry silence.
    fn set_enabled(&self, enabled: bool);

    /// Releases the device. Safe to call more than once.
    fn stop(&self);
}

pub struct CaptureStream {
    pub sample_rate: u32,
    /// Mono frames of exactly the requested size.
    pub frames: mpsc::UnboundedReceiver<Vec<f32>>,
    pub track: Box<dyn CaptureTrack>,
}

pub trait CaptureDevice: Send + Sync {
    fn open(&self, frame_size: usize) -> Result<CaptureStream, VoiceError>;
}

/// Output clock plus a queue of scheduled buffers.
pub trait PlaybackSink: Send + Sync {
    /// Seconds since the sink was opened. Keeps advancing while idle or muted.
    fn current_time(&self) -> f64;

    fn enqueue(&self, start: f64, samples: &[f32]);

    fn set_gain(&self, gain: f32);

    /// Drops everything queued but not yet played.
    fn flush(&self);

    /// Fills `buf` with the most recently played samples, before gain.
    fn recent_samples(&self, buf: &mut [f32]);

    fn close(&self);
}

pub trait PlaybackDevice: Send + Sync {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn PlaybackSink>, VoiceError>;
}

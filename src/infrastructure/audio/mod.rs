#[cfg(feature = "audio-io")]
mod cpal_device;
#[cfg_attr(not(feature = "audio-io"), allow(dead_code))]
mod timeline;

use std::sync::Arc;

use crate::domain::models::CaptureDevice;
use crate::domain::models::CaptureStream;
use crate::domain::models::ErrorKind;
use crate::domain::models::PlaybackDevice;
use crate::domain::models::PlaybackSink;
use crate::domain::models::VoiceError;

/// Stands in for the sound card when the binary is built without audio
/// support. Opening either side fails like a missing microphone would.
#[cfg_attr(feature = "audio-io", allow(dead_code))]
pub struct UnavailableAudio {}

impl CaptureDevice for UnavailableAudio {
    fn open(&self, _frame_size: usize) -> Result<CaptureStream, VoiceError> {
        tracing::warn!("Built without the audio-io feature, no capture device");
        return Err(VoiceError::new(ErrorKind::DeviceUnavailable));
    }
}

impl PlaybackDevice for UnavailableAudio {
    fn open(&self, _sample_rate: u32) -> Result<Box<dyn PlaybackSink>, VoiceError> {
        tracing::warn!("Built without the audio-io feature, no playback device");
        return Err(VoiceError::new(ErrorKind::DeviceUnavailable));
    }
}

pub struct AudioManager {}

impl AudioManager {
    #[cfg(feature = "audio-io")]
    pub fn capture() -> Arc<dyn CaptureDevice> {
        return Arc::new(cpal_device::CpalCapture {});
    }

    #[cfg(not(feature = "audio-io"))]
    pub fn capture() -> Arc<dyn CaptureDevice> {
        return Arc::new(UnavailableAudio {});
    }

    #[cfg(feature = "audio-io")]
    pub fn playback() -> Arc<dyn PlaybackDevice> {
        return Arc::new(cpal_device::CpalPlayback {});
    }

    #[cfg(not(feature = "audio-io"))]
    pub fn playback() -> Arc<dyn PlaybackDevice> {
        return Arc::new(UnavailableAudio {});
    }
}

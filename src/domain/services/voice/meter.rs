#[cfg(test)]
#[path = "meter_test.rs"]
mod tests;

use std::f32::consts::PI;

use super::pcm::rms;

/// Window size of the output analyser.
pub const FFT_SIZE: usize = 256;

const SMOOTHING: f32 = 0.3;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const INPUT_GAIN: f32 = 8.0;

/// Level of captured microphone audio while the model is quiet.
pub fn input_level(frame: &[f32]) -> f32 {
    return rms(frame) * INPUT_GAIN;
}

/// Frequency domain loudness of the model's voice. Mirrors a browser
/// analyser node: Blackman window, per bin smoothing over time, magnitudes
/// mapped from -100..-30 dB onto 0..255, averaged over the lower half of the
/// spectrum and divided by 100.
pub struct OutputAnalyser {
    window: Vec<f32>,
    smoothed: Vec<f32>,
}

impl Default for OutputAnalyser {
    fn default() -> OutputAnalyser {
        let n = FFT_SIZE as f32;
        let window = (0..FFT_SIZE)
            .map(|i| {
                let x = i as f32 / n;
                return 0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos();
            })
            .collect();

        return OutputAnalyser {
            window,
            smoothed: vec![0.0; FFT_SIZE / 4],
        };
    }
}

impl OutputAnalyser {
    pub fn level(&mut self, samples: &[f32]) -> f32 {
        let mut buf = [0.0f32; FFT_SIZE];
        let offset = FFT_SIZE.saturating_sub(samples.len());
        let tail = &samples[samples.len().saturating_sub(FFT_SIZE)..];
        for (idx, sample) in tail.iter().enumerate() {
            buf[offset + idx] = sample * self.window[offset + idx];
        }

        let n = FFT_SIZE as f32;
        let mut total = 0.0;
        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (idx, value) in buf.iter().enumerate() {
                let angle = 2.0 * PI * bin as f32 * idx as f32 / n;
                re += value * angle.cos();
                im -= value * angle.sin();
            }
            let magnitude = (re * re + im * im).sqrt() / n;
            *smoothed = SMOOTHING * *smoothed + (1.0 - SMOOTHING) * magnitude;

            let db = 20.0 * smoothed.max(f32::MIN_POSITIVE).log10();
            let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
            total += scaled.clamp(0.0, 255.0).floor();
        }

        return total / self.smoothed.len() as f32 / 100.0;
    }
}

#[cfg(test)]
#[path = "pcm_test.rs"]
mod tests;

use anyhow::Result;
use rubato::Resampler;
use rubato::SincFixedIn;
use rubato::SincInterpolationParameters;
use rubato::SincInterpolationType;
use rubato::WindowFunction;

/// Clamps and encodes float samples as little endian signed 16 bit PCM.
/// Negative samples scale by 0x8000, positive ones by 0x7FFF.
pub fn float_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let s = sample.clamp(-1.0, 1.0);
        let value = if s < 0.0 {
            (s * 32768.0) as i16
        } else {
            (s * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    return bytes;
}

/// Decodes little endian 16 bit PCM. A trailing odd byte is ignored.
pub fn pcm16le_to_float(bytes: &[u8]) -> Vec<f32> {
    return bytes
        .chunks_exact(2)
        .map(|pair| return i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
}

pub fn duration_secs(samples: usize, sample_rate: u32) -> f64 {
    return samples as f64 / sample_rate as f64;
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum = samples.iter().map(|s| return s * s).sum::<f32>();
    return (sum / samples.len() as f32).sqrt();
}

/// Converts captured mono frames to the provider's input rate. Input is
/// buffered until a full resampler chunk is available, so output lengths
/// vary from frame to frame.
pub struct FrameResampler {
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<f32>,
}

impl FrameResampler {
    pub fn new(input_rate: u32, output_rate: u32, chunk_size: usize) -> Result<FrameResampler> {
        if input_rate == output_rate {
            return Ok(FrameResampler {
                resampler: None,
                pending: vec![],
            });
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let resampler = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            2.0,
            params,
            chunk_size,
            1,
        )?;

        tracing::debug!(input_rate, output_rate, "Created capture resampler");

        return Ok(FrameResampler {
            resampler: Some(resampler),
            pending: vec![],
        });
    }

    pub fn process(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        let resampler = match self.resampler.as_mut() {
            Some(resampler) => resampler,
            None => return Ok(frame.to_vec()),
        };

        self.pending.extend_from_slice(frame);
        let mut output: Vec<f32> = vec![];
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let input = vec![self.pending.drain(..needed).collect::<Vec<f32>>()];
            let mut res = resampler.process(&input, None)?;
            if let Some(channel) = res.pop() {
                output.extend(channel);
            }
        }

        return Ok(output);
    }
}

#[cfg(test)]
#[path = "timeline_test.rs"]
mod tests;

use std::collections::VecDeque;

/// Samples kept around for the output level meter.
const HISTORY_LEN: usize = 4096;

/// Downmixes interleaved device audio and cuts it into fixed size mono frames.
#[derive(Debug)]
pub struct FrameAssembler {
    channels: usize,
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(channels: usize, frame_size: usize) -> FrameAssembler {
        return FrameAssembler {
            channels: channels.max(1),
            frame_size,
            pending: Vec::with_capacity(frame_size),
        };
    }

    /// Returns every frame completed by `data`. A disabled track contributes
    /// silence of the same length.
    pub fn push(&mut self, data: &[f32], enabled: bool) -> Vec<Vec<f32>> {
        let mut frames = vec![];

        for chunk in data.chunks(self.channels) {
            let sample = if enabled {
                chunk.iter().sum::<f32>() / chunk.len() as f32
            } else {
                0.0
            };
            self.pending.push(sample);

            if self.pending.len() == self.frame_size {
                frames.push(std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_size),
                ));
            }
        }

        return frames;
    }
}

#[derive(Debug)]
struct Scheduled {
    /// Position on the source clock, in source samples.
    start: f64,
    samples: Vec<f32>,
}

impl Scheduled {
    fn end(&self) -> f64 {
        return self.start + self.samples.len() as f64;
    }
}

/// Output clock of a playback sink. Buffers are placed at absolute times and
/// resampled to the device rate while rendering.
#[derive(Debug)]
pub struct Timeline {
    source_rate: u32,
    device_rate: u32,
    frames_rendered: u64,
    gain: f32,
    queue: VecDeque<Scheduled>,
    history: VecDeque<f32>,
}

impl Timeline {
    pub fn new(source_rate: u32, device_rate: u32) -> Timeline {
        return Timeline {
            source_rate,
            device_rate: device_rate.max(1),
            frames_rendered: 0,
            gain: 1.0,
            queue: VecDeque::new(),
            history: VecDeque::with_capacity(HISTORY_LEN),
        };
    }

    pub fn current_time(&self) -> f64 {
        return self.frames_rendered as f64 / self.device_rate as f64;
    }

    pub fn enqueue(&mut self, start: f64, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        self.queue.push_back(Scheduled {
            start: start * self.source_rate as f64,
            samples: samples.to_vec(),
        });
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    pub fn flush(&mut self) {
        self.queue.clear();
    }

    pub fn recent_samples(&self, buf: &mut [f32]) {
        let skip = self.history.len().saturating_sub(buf.len());
        let offset = buf.len().saturating_sub(self.history.len());
        buf.fill(0.0);
        for (idx, sample) in self.history.iter().skip(skip).enumerate() {
            buf[offset + idx] = *sample;
        }
    }

    /// Fills interleaved device frames and advances the clock, whether or not
    /// anything is queued.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let step = self.source_rate as f64 / self.device_rate as f64;

        for frame in out.chunks_mut(channels) {
            let position = self.frames_rendered as f64 * step;
            let sample = self.sample_at(position);

            if self.history.len() == HISTORY_LEN {
                self.history.pop_front();
            }
            self.history.push_back(sample);

            frame.fill(sample * self.gain);
            self.frames_rendered += 1;
        }
    }

    fn sample_at(&mut self, position: f64) -> f32 {
        while let Some(front) = self.queue.front() {
            if front.end() <= position {
                self.queue.pop_front();
                continue;
            }
            break;
        }

        let chunk = match self.queue.front() {
            Some(chunk) if chunk.start <= position => chunk,
            _ => return 0.0,
        };

        let offset = position - chunk.start;
        let idx = offset.floor() as usize;
        let frac = (offset - idx as f64) as f32;
        let current = chunk.samples.get(idx).copied().unwrap_or(0.0);
        let next = chunk.samples.get(idx + 1).copied().unwrap_or(current);

        return current + (next - current) * frac;
    }
}

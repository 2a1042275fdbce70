#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledChunk {
    pub start: f64,
    pub end: f64,
}

/// Places incoming audio chunks back to back on the output clock. A chunk
/// never starts before the previous one ends, and never in the past.
#[derive(Clone, Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
}

impl PlaybackScheduler {
    pub fn schedule(&mut self, now: f64, duration: f64) -> ScheduledChunk {
        let start = now.max(self.next_start_time);
        self.next_start_time = start + duration;

        return ScheduledChunk {
            start,
            end: self.next_start_time,
        };
    }

    /// Forgets queued audio, the next chunk plays immediately.
    pub fn reset(&mut self, now: f64) {
        self.next_start_time = now;
    }
}

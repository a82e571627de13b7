use rodio::Source;
use std::f32::consts::PI;
use std::time::Duration;

const SAMPLE_RATE: u32 = 44_100;

/// Short mono sine tone with a linear fade-out so it does not click.
pub struct Beep {
    freq: f32,
    total_samples: usize,
    num_sample: usize,
}

impl Beep {
    pub fn new(freq: f32, duration: Duration) -> Self {
        Self {
            freq,
            total_samples: (duration.as_secs_f32() * SAMPLE_RATE as f32) as usize,
            num_sample: 0,
        }
    }

    /// The alert tone: 880 Hz for 0.8 s.
    pub fn alert() -> Self {
        Self::new(880.0, Duration::from_millis(800))
    }
}

impl Iterator for Beep {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.num_sample >= self.total_samples {
            return None;
        }
        let t = self.num_sample as f32 / SAMPLE_RATE as f32;
        let fade = 1.0 - self.num_sample as f32 / self.total_samples as f32;
        self.num_sample += 1;

        Some((2.0 * PI * self.freq * t).sin() * 0.3 * fade)
    }
}

impl Source for Beep {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples - self.num_sample)
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(
            self.total_samples as f32 / SAMPLE_RATE as f32,
        ))
    }
}

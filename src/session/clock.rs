use std::time::{Duration, Instant};

/// Wall-time bookkeeping for one session.
///
/// Focus time is accumulated from checkpoint to checkpoint: every call to
/// [`SessionClock::checkpoint`] attributes the interval since the previous
/// checkpoint to either focused or unfocused time and then advances the
/// checkpoint, so no interval is counted twice.
#[derive(Debug, Clone)]
pub struct SessionClock {
    started_at: Instant,
    last_checkpoint: Instant,
    focused: Duration,
}

impl SessionClock {
    pub fn start(now: Instant) -> Self {
        Self {
            started_at: now,
            last_checkpoint: now,
            focused: Duration::ZERO,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn focused(&self) -> Duration {
        self.focused
    }

    /// Closes the interval ending at `now`, crediting it when `focused`.
    pub fn checkpoint(&mut self, now: Instant, focused: bool) {
        if now <= self.last_checkpoint {
            return;
        }
        let delta = now.duration_since(self.last_checkpoint);
        self.last_checkpoint = now;
        if focused {
            self.accumulate_focused(delta);
        }
    }

    /// Adds focused time, never letting the total pass the checkpointed span.
    pub fn accumulate_focused(&mut self, delta: Duration) {
        let ceiling = self.last_checkpoint.duration_since(self.started_at);
        self.focused = (self.focused + delta).min(ceiling);
    }
}

/// `min(100, round(100 * focused / elapsed))`, or 0 for an empty session.
pub fn focus_score_percent(focused_seconds: u64, elapsed_seconds: u64) -> u8 {
    if elapsed_seconds == 0 {
        return 0;
    }
    let score = (100.0 * focused_seconds as f64 / elapsed_seconds as f64).round();
    score.min(100.0) as u8
}

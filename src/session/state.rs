use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::{focus_score_percent, SessionClock};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Grace,
    Alerting,
    Completed,
}

impl SessionStatus {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionStatus::Running | SessionStatus::Grace | SessionStatus::Alerting
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Running => "Running",
            SessionStatus::Grace => "Grace",
            SessionStatus::Alerting => "Alerting",
            SessionStatus::Completed => "Completed",
        }
    }
}

/// Live state of the one session the machine is tracking.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub target: Duration,
    pub clock: SessionClock,
    pub last_present_at: Instant,
    pub present: bool,
    /// Live lock flag; cleared once the lock window has been served.
    pub hardcore: bool,
    /// Whether the session was started in hardcore mode at all.
    pub started_hardcore: bool,
    pub warning_count: u32,
    pub ended_at: Option<Instant>,
}

impl SessionState {
    pub fn new(
        id: String,
        target: Duration,
        hardcore: bool,
        now: Instant,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: SessionStatus::Running,
            started_at,
            target,
            clock: SessionClock::start(now),
            last_present_at: now,
            present: true,
            hardcore,
            started_hardcore: hardcore,
            warning_count: 0,
            ended_at: None,
        }
    }

    /// Frozen at the completion instant once the session has ended.
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.clock.elapsed(self.ended_at.unwrap_or(now))
    }

    pub fn time_since_present(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_present_at)
    }
}

/// Read-only view handed to UI layers and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub remaining_seconds: u64,
    pub focused_seconds: u64,
    pub focus_score_percent: u8,
    pub present: bool,
    pub hardcore: bool,
    pub lock_remaining_seconds: u64,
    pub warning_count: u32,
}

impl SessionSnapshot {
    pub fn of(state: &SessionState, lock_window: Duration, now: Instant) -> Self {
        let elapsed = state.elapsed(now);
        let elapsed_seconds = elapsed.as_secs();
        let focused_seconds = state.clock.focused().as_secs();
        let lock_remaining = if state.hardcore {
            lock_window.saturating_sub(elapsed)
        } else {
            Duration::ZERO
        };

        Self {
            status: state.status,
            session_id: Some(state.id.clone()),
            started_at: Some(state.started_at),
            elapsed_seconds,
            remaining_seconds: state.target.saturating_sub(elapsed).as_secs(),
            focused_seconds,
            focus_score_percent: focus_score_percent(focused_seconds, elapsed_seconds),
            present: state.present,
            hardcore: state.hardcore,
            lock_remaining_seconds: lock_remaining.as_secs(),
            warning_count: state.warning_count,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.hardcore && self.lock_remaining_seconds > 0
    }
}

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::{
    error::{SessionError, SessionResult},
    models::{EndReason, SessionRecord},
};

use super::{
    clock::focus_score_percent,
    state::{SessionSnapshot, SessionState, SessionStatus},
};

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);
pub const DEFAULT_LOCK_WINDOW: Duration = Duration::from_secs(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub grace_period: Duration,
    pub lock_window: Duration,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            lock_window: DEFAULT_LOCK_WINDOW,
        }
    }
}

/// Side effects requested by a transition. The machine never performs I/O
/// itself; the controller executes these in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartAlert,
    StopAlert,
    HardcoreRequirementMet,
    CameraDegraded(String),
    Finalize(SessionRecord),
}

/// Session lifecycle: Idle -> Running <-> Grace -> Alerting -> Completed.
///
/// Every entry point takes the current instant so that absence and lock-window
/// checks are recomputed from state on each call. A tick and a presence update
/// may arrive in either order without changing the outcome.
#[derive(Debug, Default)]
pub struct AttentionStateMachine {
    config: MachineConfig,
    session: Option<SessionState>,
}

impl AttentionStateMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|session| session.status)
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        match &self.session {
            Some(session) => SessionSnapshot::of(session, self.config.lock_window, now),
            None => SessionSnapshot::default(),
        }
    }

    /// Enters `Running`. The caller has already acquired the camera; a
    /// completed session is archived and replaced.
    pub fn start(
        &mut self,
        id: String,
        target: Duration,
        hardcore: bool,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> SessionResult<()> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        self.session = Some(SessionState::new(id, target, hardcore, now, wall));
        Ok(())
    }

    pub fn on_presence(&mut self, present: bool, now: Instant) -> Vec<Effect> {
        let Some(session) = self.active_session_mut() else {
            return Vec::new();
        };
        session.clock.checkpoint(now, session.present);

        if !present {
            session.present = false;
            return self.evaluate_absence(now);
        }

        session.present = true;
        session.last_present_at = now;
        let previous = session.status;
        session.status = SessionStatus::Running;

        if previous == SessionStatus::Alerting {
            session.warning_count = 0;
            vec![Effect::StopAlert]
        } else {
            Vec::new()
        }
    }

    pub fn on_tick(&mut self, now: Instant, wall: DateTime<Utc>) -> Vec<Effect> {
        let grace_period = self.config.grace_period;
        let lock_window = self.config.lock_window;
        let Some(session) = self.active_session_mut() else {
            return Vec::new();
        };
        session.clock.checkpoint(now, session.present);

        let elapsed = session.elapsed(now);
        if elapsed >= session.target {
            return self.finalize(EndReason::Finished, now, wall);
        }

        let mut effects = Vec::new();
        if session.hardcore && elapsed >= lock_window {
            session.hardcore = false;
            effects.push(Effect::HardcoreRequirementMet);
        }

        let absent_too_long = session.status == SessionStatus::Grace
            && session.time_since_present(now) >= grace_period;
        if absent_too_long {
            effects.extend(self.evaluate_absence(now));
        }
        effects
    }

    /// User-initiated stop. Refused while a hardcore lock window is open.
    pub fn request_stop(
        &mut self,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> SessionResult<Vec<Effect>> {
        let lock_window = self.config.lock_window;
        let session = self
            .active_session_mut()
            .ok_or(SessionError::NoActiveSession)?;

        let elapsed = session.elapsed(now);
        if session.hardcore && elapsed < lock_window {
            return Err(SessionError::HardcoreLocked {
                remaining: lock_window - elapsed,
            });
        }

        Ok(self.finalize(EndReason::Stopped, now, wall))
    }

    /// A failed frame read. Hardcore sessions keep running and surface the
    /// failure every time it recurs; others end.
    pub fn on_camera_failure(
        &mut self,
        reason: &str,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Vec<Effect> {
        let Some(session) = self.active_session_mut() else {
            return Vec::new();
        };
        if session.hardcore {
            return vec![Effect::CameraDegraded(reason.to_string())];
        }
        self.finalize(EndReason::CameraDisconnected, now, wall)
    }

    /// Process shutdown: ends the session whatever its lock state.
    pub fn interrupt(&mut self, now: Instant, wall: DateTime<Utc>) -> Vec<Effect> {
        if !self.is_active() {
            return Vec::new();
        }
        self.finalize(EndReason::Interrupted, now, wall)
    }

    /// Claims the next alert firing, returning the warning index to display.
    /// `None` once the session has left `Alerting`.
    pub fn claim_warning(&mut self) -> Option<u32> {
        let session = self.session.as_mut()?;
        if session.status != SessionStatus::Alerting {
            return None;
        }
        let index = session.warning_count;
        session.warning_count = session.warning_count.saturating_add(1);
        Some(index)
    }

    fn active_session_mut(&mut self) -> Option<&mut SessionState> {
        self.session
            .as_mut()
            .filter(|session| session.status.is_active())
    }

    fn evaluate_absence(&mut self, now: Instant) -> Vec<Effect> {
        let grace_period = self.config.grace_period;
        let Some(session) = self.active_session_mut() else {
            return Vec::new();
        };

        if session.time_since_present(now) < grace_period {
            session.status = SessionStatus::Grace;
            return Vec::new();
        }

        if session.status == SessionStatus::Alerting {
            return Vec::new();
        }
        session.status = SessionStatus::Alerting;
        vec![Effect::StartAlert]
    }

    fn finalize(&mut self, reason: EndReason, now: Instant, wall: DateTime<Utc>) -> Vec<Effect> {
        let Some(session) = self.active_session_mut() else {
            return Vec::new();
        };
        session.clock.checkpoint(now, session.present);

        let mut effects = Vec::new();
        if session.status == SessionStatus::Alerting {
            effects.push(Effect::StopAlert);
        }

        let duration_seconds = session.elapsed(now).as_secs();
        let focused_seconds = session.clock.focused().as_secs().min(duration_seconds);
        session.status = SessionStatus::Completed;
        session.ended_at = Some(now);

        effects.push(Effect::Finalize(SessionRecord {
            id: session.id.clone(),
            start_time: session.started_at,
            end_time: wall,
            duration_seconds,
            focused_seconds,
            focus_score_percent: focus_score_percent(focused_seconds, duration_seconds),
            hardcore: session.started_hardcore,
            end_reason: reason,
            journal_text: None,
        }));
        effects
    }
}

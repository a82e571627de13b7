use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    thread,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::{
    runtime::Handle,
    sync::{broadcast, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    alert::{AlertLoop, Notifier, WarningSource},
    badges::Badge,
    blocker::{BlockGuard, SiteBlocker},
    error::{SessionError, SessionResult},
    models::SessionRecord,
    presence::{
        spawn_capture_loop, CameraProvider, CaptureOptions, DistractionMonitor,
        PresenceClassifier, PresenceSink, DEFAULT_WINDOW_SIZE,
    },
};

use super::{
    machine::{AttentionStateMachine, Effect, MachineConfig},
    recorder::{archive_session, SessionRecorder},
    state::SessionSnapshot,
};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub machine: MachineConfig,
    pub stabilizer_window: usize,
    pub alert_period: Duration,
    pub alert_messages: Vec<String>,
    pub distracting_sites: Vec<String>,
    pub distracting_apps: Vec<String>,
    pub frame_interval: Duration,
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            machine: MachineConfig::default(),
            stabilizer_window: DEFAULT_WINDOW_SIZE,
            alert_period: Duration::from_secs(3),
            alert_messages: vec!["Hey! Get back to work!".to_string()],
            distracting_sites: Vec::new(),
            distracting_apps: Vec::new(),
            frame_interval: Duration::from_millis(200),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Everything the controller talks to outside its own state.
#[derive(Clone)]
pub struct Collaborators {
    pub camera: Arc<dyn CameraProvider>,
    pub classifier: Arc<dyn PresenceClassifier>,
    pub blocker: Arc<dyn SiteBlocker>,
    pub recorder: Arc<dyn SessionRecorder>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone)]
pub enum SessionNotice {
    /// The hardcore lock window has been served; stopping is allowed again.
    HardcoreRequirementMet,
    /// A recoverable problem the user should hear about.
    Warning(SessionError),
    SessionCompleted {
        record: SessionRecord,
        new_badges: Vec<Badge>,
    },
}

/// Background work owned by one session.
struct SessionRun {
    cancel: CancellationToken,
    block: Option<BlockGuard>,
    capture: Option<thread::JoinHandle<()>>,
    clock: Option<JoinHandle<()>>,
    distraction: Option<JoinHandle<()>>,
}

impl Drop for SessionRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Completion {
    record: SessionRecord,
    run: Option<SessionRun>,
}

/// Handles of a finished session's loops and its archive task.
struct Teardown {
    run: Option<SessionRun>,
    archive: JoinHandle<()>,
}

impl Teardown {
    async fn join(mut self) {
        if let Some(mut run) = self.run.take() {
            if let Some(capture) = run.capture.take() {
                let _ = tokio::task::spawn_blocking(move || capture.join()).await;
            }
            if let Some(clock) = run.clock.take() {
                let _ = clock.await;
            }
            if let Some(distraction) = run.distraction.take() {
                let _ = distraction.await;
            }
        }
        let _ = self.archive.await;
    }
}

struct Core {
    machine: AttentionStateMachine,
    run: Option<SessionRun>,
}

struct ControllerInner {
    config: SessionConfig,
    collaborators: Collaborators,
    alerts: AlertLoop,
    core: Mutex<Core>,
    start_lock: tokio::sync::Mutex<()>,
    snapshots: watch::Sender<SessionSnapshot>,
    notices: broadcast::Sender<SessionNotice>,
    runtime: Handle,
}

/// Single entry point for every session transition.
///
/// The machine and the per-session loop handles live behind one mutex; each
/// event locks it, runs exactly one machine transition and applies the
/// resulting effects before releasing it. Blocker release and persistence
/// happen after the lock is dropped.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    /// Must be called from within a tokio runtime.
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        let (notices, _) = broadcast::channel(64);
        let alerts = AlertLoop::new(
            Arc::clone(&collaborators.notifier),
            config.alert_messages.clone(),
            config.alert_period,
        );

        Self {
            inner: Arc::new(ControllerInner {
                core: Mutex::new(Core {
                    machine: AttentionStateMachine::new(config.machine),
                    run: None,
                }),
                config,
                collaborators,
                alerts,
                start_lock: tokio::sync::Mutex::new(()),
                snapshots,
                notices,
                runtime: Handle::current(),
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.lock_core().machine.snapshot(Instant::now())
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.inner.notices.subscribe()
    }

    pub fn is_alerting(&self) -> bool {
        self.inner.alerts.is_running()
    }

    /// Acquires the camera, blocks distracting sites and enters `Running`.
    ///
    /// A camera that cannot be opened fails the start; a blocker that cannot
    /// be applied only produces a warning notice.
    pub async fn start_session(
        &self,
        duration: Duration,
        hardcore: bool,
    ) -> SessionResult<SessionSnapshot> {
        if duration.is_zero() {
            return Err(SessionError::InvalidConfig(
                "session duration must be greater than zero".into(),
            ));
        }
        let inner = &self.inner;
        let _starting = inner.start_lock.lock().await;
        if inner.lock_core().machine.is_active() {
            return Err(SessionError::AlreadyActive);
        }

        let camera = Arc::clone(&inner.collaborators.camera);
        let device = tokio::task::spawn_blocking(move || camera.open())
            .await
            .map_err(|err| SessionError::CameraUnavailable(err.to_string()))?
            .map_err(|err| SessionError::CameraUnavailable(format!("{err:#}")))?;

        let blocker = Arc::clone(&inner.collaborators.blocker);
        let sites = inner.config.distracting_sites.clone();
        let block = match tokio::task::spawn_blocking(move || BlockGuard::acquire(blocker, &sites))
            .await
        {
            Ok(Ok(guard)) => Some(guard),
            Ok(Err(err)) => {
                warn!("continuing without site blocking: {err}");
                inner.notify(SessionNotice::Warning(err.into()));
                None
            }
            Err(err) => {
                warn!("site blocking worker failed: {err}");
                inner.notify(SessionNotice::Warning(SessionError::SiteBlockFailed(
                    err.to_string(),
                )));
                None
            }
        };

        let session_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();

        let (distraction_rx, distraction) = if inner.config.distracting_apps.is_empty() {
            (None, None)
        } else {
            let (rx, handle) =
                DistractionMonitor::new(&inner.config.distracting_apps).spawn(cancel.child_token());
            (Some(rx), Some(handle))
        };

        let mut core = inner.lock_core();
        if core.machine.is_active() {
            cancel.cancel();
            return Err(SessionError::AlreadyActive);
        }

        // The capture thread blocks on the core lock until the machine has started.
        let sink: Arc<dyn PresenceSink> = Arc::new(LoopHandle(Arc::downgrade(inner)));
        let capture = spawn_capture_loop(
            session_id.clone(),
            device,
            Arc::clone(&inner.collaborators.classifier),
            sink,
            CaptureOptions {
                frame_interval: inner.config.frame_interval,
                stabilizer_window: inner.config.stabilizer_window,
                distraction: distraction_rx,
            },
            cancel.child_token(),
        )
        .map_err(|err| {
            cancel.cancel();
            SessionError::CameraUnavailable(format!("{err:#}"))
        })?;

        let now = Instant::now();
        if let Err(err) = core
            .machine
            .start(session_id.clone(), duration, hardcore, now, Utc::now())
        {
            cancel.cancel();
            return Err(err);
        }
        let clock = tokio::spawn(clock_loop(
            Arc::downgrade(inner),
            inner.config.tick_interval,
            cancel.child_token(),
        ));
        core.run = Some(SessionRun {
            cancel,
            block,
            capture: Some(capture),
            clock: Some(clock),
            distraction,
        });

        let snapshot = core.machine.snapshot(now);
        inner.snapshots.send_replace(snapshot.clone());
        info!(
            "focus session {} started ({}s{})",
            session_id,
            duration.as_secs(),
            if hardcore { ", hardcore" } else { "" }
        );
        Ok(snapshot)
    }

    /// User stop. Rejected with `HardcoreLocked` while the lock window is open.
    pub fn request_stop(&self) -> SessionResult<SessionSnapshot> {
        let result = self
            .inner
            .dispatch(|machine, now, wall| machine.request_stop(now, wall));
        if let Err(err @ SessionError::HardcoreLocked { .. }) = &result {
            info!("stop rejected: {err}");
            self.inner.notify(SessionNotice::Warning(err.clone()));
        }
        result?;
        Ok(self.snapshot())
    }

    /// Ends any active session as `Interrupted`, ignoring the hardcore lock,
    /// and waits for its loops and its archive write to finish.
    pub async fn shutdown(&self) {
        let completion = self
            .inner
            .transition(|machine, now, wall| Ok(machine.interrupt(now, wall)));
        self.inner.alerts.stop();
        if let Ok(Some(completion)) = completion {
            info!("session interrupted by shutdown");
            self.inner.complete(completion).join().await;
        }
    }
}

impl ControllerInner {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }

    fn dispatch<F>(self: &Arc<Self>, event: F) -> SessionResult<()>
    where
        F: FnOnce(&mut AttentionStateMachine, Instant, DateTime<Utc>) -> SessionResult<Vec<Effect>>,
    {
        if let Some(completion) = self.transition(event)? {
            // Dropping the teardown detaches the loops; they already saw the cancel.
            drop(self.complete(completion));
        }
        Ok(())
    }

    /// Runs one machine transition under the lock and applies its effects.
    fn transition<F>(self: &Arc<Self>, event: F) -> SessionResult<Option<Completion>>
    where
        F: FnOnce(&mut AttentionStateMachine, Instant, DateTime<Utc>) -> SessionResult<Vec<Effect>>,
    {
        let mut core = self.lock_core();
        let now = Instant::now();
        let effects = event(&mut core.machine, now, Utc::now())?;

        let mut completion = None;
        for effect in effects {
            match effect {
                Effect::StartAlert => {
                    let weak = Arc::downgrade(self);
                    let source: Weak<dyn WarningSource> = weak;
                    self.alerts.start(source);
                }
                Effect::StopAlert => self.alerts.stop(),
                Effect::HardcoreRequirementMet => {
                    info!("hardcore lock window served");
                    self.notify(SessionNotice::HardcoreRequirementMet);
                }
                Effect::CameraDegraded(reason) => {
                    self.notify(SessionNotice::Warning(SessionError::CameraDisconnected(
                        reason,
                    )));
                }
                Effect::Finalize(record) => {
                    let run = core.run.take();
                    if let Some(run) = &run {
                        run.cancel.cancel();
                    }
                    completion = Some(Completion { record, run });
                }
            }
        }

        self.snapshots.send_replace(core.machine.snapshot(now));
        Ok(completion)
    }

    /// Releases the site block and archives the record. Runs without the lock.
    fn complete(self: &Arc<Self>, completion: Completion) -> Teardown {
        let Completion { record, mut run } = completion;
        let block = run.as_mut().and_then(|run| run.block.take());
        info!(
            "focus session {} finished: {} ({}s, {}% focused)",
            record.id,
            record.end_reason.as_str(),
            record.duration_seconds,
            record.focus_score_percent
        );

        let recorder = Arc::clone(&self.collaborators.recorder);
        let notices = self.notices.clone();
        let archive = self.runtime.spawn(async move {
            // Rewriting the hosts file is blocking I/O.
            if let Some(block) = block {
                if let Err(err) = tokio::task::spawn_blocking(move || block.release()).await {
                    error!("site block release worker failed: {err}");
                }
            }
            let new_badges = match archive_session(recorder.as_ref(), &record).await {
                Ok(badges) => badges,
                Err(err) => {
                    error!("failed to archive session {}: {err:#}", record.id);
                    let _ = notices.send(SessionNotice::Warning(SessionError::PersistenceFailure(
                        format!("{err:#}"),
                    )));
                    Vec::new()
                }
            };
            let _ = notices.send(SessionNotice::SessionCompleted { record, new_badges });
        });

        Teardown { run, archive }
    }

    fn presence_update(self: &Arc<Self>, present: bool) {
        let _ = self.dispatch(|machine, now, _| Ok(machine.on_presence(present, now)));
    }

    fn tick(self: &Arc<Self>) {
        let _ = self.dispatch(|machine, now, wall| Ok(machine.on_tick(now, wall)));
    }

    fn camera_failed(self: &Arc<Self>, reason: &str) -> bool {
        let mut ended = false;
        let _ = self.dispatch(|machine, now, wall| {
            let effects = machine.on_camera_failure(reason, now, wall);
            ended = effects
                .iter()
                .any(|effect| matches!(effect, Effect::Finalize(_)));
            // Must precede the completion notice.
            if ended {
                warn!("camera lost, session ended: {reason}");
                self.notify(SessionNotice::Warning(SessionError::CameraDisconnected(
                    reason.to_string(),
                )));
            }
            Ok(effects)
        });
        if ended {
            return false;
        }
        self.lock_core().machine.is_active()
    }
}

impl WarningSource for ControllerInner {
    fn claim_warning(&self) -> Option<u32> {
        let mut core = self.lock_core();
        let claimed = core.machine.claim_warning();
        if claimed.is_some() {
            self.snapshots
                .send_replace(core.machine.snapshot(Instant::now()));
        }
        claimed
    }
}

/// Non-owning handle given to the capture thread.
struct LoopHandle(Weak<ControllerInner>);

impl PresenceSink for LoopHandle {
    fn presence_update(&self, present: bool) {
        if let Some(inner) = self.0.upgrade() {
            inner.presence_update(present);
        }
    }

    fn camera_failed(&self, reason: &str) -> bool {
        self.0
            .upgrade()
            .is_some_and(|inner| inner.camera_failed(reason))
    }
}

async fn clock_loop(inner: Weak<ControllerInner>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.tick();
            }
            _ = cancel.cancelled() => break,
        }
    }
}

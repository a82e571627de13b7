use std::{
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Duration,
};

use anyhow::Result;
use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

// Set to true to log every firing
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Side effect fired on every alert period, e.g. a sound or a desktop toast.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str) -> Result<()>;
}

/// Hands out warning indexes while the session is alerting. `None` means the
/// alert is over and the loop should exit.
pub trait WarningSource: Send + Sync {
    fn claim_warning(&self) -> Option<u32>;
}

struct RunningAlert {
    cancel: CancellationToken,
    _handle: JoinHandle<()>,
}

/// Repeating notification cadence active while a session is alerting.
///
/// `start` and `stop` are both idempotent; at most one firing task exists.
pub struct AlertLoop {
    notifier: Arc<dyn Notifier>,
    messages: Arc<[String]>,
    period: Duration,
    runtime: Handle,
    running: Mutex<Option<RunningAlert>>,
}

impl AlertLoop {
    /// Must be called from within a tokio runtime; the loop task is spawned on it.
    pub fn new(notifier: Arc<dyn Notifier>, messages: Vec<String>, period: Duration) -> Self {
        let messages = if messages.is_empty() {
            vec!["Come back to your desk!".to_string()]
        } else {
            messages
        };
        Self {
            notifier,
            messages: messages.into(),
            period: period.max(Duration::from_millis(1)),
            runtime: Handle::current(),
            running: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|alert| !alert.cancel.is_cancelled())
    }

    /// Fires immediately, then once per period until `stop` or until `source`
    /// stops handing out warnings.
    pub fn start(&self, source: Weak<dyn WarningSource>) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running
            .as_ref()
            .is_some_and(|alert| !alert.cancel.is_cancelled())
        {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = self.runtime.spawn(alert_loop(
            source,
            Arc::clone(&self.notifier),
            Arc::clone(&self.messages),
            self.period,
            cancel.clone(),
        ));
        *running = Some(RunningAlert {
            cancel,
            _handle: handle,
        });
    }

    pub fn stop(&self) {
        if let Some(alert) = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            alert.cancel.cancel();
        }
    }
}

impl Drop for AlertLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn alert_loop(
    source: Weak<dyn WarningSource>,
    notifier: Arc<dyn Notifier>,
    messages: Arc<[String]>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log_info!("alert loop started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(index) = source.upgrade().and_then(|source| source.claim_warning()) else {
                    break;
                };
                let message = &messages[index as usize % messages.len()];
                log_info!("alert #{}: {}", index + 1, message);
                if let Err(err) = notifier.notify(message) {
                    log_warn!("alert notification failed: {err:#}");
                }
            }
        }
    }

    cancel.cancel();
    log_info!("alert loop stopped");
}

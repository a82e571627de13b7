use std::time::Duration;

use log::{info, warn};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Best-effort detector for distracting applications.
///
/// Process names are matched case-insensitively against the configured list.
/// It has no reliability guarantee: a renamed binary or a browser tab goes
/// unnoticed.
pub struct DistractionMonitor {
    system: System,
    apps: Vec<String>,
    own_pid: u32,
}

impl DistractionMonitor {
    pub fn new(apps: &[String]) -> Self {
        Self {
            system: System::new(),
            apps: apps
                .iter()
                .map(|app| app.trim().to_lowercase())
                .filter(|app| !app.is_empty())
                .collect(),
            own_pid: std::process::id(),
        }
    }

    /// Returns the first configured application that is currently running.
    pub fn poll(&mut self) -> Option<String> {
        if self.apps.is_empty() {
            return None;
        }

        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::new(),
        );

        self.system
            .processes()
            .iter()
            .filter(|(pid, _)| pid.as_u32() != self.own_pid)
            .find_map(|(_, process)| {
                let name = process.name().to_string_lossy().to_lowercase();
                self.apps
                    .iter()
                    .find(|app| matches_app(&name, app))
                    .cloned()
            })
    }

    /// Polls on a background task until `cancel` fires. The receiver holds the
    /// name of the distracting application currently running, if any.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (watch::Receiver<Option<String>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(None);
        let mut monitor = self;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let polled = tokio::task::spawn_blocking(move || {
                            let found = monitor.poll();
                            (monitor, found)
                        })
                        .await;
                        let found = match polled {
                            Ok((returned, found)) => {
                                monitor = returned;
                                found
                            }
                            Err(err) => {
                                warn!("distraction poll worker failed: {err}");
                                break;
                            }
                        };
                        if found != *tx.borrow() {
                            if let Some(app) = &found {
                                info!("distracting application running: {app}");
                            }
                            let _ = tx.send(found);
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });

        (rx, handle)
    }
}

fn matches_app(process_name: &str, app: &str) -> bool {
    let stem = process_name.strip_suffix(".exe").unwrap_or(process_name);
    stem == app || stem.starts_with(&format!("{app}-")) || stem.starts_with(&format!("{app} "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_names_and_variants() {
        assert!(matches_app("steam", "steam"));
        assert!(matches_app("steam.exe", "steam"));
        assert!(matches_app("discord-ptb", "discord"));
        assert!(!matches_app("steamroller", "steam"));
        assert!(!matches_app("cargo", "steam"));
    }

    #[test]
    fn empty_list_never_reports() {
        let mut monitor = DistractionMonitor::new(&["  ".to_string()]);
        assert_eq!(monitor.poll(), None);
    }
}

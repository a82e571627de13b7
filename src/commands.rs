use std::{io::Write, path::Path, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use chrono::{Local, Utc};
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    audio::SoundNotifier,
    badges::{Badge, FocusStats},
    blocker::{HostsFileBlocker, SiteBlocker},
    error::SessionError,
    presence::{BaselineClassifier, CameraProvider, SnapshotCamera},
    session::{recorder, Collaborators, SessionController, SessionNotice, SessionSnapshot},
    settings::session_length,
    AppState,
};

fn format_clock(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn status_line(snapshot: &SessionSnapshot) -> String {
    let mut line = format!(
        "[{}] {} left | focused {} ({}%) | {}",
        snapshot.status.as_str(),
        format_clock(snapshot.remaining_seconds),
        format_clock(snapshot.focused_seconds),
        snapshot.focus_score_percent,
        if snapshot.present { "at desk" } else { "away" },
    );
    if snapshot.is_locked() {
        line.push_str(&format!(
            " | locked {}",
            format_clock(snapshot.lock_remaining_seconds)
        ));
    }
    if snapshot.warning_count > 0 {
        line.push_str(&format!(" | warnings {}", snapshot.warning_count));
    }
    line
}

pub(crate) async fn start_session(
    state: &AppState,
    minutes: Option<u64>,
    hardcore: bool,
) -> Result<()> {
    let settings = state.settings.get();
    settings.validate()?;
    let duration = match minutes {
        Some(minutes) => session_length(minutes)?,
        None => settings.session_duration()?,
    };

    let classifier =
        BaselineClassifier::from_path(&settings.camera.baseline_path, settings.camera.sensitivity)
            .context("no baseline frame; run `focusbuddy calibrate` with the desk empty")?;
    let blocker = Arc::new(HostsFileBlocker::new(settings.hosts_file.clone()));
    // Clear a block left by a session that never got to release it.
    if let Err(err) = blocker.unblock() {
        warn!("could not clear a stale site block: {err}");
    }

    let collaborators = Collaborators {
        camera: Arc::new(SnapshotCamera::new(settings.camera.snapshot_path.clone())),
        classifier: Arc::new(classifier),
        blocker,
        recorder: Arc::new(state.db.clone()),
        notifier: Arc::new(SoundNotifier::new(settings.alert_sound)),
    };
    let controller = SessionController::new(settings.session_config(), collaborators);
    let mut notices = controller.notices();

    controller.start_session(duration, hardcore).await?;
    println!(
        "Focus session started for {} minutes{}. Press Ctrl-C to stop.",
        duration.as_secs() / 60,
        if hardcore { " (hardcore)" } else { "" }
    );

    let heartbeat_every_ticks: u32 = if state.debug_mode { 1 } else { 10 };
    let mut ticks: u32 = 0;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut last_warning: Option<String> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = controller.snapshot();
                print!("\r{:<90}", status_line(&snapshot));
                let _ = std::io::stdout().flush();
                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every_ticks == 0 {
                    info!("heartbeat: {}", serde_json::to_string(&snapshot)?);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for Ctrl-C")?;
                match controller.request_stop() {
                    // The rejection arrives as a notice as well.
                    Ok(_) | Err(SessionError::HardcoreLocked { .. }) => {}
                    Err(err) => println!("\n{err}"),
                }
            }
            notice = notices.recv() => match notice {
                Ok(SessionNotice::SessionCompleted { record, new_badges }) => {
                    println!();
                    println!(
                        "Session {} ended ({}): {} focused of {}, score {}%",
                        record.id,
                        record.end_reason.as_str(),
                        format_clock(record.focused_seconds),
                        format_clock(record.duration_seconds),
                        record.focus_score_percent
                    );
                    for badge in new_badges {
                        println!("New badge: {} - {}", badge.title(), badge.description());
                    }
                    break;
                }
                Ok(SessionNotice::HardcoreRequirementMet) => {
                    println!("\nHardcore lock served; Ctrl-C now ends the session.");
                }
                Ok(SessionNotice::Warning(err)) => {
                    let message = err.to_string();
                    if last_warning.as_deref() != Some(message.as_str()) {
                        println!("\n{message}");
                        last_warning = Some(message);
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    controller.shutdown().await;
    Ok(())
}

pub(crate) async fn show_stats(state: &AppState) -> Result<()> {
    let history = state.db.list_sessions_since(None).await?;
    let stats = FocusStats::from_records(&history, Local::now().date_naive());

    println!("Sessions:        {} ({} today)", stats.total_sessions, stats.sessions_today);
    println!(
        "Focused time:    {}h {:02}m",
        stats.total_focused_seconds / 3600,
        (stats.total_focused_seconds % 3600) / 60
    );
    println!("Current streak:  {} days", stats.streak_days);
    println!("Journal entries: {}", stats.journal_entries);
    println!();
    let widest = stats
        .weekly_minutes
        .iter()
        .map(|(_, minutes)| *minutes)
        .max()
        .unwrap_or(0)
        .max(1);
    for (day, minutes) in &stats.weekly_minutes {
        let bar = "#".repeat((minutes * 30 / widest) as usize);
        println!("{} {:>4}m {}", day.format("%a %d"), minutes, bar);
    }
    Ok(())
}

pub(crate) async fn show_history(state: &AppState, days: Option<u32>) -> Result<()> {
    let since = days.map(|days| Utc::now() - chrono::Duration::days(i64::from(days)));
    let sessions = state.db.list_sessions_since(since).await?;
    if sessions.is_empty() {
        println!("No sessions yet.");
        return Ok(());
    }

    for record in sessions {
        println!(
            "{}  {}  {:>6}  {:>3}%  {:<18} {}{}",
            record.id,
            record.start_time.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            format_clock(record.duration_seconds),
            record.focus_score_percent,
            record.end_reason.as_str(),
            if record.hardcore { "hardcore " } else { "" },
            record.journal_text.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub(crate) async fn show_badges(state: &AppState) -> Result<()> {
    let earned = state.db.list_badges().await?;
    for badge in Badge::ALL {
        match earned.iter().find(|entry| entry.badge == badge) {
            Some(entry) => println!(
                "[x] {:<16} {} (earned {})",
                badge.title(),
                badge.description(),
                entry.earned_at.with_timezone(&Local).format("%Y-%m-%d")
            ),
            None => println!("[ ] {:<16} {}", badge.title(), badge.description()),
        }
    }
    Ok(())
}

pub(crate) async fn write_journal(state: &AppState, session_id: &str, text: &str) -> Result<()> {
    let fresh = recorder::write_journal(&state.db, session_id, text).await?;
    println!("Journal saved for {session_id}.");
    for badge in fresh {
        println!("New badge: {} - {}", badge.title(), badge.description());
    }
    Ok(())
}

pub(crate) async fn export_sessions(state: &AppState, path: &Path) -> Result<()> {
    let sessions = state.db.list_sessions_since(None).await?;
    let serialized = serde_json::to_string_pretty(&sessions)?;
    std::fs::write(path, serialized)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Exported {} sessions to {}", sessions.len(), path.display());
    Ok(())
}

pub(crate) async fn reset_stats(state: &AppState) -> Result<()> {
    state.db.reset_stats().await?;
    println!("All sessions and badges deleted.");
    Ok(())
}

pub(crate) async fn calibrate(state: &AppState) -> Result<()> {
    let settings = state.settings.get();
    let camera = SnapshotCamera::new(settings.camera.snapshot_path.clone());
    let baseline_path = settings.camera.baseline_path.clone();

    let saved = baseline_path.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let frame = camera.open()?.read_frame()?;
        if let Some(parent) = saved.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        frame
            .save(&saved)
            .with_context(|| format!("Failed to write baseline {}", saved.display()))
    })
    .await
    .context("calibration worker failed")??;

    println!("Baseline saved to {}", baseline_path.display());
    Ok(())
}

/// Prints the settings, or one value, or sets `key` to `value`.
pub(crate) fn configure(state: &AppState, key: Option<&str>, value: Option<&str>) -> Result<()> {
    let current = state.settings.get();
    match (key, value) {
        (None, _) => println!("{}", serde_json::to_string_pretty(&current)?),
        (Some(key), None) => {
            let document = serde_json::to_value(&current)?;
            let pointer = format!("/{}", key.replace('.', "/"));
            let found = document
                .pointer(&pointer)
                .ok_or_else(|| anyhow!("unknown setting `{key}`"))?;
            println!("{}", serde_json::to_string_pretty(found)?);
        }
        (Some(key), Some(value)) => {
            state.settings.update(current.with_value(key, value)?)?;
            println!("Updated {key}.");
        }
    }
    Ok(())
}

pub(crate) fn unblock(state: &AppState) -> Result<()> {
    let blocker = HostsFileBlocker::new(state.settings.get().hosts_file);
    blocker.unblock()?;
    println!("Site block removed.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;

    #[test]
    fn status_line_shows_lock_and_warnings() {
        let snapshot = SessionSnapshot {
            status: SessionStatus::Alerting,
            remaining_seconds: 1_199,
            focused_seconds: 61,
            focus_score_percent: 42,
            hardcore: true,
            lock_remaining_seconds: 300,
            warning_count: 2,
            ..Default::default()
        };

        let line = status_line(&snapshot);

        assert!(line.starts_with("[Alerting] 19:59 left | focused 01:01 (42%) | away"));
        assert!(line.contains("locked 05:00"));
        assert!(line.ends_with("warnings 2"));
    }
}

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::{
    camera::CaptureDevice, classifier::PresenceClassifier, stabilizer::PresenceStabilizer,
};

// Set to true to enable per-frame logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Receiver of the capture loop's output.
pub trait PresenceSink: Send + Sync {
    /// Called with the stabilized verdict after every frame.
    fn presence_update(&self, present: bool);

    /// Called when a frame could not be read. Returning `false` stops the loop
    /// and releases the device.
    fn camera_failed(&self, reason: &str) -> bool;
}

pub struct CaptureOptions {
    pub frame_interval: Duration,
    pub stabilizer_window: usize,
    /// While this reports a running application, frames count as absent.
    pub distraction: Option<watch::Receiver<Option<String>>>,
}

/// Spawns the capture loop on a dedicated thread that owns `device` until
/// `cancel` fires or the sink gives up on the camera.
pub fn spawn_capture_loop(
    session_id: String,
    device: Box<dyn CaptureDevice>,
    classifier: Arc<dyn PresenceClassifier>,
    sink: Arc<dyn PresenceSink>,
    options: CaptureOptions,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("capture-{session_id}"))
        .spawn(move || {
            capture_loop(&session_id, device, classifier.as_ref(), sink.as_ref(), options, &cancel)
        })
        .context("failed to spawn capture thread")
}

fn capture_loop(
    session_id: &str,
    mut device: Box<dyn CaptureDevice>,
    classifier: &dyn PresenceClassifier,
    sink: &dyn PresenceSink,
    options: CaptureOptions,
    cancel: &CancellationToken,
) {
    log_info!("capture loop started for session {}", session_id);
    let mut stabilizer = PresenceStabilizer::new(options.stabilizer_window);
    let mut camera_ok = true;

    while !cancel.is_cancelled() {
        let raw = match device.read_frame() {
            Ok(frame) => {
                if !camera_ok {
                    log_info!("camera recovered for session {}", session_id);
                    camera_ok = true;
                }
                let distraction = options
                    .distraction
                    .as_ref()
                    .and_then(|rx| rx.borrow().clone());
                match distraction {
                    Some(app) => {
                        log_debug!("{} is running, counting frame as absent", app);
                        false
                    }
                    None => classifier.classify(&frame).unwrap_or_else(|err| {
                        log_warn!("presence classification failed: {err:#}");
                        false
                    }),
                }
            }
            Err(err) => {
                let reason = format!("{err:#}");
                if camera_ok {
                    log_warn!("camera read failed for session {}: {}", session_id, reason);
                    camera_ok = false;
                }
                if !sink.camera_failed(&reason) {
                    break;
                }
                false
            }
        };

        if cancel.is_cancelled() {
            break;
        }
        let verdict = stabilizer.update(raw);
        log_debug!("frame raw={} stabilized={}", raw, verdict);
        sink.presence_update(verdict);

        thread::sleep(options.frame_interval);
    }

    drop(device);
    log_info!("capture loop stopped for session {}, camera released", session_id);
}

use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use anyhow::{anyhow, Context, Result};

use super::classifier::Frame;

/// An opened video source. Owned by exactly one capture loop; dropping it
/// releases the device.
pub trait CaptureDevice: Send {
    /// May block until a frame is available.
    fn read_frame(&mut self) -> Result<Frame>;
}

/// Acquires a fresh [`CaptureDevice`] for each session.
pub trait CameraProvider: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureDevice>>;
}

const DEFAULT_MAX_FRAME_AGE: Duration = Duration::from_secs(5);

/// Camera backed by a still image that an external capture tool
/// (`ffmpeg -update 1`, `fswebcam --loop`, ...) keeps overwriting.
///
/// A snapshot that stops changing for longer than `max_frame_age` is treated
/// as a disconnected camera.
#[derive(Debug, Clone)]
pub struct SnapshotCamera {
    path: PathBuf,
    max_frame_age: Duration,
}

impl SnapshotCamera {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_frame_age: DEFAULT_MAX_FRAME_AGE,
        }
    }

    pub fn with_max_frame_age(mut self, max_frame_age: Duration) -> Self {
        self.max_frame_age = max_frame_age;
        self
    }
}

impl CameraProvider for SnapshotCamera {
    fn open(&self) -> Result<Box<dyn CaptureDevice>> {
        let mut device = SnapshotDevice {
            path: self.path.clone(),
            max_frame_age: self.max_frame_age,
        };
        device
            .read_frame()
            .with_context(|| format!("no usable frame at {}", self.path.display()))?;
        Ok(Box::new(device))
    }
}

struct SnapshotDevice {
    path: PathBuf,
    max_frame_age: Duration,
}

impl CaptureDevice for SnapshotDevice {
    fn read_frame(&mut self) -> Result<Frame> {
        let metadata = std::fs::metadata(&self.path)
            .with_context(|| format!("snapshot {} is gone", self.path.display()))?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .unwrap_or_default();
        if age > self.max_frame_age {
            return Err(anyhow!(
                "snapshot {} has not been updated for {}s",
                self.path.display(),
                age.as_secs()
            ));
        }

        image::open(&self.path)
            .with_context(|| format!("failed to decode snapshot {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn missing_snapshot_cannot_be_opened() {
        let dir = tempfile::tempdir().unwrap();
        let camera = SnapshotCamera::new(dir.path().join("frame.png"));
        assert!(camera.open().is_err());
    }

    #[test]
    fn reads_fresh_snapshot_and_fails_once_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .save(&path)
            .unwrap();

        let camera = SnapshotCamera::new(path.clone());
        let mut device = camera.open().unwrap();
        assert_eq!(device.read_frame().unwrap().width(), 8);

        std::fs::remove_file(&path).unwrap();
        assert!(device.read_frame().is_err());
    }

    #[test]
    fn stale_snapshot_counts_as_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        DynamicImage::ImageRgb8(RgbImage::new(8, 8))
            .save(&path)
            .unwrap();

        let camera = SnapshotCamera::new(path).with_max_frame_age(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(20));

        assert!(camera.open().is_err());
    }
}

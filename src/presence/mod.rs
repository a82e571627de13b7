//! Turns camera frames into a debounced "user is at the desk" signal.

pub mod camera;
pub mod capture;
pub mod classifier;
pub mod distraction;
pub mod stabilizer;

pub use camera::{CameraProvider, CaptureDevice, SnapshotCamera};
pub use capture::{spawn_capture_loop, CaptureOptions, PresenceSink};
pub use classifier::{compute_phash, BaselineClassifier, Frame, PresenceClassifier, Sensitivity};
pub use distraction::DistractionMonitor;
pub use stabilizer::{PresenceStabilizer, DEFAULT_WINDOW_SIZE};

use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use image_hasher::{HashAlg, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};

pub type Frame = DynamicImage;

/// Opaque per-frame presence signal. Implementations may be slow or flaky;
/// errors are handled by the capture loop, never by the session core.
pub trait PresenceClassifier: Send + Sync {
    fn classify(&self, frame: &Frame) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Minimum hash distance from the empty-desk baseline that counts as
    /// someone sitting there. Higher sensitivity reacts to smaller changes.
    pub fn distance_threshold(self) -> u32 {
        match self {
            Sensitivity::Low => 18,
            Sensitivity::Medium => 12,
            Sensitivity::High => 8,
        }
    }
}

pub fn compute_phash(frame: &Frame) -> ImageHash {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();
    hasher.hash_image(frame)
}

/// Compares every frame against a calibrated picture of the empty workstation.
pub struct BaselineClassifier {
    baseline: ImageHash,
    threshold: u32,
}

impl BaselineClassifier {
    pub fn new(baseline: &Frame, sensitivity: Sensitivity) -> Self {
        Self {
            baseline: compute_phash(baseline),
            threshold: sensitivity.distance_threshold(),
        }
    }

    pub fn from_path(path: &Path, sensitivity: Sensitivity) -> Result<Self> {
        let baseline = image::open(path)
            .with_context(|| format!("failed to load baseline frame {}", path.display()))?;
        Ok(Self::new(&baseline, sensitivity))
    }

    pub fn distance(&self, frame: &Frame) -> u32 {
        self.baseline.dist(&compute_phash(frame))
    }
}

impl PresenceClassifier for BaselineClassifier {
    fn classify(&self, frame: &Frame) -> Result<bool> {
        Ok(self.distance(frame) >= self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn empty_desk() -> Frame {
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, _| {
            let shade = (x * 4) as u8;
            Rgb([shade, shade, shade])
        }))
    }

    fn occupied_desk() -> Frame {
        DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, y| {
            let inside = (16..48).contains(&x) && (8..64).contains(&y);
            let shade = if inside { 255 - (y * 3) as u8 } else { (x * 4) as u8 };
            Rgb([shade, shade, shade])
        }))
    }

    #[test]
    fn baseline_frame_is_not_present() {
        let classifier = BaselineClassifier::new(&empty_desk(), Sensitivity::Medium);
        assert_eq!(classifier.distance(&empty_desk()), 0);
        assert!(!classifier.classify(&empty_desk()).unwrap());
    }

    #[test]
    fn changed_scene_is_further_from_baseline() {
        let classifier = BaselineClassifier::new(&empty_desk(), Sensitivity::High);
        assert!(classifier.distance(&occupied_desk()) > 0);
    }

    #[test]
    fn sensitivity_orders_thresholds() {
        assert!(Sensitivity::High.distance_threshold() < Sensitivity::Medium.distance_threshold());
        assert!(Sensitivity::Medium.distance_threshold() < Sensitivity::Low.distance_threshold());
    }
}

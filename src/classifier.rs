//! Per-frame hand shape classification.

use glam::Vec2;
use serde::Serialize;

use crate::config::ClassifierThresholds;
use crate::error::FrameError;
use crate::landmarks::{FINGERTIPS, INDEX_TIP, LandmarkFrame, MIDDLE_MCP, MIDDLE_TIP, THUMB_TIP, WRIST};

/// Fingertips that must agree for a fist or an open palm.
const FINGER_QUORUM: usize = 3;

/// Maps normalized camera coordinates to a ±3 unit control range.
const POINTER_GAIN: f32 = 6.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    #[default]
    Neutral,
    Fist,
    Open,
    Pinch,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureFeatures {
    pub palm_scale: f32,
    pub norm_pinch: f32,
    pub folded: usize,
    pub extended: usize,
    pub middle_extended: bool,
}

/// Result of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub gesture: Gesture,
    /// `None` when the palm scale is degenerate.
    pub features: Option<GestureFeatures>,
    pub pointer: Vec2,
    /// Raw pinch amount fed to the smoother: 0 = touching, 1 = apart.
    pub pinch: f32,
}

#[derive(Debug, Clone)]
pub struct GestureClassifier {
    th: ClassifierThresholds,
}

impl GestureClassifier {
    pub fn new(th: ClassifierThresholds) -> Self {
        Self { th }
    }

    pub fn set_thresholds(&mut self, th: ClassifierThresholds) {
        self.th = th;
    }

    pub fn features(&self, frame: &LandmarkFrame) -> Option<GestureFeatures> {
        let palm_scale = frame.distance(WRIST, MIDDLE_MCP);
        if !(palm_scale > 0.0) {
            return None;
        }

        let mut folded = 0;
        let mut extended = 0;
        for &tip in &FINGERTIPS {
            let d = frame.distance(tip, WRIST);
            if d < self.th.fold_ratio * palm_scale {
                folded += 1;
            } else if d > self.th.extend_ratio * palm_scale {
                extended += 1;
            }
        }

        let norm_pinch = (frame.distance(THUMB_TIP, INDEX_TIP) / palm_scale).clamp(0.0, 1.0);
        let middle_extended =
            frame.distance(WRIST, MIDDLE_TIP) > self.th.middle_extend_ratio * palm_scale;

        Some(GestureFeatures {
            palm_scale,
            norm_pinch,
            folded,
            extended,
            middle_extended,
        })
    }

    pub fn decide(&self, f: &GestureFeatures) -> Gesture {
        if f.folded >= FINGER_QUORUM {
            Gesture::Fist
        } else if f.extended >= FINGER_QUORUM {
            Gesture::Open
        } else if f.norm_pinch < self.th.pinch_ratio && f.middle_extended {
            Gesture::Pinch
        } else {
            Gesture::Neutral
        }
    }

    /// Classify one frame. Fails only when the geometry overflows to
    /// non-finite values; a zero palm scale is just `Neutral`.
    pub fn classify(&self, frame: &LandmarkFrame) -> Result<Classification, FrameError> {
        let pointer = raw_pointer(frame);
        if !pointer.is_finite() {
            return Err(FrameError::DegenerateFeatures);
        }
        let features = self.features(frame);
        if let Some(f) = &features {
            if !f.palm_scale.is_finite() || !f.norm_pinch.is_finite() {
                return Err(FrameError::DegenerateFeatures);
            }
        }
        let gesture = features.as_ref().map_or(Gesture::Neutral, |f| self.decide(f));
        let pinch = features.as_ref().map_or(1.0, |f| f.norm_pinch);
        Ok(Classification {
            gesture,
            features,
            pointer,
            pinch,
        })
    }
}

/// Wrist position in control units; the horizontal axis is mirrored to match
/// a mirrored preview.
pub fn raw_pointer(frame: &LandmarkFrame) -> Vec2 {
    let w = frame.wrist();
    Vec2::new((0.5 - w.x) * POINTER_GAIN, (0.5 - w.y) * POINTER_GAIN)
}

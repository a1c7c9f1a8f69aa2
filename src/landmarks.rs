//! Hand landmark frames and synthetic poses.

use glam::{Vec2, Vec3};

use crate::error::FrameError;

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_TIP: usize = 20;

/// Fingertips used for the fold/extend census (thumb excluded).
pub const FINGERTIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

/// One hand: 21 points in normalized camera space (x/y in [0,1]).
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    points: [Vec3; LANDMARK_COUNT],
}

/// What the acquisition side delivered for one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Hand(LandmarkFrame),
    NoHand,
}

impl LandmarkFrame {
    pub fn new(points: [Vec3; LANDMARK_COUNT]) -> Result<Self, FrameError> {
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(FrameError::NonFinite { index });
        }
        Ok(Self { points })
    }

    pub fn from_slice(points: &[Vec3]) -> Result<Self, FrameError> {
        let arr: [Vec3; LANDMARK_COUNT] =
            points.try_into().map_err(|_| FrameError::WrongCount {
                expected: LANDMARK_COUNT,
                got: points.len(),
            })?;
        Self::new(arr)
    }

    pub fn point(&self, idx: usize) -> Vec3 {
        self.points[idx]
    }

    pub fn points(&self) -> &[Vec3; LANDMARK_COUNT] {
        &self.points
    }

    pub fn wrist(&self) -> Vec3 {
        self.points[WRIST]
    }

    pub fn distance(&self, a: usize, b: usize) -> f32 {
        self.points[a].distance(self.points[b])
    }
}

impl Sample {
    /// Parse one JSON line: `null` or `[]` for no hand, otherwise an array of
    /// 21 `[x, y, z]` triples.
    pub fn from_json_line(line: &str) -> Result<Self, FrameError> {
        let parsed: Option<Vec<[f32; 3]>> =
            serde_json::from_str(line.trim()).map_err(|e| FrameError::Malformed(e.to_string()))?;
        match parsed {
            None => Ok(Sample::NoHand),
            Some(v) if v.is_empty() => Ok(Sample::NoHand),
            Some(v) => {
                let pts: Vec<Vec3> = v.into_iter().map(Vec3::from).collect();
                Ok(Sample::Hand(LandmarkFrame::from_slice(&pts)?))
            }
        }
    }

    pub fn to_json_line(&self) -> String {
        match self {
            Sample::NoHand => "null".to_string(),
            Sample::Hand(frame) => {
                let v: Vec<[f32; 3]> = frame.points.iter().map(|p| p.to_array()).collect();
                serde_json::to_string(&v).unwrap_or_else(|_| "null".to_string())
            }
        }
    }
}

/// Synthetic hand shapes, laid out in image space (y grows downward) with a
/// palm scale of 0.1. Used by the simulated source and by tests.
pub mod pose {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Shape {
        Open,
        Fist,
        Pinch,
        Relaxed,
    }

    // base joint of each digit relative to the wrist: thumb CMC, then MCPs
    const BASES: [(usize, Vec2); 5] = [
        (THUMB_CMC, Vec2::new(-0.04, -0.03)),
        (INDEX_MCP, Vec2::new(-0.035, -0.095)),
        (MIDDLE_MCP, Vec2::new(0.0, -0.1)),
        (RING_MCP, Vec2::new(0.03, -0.095)),
        (PINKY_MCP, Vec2::new(0.055, -0.085)),
    ];

    fn tips(shape: Shape) -> [Vec2; 5] {
        match shape {
            Shape::Open => [
                Vec2::new(-0.09, -0.06),
                Vec2::new(-0.04, -0.185),
                Vec2::new(0.0, -0.19),
                Vec2::new(0.04, -0.185),
                Vec2::new(0.08, -0.16),
            ],
            Shape::Fist => [
                Vec2::new(-0.05, -0.05),
                Vec2::new(-0.03, -0.07),
                Vec2::new(0.0, -0.08),
                Vec2::new(0.03, -0.07),
                Vec2::new(0.05, -0.06),
            ],
            Shape::Pinch => [
                Vec2::new(-0.07, -0.09),
                Vec2::new(-0.06, -0.1),
                Vec2::new(0.0, -0.19),
                Vec2::new(0.04, -0.185),
                Vec2::new(0.05, -0.06),
            ],
            Shape::Relaxed => [
                Vec2::new(-0.09, -0.03),
                Vec2::new(-0.03, -0.152),
                Vec2::new(0.0, -0.155),
                Vec2::new(0.03, -0.152),
                Vec2::new(0.06, -0.143),
            ],
        }
    }

    /// Build a frame of `shape` with the wrist at `wrist` (normalized image coords).
    pub fn synthesize(shape: Shape, wrist: Vec2) -> LandmarkFrame {
        let mut points = [Vec3::ZERO; LANDMARK_COUNT];
        points[WRIST] = wrist.extend(0.0);
        for ((base_idx, base), tip) in BASES.iter().zip(tips(shape)) {
            let b = wrist + *base;
            let t = wrist + tip;
            for k in 0..4 {
                let p = b.lerp(t, k as f32 / 3.0);
                points[base_idx + k] = p.extend(0.0);
            }
        }
        LandmarkFrame { points }
    }
}

//! Pointer-driven orientation of the whole field.

use glam::{EulerRot, Quat, Vec2};
use serde::Serialize;

use crate::config::OrientationConfig;
use crate::field::ShapeMode;
use crate::stabilizer::GestureState;

/// Accumulated Euler angles in radians (x = pitch, y = yaw, z = roll).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Orientation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Orientation {
    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.pitch, self.yaw, self.roll)
    }
}

fn decay(v: &mut f32, rate: f32) {
    *v += (0.0 - *v) * rate;
}

#[derive(Debug, Clone)]
pub struct OrientationController {
    cfg: OrientationConfig,
    orientation: Orientation,
    prev_pointer: Vec2,
    was_tracking: bool,
}

impl OrientationController {
    pub fn new(cfg: OrientationConfig) -> Self {
        Self {
            cfg,
            orientation: Orientation::default(),
            prev_pointer: Vec2::ZERO,
            was_tracking: false,
        }
    }

    pub fn set_config(&mut self, cfg: OrientationConfig) {
        self.cfg = cfg;
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Advance one tick. `mode` is the layout mode settled on the previous tick.
    pub fn update(&mut self, state: &GestureState, mode: ShapeMode) -> Orientation {
        if state.has_hand {
            self.track(state);
        } else {
            self.was_tracking = false;
        }

        if mode == ShapeMode::Compact {
            decay(&mut self.orientation.pitch, self.cfg.compact_level_rate);
            decay(&mut self.orientation.roll, self.cfg.compact_level_rate);
        }
        self.orientation
    }

    fn track(&mut self, state: &GestureState) {
        let cur = state.pointer;
        if !self.was_tracking {
            // re-anchor so the first tracked tick after a gap has zero delta
            self.prev_pointer = cur;
            self.was_tracking = true;
        }
        let d = cur - self.prev_pointer;
        self.prev_pointer = cur;

        let dz = self.cfg.deadzone;
        if d.x.abs() <= dz && d.y.abs() <= dz {
            return;
        }

        let k = self.cfg.sensitivity;
        let o = &mut self.orientation;
        if state.is_closed {
            o.yaw += d.x * k;
            decay(&mut o.pitch, self.cfg.fist_level_rate);
        } else if state.is_open {
            o.pitch += d.y * k;
            o.yaw += d.x * k;
        }
    }
}

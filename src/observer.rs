use glam::{Mat4, Quat, Vec3};
use serde::Serialize;

use crate::config::ObserverConfig;

/// Viewer pose in field space, read once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observer {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Observer {
    /// Pose at `position` facing `target`. World up is +Y; when the view
    /// runs along that axis, -Z is used as up instead.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let dir = (target - position).normalize_or_zero();
        let up = if dir.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::NEG_Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(position, target, up);
        let rotation = Quat::from_mat4(&view).inverse();
        Self { position, rotation }
    }

    pub fn from_config(cfg: &ObserverConfig) -> Self {
        Self::looking_at(Vec3::from(cfg.position), Vec3::from(cfg.look_at))
    }

    /// Unit vector the observer is looking along.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

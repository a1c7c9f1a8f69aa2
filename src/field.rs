//! Layout mode and per-object displayed positions.

use glam::{Quat, Vec3};
use log::info;
use serde::Serialize;

use crate::config::FieldConfig;
use crate::layout::{Layout, ManagedObject, ObjectKind};
use crate::observer::Observer;
use crate::orientation::Orientation;
use crate::stabilizer::GestureState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeMode {
    #[default]
    Compact,
    Expanded,
}

/// Render-ready transform for one object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderTransform {
    pub index: usize,
    pub kind: ObjectKind,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub color: u32,
}

#[derive(Debug, Clone)]
pub struct FieldController {
    cfg: FieldConfig,
    mode: ShapeMode,
    layout: Layout,
    displayed: Vec<Vec3>,
}

impl FieldController {
    pub fn new(cfg: FieldConfig, layout: Layout) -> Self {
        let displayed = layout.objects().iter().map(|o| o.compact_anchor).collect();
        Self {
            cfg,
            mode: ShapeMode::Compact,
            layout,
            displayed,
        }
    }

    pub fn set_config(&mut self, cfg: FieldConfig) {
        self.cfg = cfg;
    }

    pub fn mode(&self) -> ShapeMode {
        self.mode
    }

    pub fn objects(&self) -> &[ManagedObject] {
        self.layout.objects()
    }

    pub fn displayed_position(&self, index: usize) -> Vec3 {
        self.displayed[index]
    }

    /// Level-triggered: an open hand keeps asserting Expanded, a fist keeps
    /// asserting Compact, anything else leaves the mode alone.
    pub fn update_mode(&mut self, state: &GestureState) -> ShapeMode {
        let next = if state.is_open {
            ShapeMode::Expanded
        } else if state.is_closed {
            ShapeMode::Compact
        } else {
            self.mode
        };
        if next != self.mode {
            info!("shape mode {:?} -> {:?}", self.mode, next);
            self.mode = next;
        }
        self.mode
    }

    pub fn target(&self, obj: &ManagedObject, time: f32) -> Vec3 {
        match self.mode {
            ShapeMode::Expanded => obj.expanded_anchor,
            ShapeMode::Compact => {
                let phase = time * self.cfg.bob_speed + obj.index as f32;
                obj.compact_anchor + Vec3::Y * (phase.sin() * self.cfg.bob_amplitude)
            }
        }
    }

    /// Move every displayed position one smoothing step toward its target.
    pub fn advance(&mut self, time: f32) {
        let k = self.cfg.smoothing;
        let targets: Vec<Vec3> = self.objects().iter().map(|o| self.target(o, time)).collect();
        for (shown, target) in self.displayed.iter_mut().zip(targets) {
            *shown += (target - *shown) * k;
        }
    }

    pub fn world_position(&self, index: usize, orientation: &Orientation) -> Vec3 {
        orientation.quat() * self.displayed[index]
    }

    /// World rotation of an object before any focus override.
    pub fn world_rotation(
        &self,
        obj: &ManagedObject,
        orientation: &Orientation,
        observer: &Observer,
        time: f32,
    ) -> Quat {
        if obj.kind.is_billboard() {
            return observer.rotation * Quat::from_rotation_z(time * self.cfg.billboard_spin);
        }
        let base = orientation.quat() * obj.rotation_offset;
        if obj.kind.spins_in_place() {
            base * Quat::from_rotation_y(time * self.cfg.spin_speed)
        } else {
            base
        }
    }

    pub fn transform(
        &self,
        obj: &ManagedObject,
        orientation: &Orientation,
        observer: &Observer,
        time: f32,
    ) -> RenderTransform {
        RenderTransform {
            index: obj.index,
            kind: obj.kind,
            position: self.world_position(obj.index, orientation),
            rotation: self.world_rotation(obj, orientation, observer, time),
            scale: obj.scale,
            color: obj.color,
        }
    }

    pub fn transforms(
        &self,
        orientation: &Orientation,
        observer: &Observer,
        time: f32,
    ) -> Vec<RenderTransform> {
        self.objects()
            .iter()
            .map(|o| self.transform(o, orientation, observer, time))
            .collect()
    }
}

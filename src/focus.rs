//! Nearest-photo focus and the photo display-state animation.

use glam::{Quat, Vec3};
use log::debug;
use serde::Serialize;

use crate::config::FocusConfig;
use crate::field::{FieldController, RenderTransform};
use crate::observer::Observer;
use crate::orientation::Orientation;
use crate::stabilizer::GestureState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayState {
    #[default]
    Idle,
    Hovered,
    Selected,
}

/// Focus result for one tick. Rebuilt from scratch every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FocusState {
    /// Nearest eligible object, whether or not it passed the cutoff.
    pub nearest: Option<usize>,
    pub distance: Option<f32>,
    pub hovered: bool,
    pub selected: bool,
}

impl FocusState {
    pub fn hovered_index(&self) -> Option<usize> {
        self.nearest.filter(|_| self.hovered)
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.nearest.filter(|_| self.selected)
    }

    pub fn display_state(&self, index: usize) -> DisplayState {
        if self.selected_index() == Some(index) {
            DisplayState::Selected
        } else if self.hovered_index() == Some(index) {
            DisplayState::Hovered
        } else {
            DisplayState::Idle
        }
    }
}

/// Pick the candidate closest to `observer`; ties keep the earlier one.
pub fn pick_nearest(
    candidates: impl IntoIterator<Item = (usize, Vec3)>,
    observer: Vec3,
    cutoff: f32,
    pinching: bool,
) -> FocusState {
    let mut best: Option<(usize, f32)> = None;
    for (index, pos) in candidates {
        let d = pos.distance(observer);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((index, d));
        }
    }
    match best {
        None => FocusState::default(),
        Some((index, distance)) => {
            let hovered = distance <= cutoff;
            FocusState {
                nearest: Some(index),
                distance: Some(distance),
                hovered,
                selected: hovered && pinching,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PhotoCard {
    index: usize,
    position: Vec3,
    scale: f32,
    rotation: Quat,
}

#[derive(Debug, Clone)]
pub struct FocusSelector {
    cfg: FocusConfig,
    cards: Vec<PhotoCard>,
    last: FocusState,
}

impl FocusSelector {
    pub fn new(cfg: FocusConfig, field: &FieldController) -> Self {
        let cards = field
            .objects()
            .iter()
            .filter(|o| o.kind.is_focusable())
            .map(|o| PhotoCard {
                index: o.index,
                position: field.displayed_position(o.index),
                scale: o.scale * cfg.idle_scale,
                rotation: o.rotation_offset,
            })
            .collect();
        Self {
            cfg,
            cards,
            last: FocusState::default(),
        }
    }

    pub fn set_config(&mut self, cfg: FocusConfig) {
        self.cfg = cfg;
    }

    pub fn select(
        &self,
        field: &FieldController,
        orientation: &Orientation,
        observer: &Observer,
        gesture: &GestureState,
    ) -> FocusState {
        let candidates = self
            .cards
            .iter()
            .map(|c| (c.index, field.world_position(c.index, orientation)));
        pick_nearest(candidates, observer.position, self.cfg.cutoff, gesture.is_pinching)
    }

    /// Select, then step every photo toward its display-state target.
    pub fn update(
        &mut self,
        field: &FieldController,
        orientation: &Orientation,
        observer: &Observer,
        gesture: &GestureState,
        time: f32,
    ) -> FocusState {
        let focus = self.select(field, orientation, observer, gesture);
        if focus.hovered_index() != self.last.hovered_index()
            || focus.selected != self.last.selected
        {
            debug!(
                "focus hovered={:?} selected={:?} distance={:?}",
                focus.hovered_index(),
                focus.selected_index(),
                focus.distance
            );
        }
        self.last = focus;

        let cfg = &self.cfg;
        let k = cfg.smoothing;
        for card in &mut self.cards {
            let obj = &field.objects()[card.index];
            let anchor = field.world_position(card.index, orientation);
            let resting = field.world_rotation(obj, orientation, observer, time);
            let (pos, scale, rot) = match focus.display_state(card.index) {
                DisplayState::Selected => (
                    observer.position + observer.forward() * cfg.select_distance,
                    obj.scale * cfg.select_scale,
                    observer.rotation,
                ),
                DisplayState::Hovered => {
                    let bob = (time * cfg.hover_bob_speed).sin() * cfg.hover_bob;
                    (anchor + Vec3::Y * bob, obj.scale * cfg.hover_scale, resting)
                }
                DisplayState::Idle => (anchor, obj.scale * cfg.idle_scale, resting),
            };
            card.position += (pos - card.position) * k;
            card.scale += (scale - card.scale) * k;
            card.rotation = card.rotation.slerp(rot, k);
        }
        focus
    }

    /// Replace the field transforms of photos with their animated card state.
    pub fn overlay(&self, transforms: &mut [RenderTransform]) {
        for card in &self.cards {
            if let Some(t) = transforms.get_mut(card.index) {
                t.position = card.position;
                t.scale = card.scale;
                t.rotation = card.rotation;
            }
        }
    }
}

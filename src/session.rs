//! One tick of the whole pipeline.
//!
//! `Session` owns every piece of per-tick mutable state. Order within a tick:
//! classify, stabilize, orient (against the layout mode settled last tick),
//! update layout mode and positions, then focus.

use log::warn;
use serde::Serialize;

use crate::classifier::{Classification, Gesture, GestureClassifier};
use crate::config::Profile;
use crate::field::{FieldController, RenderTransform, ShapeMode};
use crate::focus::{FocusSelector, FocusState};
use crate::landmarks::Sample;
use crate::layout::Layout;
use crate::observer::Observer;
use crate::orientation::{Orientation, OrientationController};
use crate::stabilizer::{GestureState, Stabilizer};

#[derive(Debug, Clone, Serialize)]
pub struct TickOutput {
    pub tick: u64,
    pub gesture: GestureState,
    pub stable: Gesture,
    pub mode: ShapeMode,
    pub orientation: Orientation,
    pub focus: FocusState,
    pub transforms: Vec<RenderTransform>,
}

#[derive(Debug, Clone)]
pub struct Session {
    classifier: GestureClassifier,
    stabilizer: Stabilizer,
    orientation: OrientationController,
    field: FieldController,
    focus: FocusSelector,
    gesture: GestureState,
    tick: u64,
}

impl Session {
    pub fn new(profile: &Profile) -> Self {
        Self::with_layout(profile, Layout::generate(&profile.layout))
    }

    pub fn with_layout(profile: &Profile, layout: Layout) -> Self {
        let field = FieldController::new(profile.field.clone(), layout);
        let focus = FocusSelector::new(profile.focus.clone(), &field);
        Self {
            classifier: GestureClassifier::new(profile.classifier.clone()),
            stabilizer: Stabilizer::new(profile.stabilizer.clone()),
            orientation: OrientationController::new(profile.orientation.clone()),
            field,
            focus,
            gesture: GestureState::reset(),
            tick: 0,
        }
    }

    /// Swap thresholds in place; accumulated state is kept.
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.classifier.set_thresholds(profile.classifier.clone());
        self.stabilizer.set_config(profile.stabilizer.clone());
        self.orientation.set_config(profile.orientation.clone());
        self.field.set_config(profile.field.clone());
        self.focus.set_config(profile.focus.clone());
    }

    pub fn gesture(&self) -> GestureState {
        self.gesture
    }

    pub fn mode(&self) -> ShapeMode {
        self.field.mode()
    }

    pub fn field(&self) -> &FieldController {
        &self.field
    }

    /// Advance one tick.
    ///
    /// `input` is `None` when acquisition produced nothing new since the last
    /// tick; the stabilizer then holds its state while animation continues.
    /// A frame that fails classification counts as "no hand" for this tick.
    pub fn tick(&mut self, input: Option<&Sample>, observer: &Observer, time: f32) -> TickOutput {
        if let Some(sample) = input {
            let obs = self.classify(sample);
            self.gesture = self.stabilizer.update(obs.as_ref());
        }

        let orientation = self.orientation.update(&self.gesture, self.field.mode());
        let mode = self.field.update_mode(&self.gesture);
        self.field.advance(time);
        let focus = self
            .focus
            .update(&self.field, &orientation, observer, &self.gesture, time);

        let mut transforms = self.field.transforms(&orientation, observer, time);
        self.focus.overlay(&mut transforms);

        let out = TickOutput {
            tick: self.tick,
            gesture: self.gesture,
            stable: self.stabilizer.stable(),
            mode,
            orientation,
            focus,
            transforms,
        };
        self.tick += 1;
        out
    }

    fn classify(&self, sample: &Sample) -> Option<Classification> {
        match sample {
            Sample::NoHand => None,
            Sample::Hand(frame) => match self.classifier.classify(frame) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("tick {}: dropping frame: {e}", self.tick);
                    None
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LandmarkFrame, MIDDLE_MCP, pose};
    use crate::layout::{ManagedObject, ObjectKind};
    use glam::{Quat, Vec2, Vec3};

    fn session() -> Session {
        Session::new(&Profile::default())
    }

    fn observer() -> Observer {
        Observer::looking_at(Vec3::new(0.0, 0.0, 14.0), Vec3::ZERO)
    }

    fn hand(shape: pose::Shape) -> Sample {
        Sample::Hand(pose::synthesize(shape, Vec2::new(0.5, 0.5)))
    }

    fn run(s: &mut Session, sample: &Sample, ticks: usize, t0: &mut f32) -> TickOutput {
        let obs = observer();
        let mut last = None;
        for _ in 0..ticks {
            last = Some(s.tick(Some(sample), &obs, *t0));
            *t0 += 1.0 / 60.0;
        }
        last.expect("ran at least one tick")
    }

    #[test]
    fn open_hand_expands_the_field_by_tick_four() {
        let mut s = session();
        let obs = observer();
        let open = hand(pose::Shape::Open);
        let mut outs = Vec::new();
        for t in 0..5 {
            outs.push(s.tick(Some(&open), &obs, t as f32 / 60.0));
        }
        assert_eq!(outs[2].mode, ShapeMode::Compact);
        assert!(!outs[2].gesture.is_open);
        assert!(outs[4].gesture.is_open);
        assert_eq!(outs[4].mode, ShapeMode::Expanded);

        // targets stay on expanded anchors while the hand is held or relaxed
        let relaxed = hand(pose::Shape::Relaxed);
        for t in 5..60 {
            let sample = if t % 2 == 0 { &open } else { &relaxed };
            let out = s.tick(Some(sample), &obs, t as f32 / 60.0);
            assert_eq!(out.mode, ShapeMode::Expanded);
            for o in s.field().objects() {
                assert_eq!(s.field().target(o, t as f32 / 60.0), o.expanded_anchor);
            }
        }
    }

    #[test]
    fn fist_run_collapses_again() {
        let mut s = session();
        let mut t = 0.0;
        run(&mut s, &hand(pose::Shape::Open), 5, &mut t);
        assert_eq!(s.mode(), ShapeMode::Expanded);
        let out = run(&mut s, &hand(pose::Shape::Fist), 3, &mut t);
        assert_eq!(out.mode, ShapeMode::Expanded);
        let out = run(&mut s, &hand(pose::Shape::Fist), 2, &mut t);
        assert_eq!(out.mode, ShapeMode::Compact);
        assert_eq!(out.stable, Gesture::Fist);
    }

    #[test]
    fn stale_ticks_hold_the_gesture_but_keep_animating() {
        let mut s = session();
        let mut t = 0.0;
        run(&mut s, &hand(pose::Shape::Open), 5, &mut t);
        let before = s.field().displayed_position(0);
        let obs = observer();
        for _ in 0..100 {
            let out = s.tick(None, &obs, t);
            assert!(out.gesture.is_open);
            t += 1.0 / 60.0;
        }
        assert_ne!(s.field().displayed_position(0), before);
    }

    #[test]
    fn degenerate_frame_counts_as_no_hand() {
        let mut s = session();
        let mut t = 0.0;
        run(&mut s, &hand(pose::Shape::Open), 5, &mut t);
        let mut pts = *pose::synthesize(pose::Shape::Open, Vec2::splat(0.5)).points();
        pts[MIDDLE_MCP] = Vec3::new(f32::MAX, f32::MAX, 0.0);
        let bad = Sample::Hand(LandmarkFrame::new(pts).unwrap());
        let out = run(&mut s, &bad, 39, &mut t);
        assert!(out.gesture.is_open, "grace period still bridging");
        let out = run(&mut s, &bad, 1, &mut t);
        assert_eq!(out.gesture, GestureState::reset());
    }

    #[test]
    fn hand_loss_resolves_to_neutral_after_grace() {
        let mut s = session();
        let mut t = 0.0;
        let first = run(&mut s, &hand(pose::Shape::Fist), 4, &mut t);
        assert!(first.gesture.is_closed);
        let out = run(&mut s, &Sample::NoHand, 39, &mut t);
        assert_eq!(out.gesture, first.gesture);
        let out = run(&mut s, &Sample::NoHand, 1, &mut t);
        assert!(!out.gesture.has_hand);
        assert_eq!(out.stable, Gesture::Neutral);
    }

    fn photo(at: Vec3) -> ManagedObject {
        ManagedObject {
            index: 0,
            kind: ObjectKind::Photo,
            compact_anchor: at,
            expanded_anchor: at,
            rotation_offset: Quat::IDENTITY,
            scale: 1.0,
            color: 0xFFFFFFFF,
        }
    }

    #[test]
    fn pinch_selects_the_near_photo_and_flies_it_forward() {
        let layout = Layout::from_objects(vec![
            photo(Vec3::new(0.0, 0.0, 3.5)),
            photo(Vec3::new(3.5, 0.0, 0.0)),
            photo(Vec3::new(0.0, 0.0, -3.5)),
        ]);
        let mut s = Session::with_layout(&Profile::default(), layout);
        let mut t = 0.0;
        let out = run(&mut s, &hand(pose::Shape::Pinch), 200, &mut t);

        assert!(out.gesture.is_pinching);
        assert_eq!(out.focus.selected_index(), Some(0));
        let obs = observer();
        let front = obs.position + obs.forward() * 6.0;
        assert!(out.transforms[0].position.abs_diff_eq(front, 1e-2));
        assert!((out.transforms[0].scale - 2.5).abs() < 1e-2);
        let flown = out
            .transforms
            .iter()
            .filter(|tr| tr.position.abs_diff_eq(front, 0.5))
            .count();
        assert_eq!(flown, 1);
    }

    #[test]
    fn top_down_observer_yields_finite_transforms() {
        let mut p = Profile::default();
        p.observer.position = [0.0, 14.0, 0.0];
        crate::config::validate_profile(&p).unwrap();
        let mut s = Session::new(&p);
        let obs = Observer::from_config(&p.observer);
        let mut t = 0.0;
        for _ in 0..20 {
            let out = s.tick(Some(&hand(pose::Shape::Pinch)), &obs, t);
            t += 1.0 / 60.0;
            for tr in &out.transforms {
                assert!(tr.position.is_finite() && tr.rotation.is_finite());
            }
        }
    }

    #[test]
    fn transforms_cover_every_object() {
        let mut s = session();
        let out = s.tick(None, &observer(), 0.0);
        assert_eq!(out.transforms.len(), Profile::default().layout.object_count);
        for (i, tr) in out.transforms.iter().enumerate() {
            assert_eq!(tr.index, i);
            assert!(tr.position.is_finite());
        }
    }

    #[test]
    fn apply_profile_keeps_state() {
        let mut s = session();
        let mut t = 0.0;
        run(&mut s, &hand(pose::Shape::Open), 5, &mut t);
        let mut p = Profile::default();
        p.focus.cutoff = 1.0;
        s.apply_profile(&p);
        assert_eq!(s.mode(), ShapeMode::Expanded);
        assert!(s.gesture().is_open);
        let out = s.tick(None, &observer(), t);
        assert!(!out.focus.hovered);
    }
}

//! Precomputed anchor table for a session.
//!
//! Every object gets both of its anchors up front: a slot on a conical
//! spiral (compact) and a slot in a spherical shell (expanded). Nothing is
//! recomputed when the mode flips.

use std::f32::consts::{PI, TAU};

use glam::{EulerRot, Quat, Vec3};
use log::debug;
use serde::Serialize;

use crate::config::LayoutConfig;

/// Closed set of object categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// Plain decorative sphere.
    Bauble,
    /// Decorative box that spins in place.
    Gift,
    /// Flat decorative sprite that always faces the observer.
    Sparkle,
    /// Interactive picture; the only focusable kind.
    Photo,
}

impl ObjectKind {
    pub fn spins_in_place(self) -> bool {
        match self {
            ObjectKind::Gift => true,
            ObjectKind::Bauble | ObjectKind::Sparkle | ObjectKind::Photo => false,
        }
    }

    pub fn is_billboard(self) -> bool {
        match self {
            ObjectKind::Sparkle => true,
            ObjectKind::Bauble | ObjectKind::Gift | ObjectKind::Photo => false,
        }
    }

    pub fn is_focusable(self) -> bool {
        match self {
            ObjectKind::Photo => true,
            ObjectKind::Bauble | ObjectKind::Gift | ObjectKind::Sparkle => false,
        }
    }

    fn palette(self) -> &'static [u32] {
        match self {
            ObjectKind::Bauble => &[0xFFD4AF37, 0xFFB22222, 0xFF2E8B57, 0xFFC0C0C0],
            ObjectKind::Gift => &[0xFF8B0000, 0xFF006400, 0xFFDAA520],
            ObjectKind::Sparkle => &[0xFFFFFFE0, 0xFFFFF8DC],
            ObjectKind::Photo => &[0xFFFFFFFF],
        }
    }

    fn scale_range(self) -> (f32, f32) {
        match self {
            ObjectKind::Bauble => (0.18, 0.3),
            ObjectKind::Gift => (0.25, 0.35),
            ObjectKind::Sparkle => (0.12, 0.18),
            ObjectKind::Photo => (1.0, 1.0),
        }
    }
}

/// One placed object. Anchors and look are fixed for the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagedObject {
    pub index: usize,
    pub kind: ObjectKind,
    pub compact_anchor: Vec3,
    pub expanded_anchor: Vec3,
    pub rotation_offset: Quat,
    pub scale: f32,
    pub color: u32,
}

/// Linear congruential generator; the layout only needs cheap repeatable jitter.
#[derive(Debug, Clone)]
struct Lcg {
    state: u32,
}

impl Lcg {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.state
    }

    fn unit(&mut self) -> f32 {
        (self.next_u32() as f32) / (u32::MAX as f32)
    }

    fn range(&mut self, a: f32, b: f32) -> f32 {
        a + (b - a) * self.unit()
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next_u32() as usize) % items.len()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct Layout {
    objects: Vec<ManagedObject>,
}

impl Layout {
    /// Wrap a hand-built table. Indexes are reassigned to list positions.
    pub fn from_objects(mut objects: Vec<ManagedObject>) -> Self {
        for (i, o) in objects.iter_mut().enumerate() {
            o.index = i;
        }
        Self { objects }
    }

    pub fn generate(cfg: &LayoutConfig) -> Self {
        let n = cfg.object_count;
        let mut rng = Lcg::new(cfg.seed);
        let golden = PI * (3.0 - 5f32.sqrt());

        let photo_stride = if cfg.photo_count == 0 {
            usize::MAX
        } else {
            (n / cfg.photo_count).max(1)
        };

        let mut photos = 0;
        let mut objects = Vec::with_capacity(n);
        for i in 0..n {
            let kind = if photos < cfg.photo_count && i % photo_stride == photo_stride / 2 {
                photos += 1;
                ObjectKind::Photo
            } else {
                match rng.unit() {
                    u if u < 0.5 => ObjectKind::Bauble,
                    u if u < 0.8 => ObjectKind::Gift,
                    _ => ObjectKind::Sparkle,
                }
            };

            // compact: spiral up a cone, apex at the top
            let t = if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
            let y = -cfg.compact_height / 2.0 + t * cfg.compact_height;
            let r = cfg.compact_radius * (1.0 - t) + rng.range(-0.15, 0.15);
            let a = i as f32 * golden * 3.0;
            let compact_anchor = Vec3::new(r.max(0.0) * a.cos(), y, r.max(0.0) * a.sin());

            // expanded: fibonacci sphere direction, jittered shell radius
            let fy = if n > 1 { 1.0 - 2.0 * (i as f32 + 0.5) / n as f32 } else { 0.0 };
            let ring = (1.0 - fy * fy).max(0.0).sqrt();
            let theta = golden * i as f32;
            let dir = Vec3::new(ring * theta.cos(), fy, ring * theta.sin());
            let expanded_anchor = dir * rng.range(cfg.expanded_inner, cfg.expanded_outer);

            let rotation_offset = Quat::from_euler(
                EulerRot::XYZ,
                rng.range(0.0, TAU),
                rng.range(0.0, TAU),
                rng.range(0.0, TAU),
            );
            let (lo, hi) = kind.scale_range();
            let scale = rng.range(lo, hi);
            let color = *rng.pick(kind.palette());

            objects.push(ManagedObject {
                index: i,
                kind,
                compact_anchor,
                expanded_anchor,
                rotation_offset,
                scale,
                color,
            });
        }
        debug!("generated layout: {} objects, {} photos", n, photos);
        Self { objects }
    }

    pub fn objects(&self) -> &[ManagedObject] {
        &self.objects
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

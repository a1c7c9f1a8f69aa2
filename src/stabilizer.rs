//! Hysteresis and smoothing over raw per-frame gestures.
//!
//! A raw gesture has to hold for more than `persistence_ticks` consecutive
//! frames before the stable state follows it. Short detection dropouts are
//! bridged by replaying the last valid state for `grace_ticks` frames.

use glam::Vec2;
use log::{debug, info};
use serde::Serialize;

use crate::classifier::{Classification, Gesture};
use crate::config::StabilizerConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistenceCounters {
    pub fist: u32,
    pub pinch: u32,
    pub open: u32,
}

impl PersistenceCounters {
    fn observe(&mut self, raw: Gesture) {
        let bump = |c: u32, hit: bool| if hit { c.saturating_add(1) } else { 0 };
        self.fist = bump(self.fist, raw == Gesture::Fist);
        self.pinch = bump(self.pinch, raw == Gesture::Pinch);
        self.open = bump(self.open, raw == Gesture::Open);
    }

    fn all_zero(&self) -> bool {
        self.fist == 0 && self.pinch == 0 && self.open == 0
    }
}

/// The stable, externally visible gesture snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GestureState {
    pub has_hand: bool,
    pub is_open: bool,
    pub is_closed: bool,
    pub is_pinching: bool,
    pub pinch_amount: f32,
    pub pointer: Vec2,
}

impl GestureState {
    /// The no-hand baseline: pointer at origin, fingers apart.
    pub fn reset() -> Self {
        Self {
            has_hand: false,
            is_open: false,
            is_closed: false,
            is_pinching: false,
            pinch_amount: 1.0,
            pointer: Vec2::ZERO,
        }
    }

    fn tracked(gesture: Gesture, pointer: Vec2, pinch_amount: f32) -> Self {
        Self {
            has_hand: true,
            is_open: gesture == Gesture::Open,
            is_closed: gesture == Gesture::Fist,
            is_pinching: gesture == Gesture::Pinch,
            pinch_amount,
            pointer,
        }
    }

    pub fn gesture(&self) -> Gesture {
        if self.is_pinching {
            Gesture::Pinch
        } else if self.is_closed {
            Gesture::Fist
        } else if self.is_open {
            Gesture::Open
        } else {
            Gesture::Neutral
        }
    }
}

impl Default for GestureState {
    fn default() -> Self {
        Self::reset()
    }
}

#[derive(Debug, Clone)]
pub struct Stabilizer {
    cfg: StabilizerConfig,
    counters: PersistenceCounters,
    stable: Gesture,
    pointer: Vec2,
    pinch_amount: f32,
    missing: u32,
    last_valid: GestureState,
}

impl Stabilizer {
    pub fn new(cfg: StabilizerConfig) -> Self {
        Self {
            cfg,
            counters: PersistenceCounters::default(),
            stable: Gesture::Neutral,
            pointer: Vec2::ZERO,
            pinch_amount: 1.0,
            missing: 0,
            last_valid: GestureState::reset(),
        }
    }

    pub fn set_config(&mut self, cfg: StabilizerConfig) {
        self.cfg = cfg;
    }

    pub fn stable(&self) -> Gesture {
        self.stable
    }

    pub fn counters(&self) -> PersistenceCounters {
        self.counters
    }

    pub fn missing_ticks(&self) -> u32 {
        self.missing
    }

    /// Advance one tick. `None` means no hand was detected this tick.
    pub fn update(&mut self, obs: Option<&Classification>) -> GestureState {
        match obs {
            Some(c) => self.observe(c),
            None => self.observe_missing(),
        }
    }

    fn observe(&mut self, c: &Classification) -> GestureState {
        self.missing = 0;
        self.counters.observe(c.gesture);

        let th = self.cfg.persistence_ticks;
        let next = if self.counters.pinch > th {
            Gesture::Pinch
        } else if self.counters.fist > th {
            Gesture::Fist
        } else if self.counters.open > th {
            Gesture::Open
        } else if self.counters.all_zero() {
            Gesture::Neutral
        } else {
            self.stable
        };
        if next != self.stable {
            info!("stable gesture {:?} -> {:?}", self.stable, next);
            self.stable = next;
        }

        let k = self.cfg.smoothing;
        self.pointer += (c.pointer - self.pointer) * k;
        self.pinch_amount += (c.pinch - self.pinch_amount) * k;

        self.last_valid = GestureState::tracked(self.stable, self.pointer, self.pinch_amount);
        self.last_valid
    }

    fn observe_missing(&mut self) -> GestureState {
        self.missing = self.missing.saturating_add(1);
        if self.missing < self.cfg.grace_ticks {
            return self.last_valid;
        }
        if self.missing == self.cfg.grace_ticks {
            debug!("hand lost for {} ticks; resetting", self.missing);
            if self.stable != Gesture::Neutral {
                info!("stable gesture {:?} -> Neutral (hand lost)", self.stable);
            }
        }
        self.stable = Gesture::Neutral;
        self.counters = PersistenceCounters::default();
        self.pointer = Vec2::ZERO;
        self.pinch_amount = 1.0;
        self.last_valid = GestureState::reset();
        self.last_valid
    }
}

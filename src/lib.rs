//! # handfield
//!
//! Turns a stream of 21-point hand landmarks into a stable gesture state and
//! uses it to drive a field of decorative 3D objects.
//!
//! ## Gesture → effect
//!
//! | Gesture | Effect |
//! |---|---|
//! | Open palm | Field expands onto its spherical shell; hand motion turns it |
//! | Fist | Field collapses back into the cone; hand motion yaws it |
//! | Pinch | Photo nearest the observer (inside the cutoff) flies up front |
//! | No hand | Last gesture is held for a grace period, then neutral |
//!
//! ## Running
//!
//! * `handfield run --sim` drives everything from a synthetic hand.
//! * `handfield run --replay hands.jsonl` feeds recorded landmark lines.
//! * `handfield replay hands.jsonl` runs offline, one JSON line per tick.
//!
//! Rendering is left to the consumer: each tick yields a `TickOutput` with one
//! `RenderTransform` per object.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod field;
pub mod focus;
pub mod ipc;
pub mod landmarks;
pub mod layout;
pub mod logging;
pub mod observer;
pub mod orientation;
pub mod replay;
pub mod session;
pub mod source;
pub mod stabilizer;

pub use session::{Session, TickOutput};

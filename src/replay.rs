//! Offline run: every recorded line drives exactly one tick.

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::io::{BufRead, Write};

use crate::classifier::Gesture;
use crate::config::Profile;
use crate::field::ShapeMode;
use crate::focus::FocusState;
use crate::landmarks::Sample;
use crate::observer::Observer;
use crate::session::{Session, TickOutput};
use crate::stabilizer::GestureState;

#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Print one line every `every` ticks (the last tick is always printed).
    pub every: usize,
    /// Include per-object transforms in each line.
    pub transforms: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            every: 1,
            transforms: false,
        }
    }
}

#[derive(Serialize)]
struct Summary<'a> {
    tick: u64,
    time: f32,
    gesture: &'a GestureState,
    stable: Gesture,
    mode: ShapeMode,
    orientation: [f32; 3],
    focus: &'a FocusState,
}

fn write_tick<W: Write>(out: &mut W, tick: &TickOutput, time: f32, full: bool) -> Result<()> {
    if full {
        serde_json::to_writer(&mut *out, tick)?;
    } else {
        let o = &tick.orientation;
        let s = Summary {
            tick: tick.tick,
            time,
            gesture: &tick.gesture,
            stable: tick.stable,
            mode: tick.mode,
            orientation: [o.pitch, o.yaw, o.roll],
            focus: &tick.focus,
        };
        serde_json::to_writer(&mut *out, &s)?;
    }
    out.write_all(b"\n")?;
    Ok(())
}

/// Replay `input` through a fresh session at the profile's tick period.
/// Returns the number of ticks run.
pub fn run<R: BufRead, W: Write>(
    profile: &Profile,
    input: R,
    out: &mut W,
    opts: ReplayOptions,
) -> Result<u64> {
    let every = opts.every.max(1) as u64;
    let dt = profile.runtime.tick_ms as f32 / 1000.0;
    let observer = Observer::from_config(&profile.observer);
    let mut session = Session::new(profile);
    let mut pending: Option<(TickOutput, f32)> = None;
    let mut ticks = 0u64;

    for (n, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let sample = Sample::from_json_line(&line).unwrap_or_else(|e| {
            warn!("line {}: {e}; treating as no hand", n + 1);
            Sample::NoHand
        });
        let time = ticks as f32 * dt;
        let tick = session.tick(Some(&sample), &observer, time);
        ticks += 1;
        if tick.tick % every == 0 {
            write_tick(out, &tick, time, opts.transforms)?;
            pending = None;
        } else {
            pending = Some((tick, time));
        }
    }
    if let Some((tick, time)) = pending {
        write_tick(out, &tick, time, opts.transforms)?;
    }
    out.flush()?;
    info!("replayed {ticks} ticks");
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::pose::{self, Shape};
    use glam::Vec2;
    use serde_json::Value;
    use std::io::Cursor;

    fn recording(shapes: &[Option<Shape>]) -> String {
        shapes
            .iter()
            .map(|s| match s {
                Some(shape) => Sample::Hand(pose::synthesize(*shape, Vec2::splat(0.5))),
                None => Sample::NoHand,
            })
            .map(|s| s.to_json_line() + "\n")
            .collect()
    }

    fn lines(out: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn one_line_per_tick() {
        let rec = recording(&[Some(Shape::Open); 6]);
        let mut out = Vec::new();
        let n = run(&Profile::default(), Cursor::new(rec), &mut out, ReplayOptions::default()).unwrap();
        assert_eq!(n, 6);
        let v = lines(&out);
        assert_eq!(v.len(), 6);
        assert_eq!(v[0]["mode"], "compact");
        assert_eq!(v[5]["mode"], "expanded");
        assert_eq!(v[5]["stable"], "open");
        assert!(v[0].get("transforms").is_none());
    }

    #[test]
    fn every_n_keeps_the_final_tick() {
        let rec = recording(&[Some(Shape::Fist); 7]);
        let mut out = Vec::new();
        let opts = ReplayOptions {
            every: 3,
            transforms: false,
        };
        run(&Profile::default(), Cursor::new(rec), &mut out, opts).unwrap();
        let ticks: Vec<u64> = lines(&out).iter().map(|v| v["tick"].as_u64().unwrap()).collect();
        assert_eq!(ticks, vec![0, 3, 6]);

        let rec = recording(&[Some(Shape::Fist); 8]);
        let mut out = Vec::new();
        run(&Profile::default(), Cursor::new(rec), &mut out, opts).unwrap();
        let ticks: Vec<u64> = lines(&out).iter().map(|v| v["tick"].as_u64().unwrap()).collect();
        assert_eq!(ticks, vec![0, 3, 6, 7]);
    }

    #[test]
    fn garbage_lines_count_as_no_hand() {
        let rec = format!("{}oops\n\n{}", recording(&[Some(Shape::Fist)]), recording(&[None]));
        let mut out = Vec::new();
        let n = run(&Profile::default(), Cursor::new(rec), &mut out, ReplayOptions::default()).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn full_output_carries_transforms() {
        let rec = recording(&[None]);
        let mut out = Vec::new();
        let opts = ReplayOptions {
            every: 1,
            transforms: true,
        };
        run(&Profile::default(), Cursor::new(rec), &mut out, opts).unwrap();
        let v = lines(&out);
        assert_eq!(v[0]["transforms"].as_array().unwrap().len(), 160);
    }
}

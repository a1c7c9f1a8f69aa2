//! Landmark sources and the rate-limited acquisition thread.
//!
//! The core never talks to a camera. A source yields `Sample`s; the
//! acquisition thread polls it no faster than the configured minimum
//! interval and forwards results over a channel.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread,
    time::{Duration, Instant},
};

use glam::Vec2;
use log::{debug, error, info, warn};

use crate::config::AcquisitionConfig;
use crate::error::AcquisitionError;
use crate::landmarks::{
    Sample,
    pose::{self, Shape},
};

/// Anything that can deliver landmark samples.
pub trait LandmarkSource: Send {
    fn name(&self) -> &str;

    /// Acquire the backend. May be called again after a failure.
    fn open(&mut self) -> Result<(), AcquisitionError>;

    /// Next sample, `Ok(None)` if nothing is ready yet.
    fn poll(&mut self) -> Result<Option<Sample>, AcquisitionError>;
}

// ---------------------------------------------------------------------------
// ReplaySource
// ---------------------------------------------------------------------------

/// Reads recorded samples, one JSON line each, from a file or stdin (`-`).
pub struct ReplaySource {
    path: PathBuf,
    name: String,
    reader: Option<Box<dyn BufRead + Send>>,
    line_no: usize,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("replay:{}", path.display());
        Self {
            path,
            name,
            reader: None,
            line_no: 0,
        }
    }

    pub fn from_reader(name: &str, reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            path: PathBuf::from(name),
            name: name.to_string(),
            reader: Some(reader),
            line_no: 0,
        }
    }
}

impl LandmarkSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        if self.reader.is_some() {
            return Ok(());
        }
        if self.path.as_os_str() == "-" {
            self.reader = Some(Box::new(BufReader::new(io::stdin())));
            return Ok(());
        }
        let f = File::open(&self.path).map_err(|e| AcquisitionError::Unavailable {
            source_name: self.name.clone(),
            reason: e.to_string(),
        })?;
        self.reader = Some(Box::new(BufReader::new(f)));
        self.line_no = 0;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = match self.reader.as_mut() {
                Some(reader) => reader.read_line(&mut line)?,
                None => return Err(AcquisitionError::Closed),
            };
            if n == 0 {
                self.reader = None;
                return Err(AcquisitionError::Closed);
            }
            self.line_no += 1;
            if !line.trim().is_empty() {
                break;
            }
        }
        match Sample::from_json_line(&line) {
            Ok(sample) => Ok(Some(sample)),
            Err(e) => {
                warn!("{} line {}: {e}; treating as no hand", self.name, self.line_no);
                Ok(Some(Sample::NoHand))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SimSource
// ---------------------------------------------------------------------------

/// Synthetic hand for running without a camera: open, drift, fist, pinch,
/// then a short dropout, on repeat. The wrist wanders on a slow Lissajous path.
pub struct SimSource {
    frame: u64,
    phase_len: u64,
}

const SIM_PHASES: [Option<Shape>; 5] = [
    Some(Shape::Open),
    Some(Shape::Relaxed),
    Some(Shape::Fist),
    Some(Shape::Pinch),
    None,
];

impl SimSource {
    pub fn new(phase_len: u64) -> Self {
        Self {
            frame: 0,
            phase_len: phase_len.max(1),
        }
    }

    fn wrist(&self) -> Vec2 {
        let t = self.frame as f32 * 0.02;
        Vec2::new(0.5 + 0.15 * t.sin(), 0.55 + 0.1 * (t * 0.7).cos())
    }
}

impl LandmarkSource for SimSource {
    fn name(&self) -> &str {
        "sim"
    }

    fn open(&mut self) -> Result<(), AcquisitionError> {
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<Sample>, AcquisitionError> {
        let phase = ((self.frame / self.phase_len) % SIM_PHASES.len() as u64) as usize;
        let sample = match SIM_PHASES[phase] {
            Some(shape) => Sample::Hand(pose::synthesize(shape, self.wrist())),
            None => Sample::NoHand,
        };
        self.frame += 1;
        Ok(Some(sample))
    }
}

// ---------------------------------------------------------------------------
// Throttle
// ---------------------------------------------------------------------------

/// Minimum-interval gate between processed frames.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Time left before the next frame may be processed.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            None => Duration::ZERO,
            Some(t) => self.min_interval.saturating_sub(now.saturating_duration_since(t)),
        }
    }

    /// Claim the slot if the interval has passed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if self.remaining(now).is_zero() {
            self.last = Some(now);
            true
        } else {
            false
        }
    }
}

// ---------------------------------------------------------------------------
// Acquisition thread
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum AcquisitionEvent {
    Sample(Sample),
    /// The backend failed; a retry is scheduled.
    Failed(String),
    Recovered,
    /// The source ran dry and will not produce more samples.
    Closed,
}

/// Handle to the running acquisition thread. Dropping it stops the thread.
pub struct Acquisition {
    pub rx: Receiver<AcquisitionEvent>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Acquisition {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                error!("acquisition thread panicked");
            }
        }
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep in short slices so a stop request is noticed quickly.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let slice = Duration::from_millis(5);
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(slice.min(deadline - now));
    }
}

pub fn spawn_acquisition(
    mut source: Box<dyn LandmarkSource>,
    cfg: &AcquisitionConfig,
    stop: Arc<AtomicBool>,
) -> Acquisition {
    let (tx, rx) = mpsc::channel();
    let min_interval = Duration::from_millis(cfg.min_interval_ms);
    let retry = Duration::from_millis(cfg.retry_ms);
    let thread_stop = stop.clone();
    let handle = thread::spawn(move || {
        run_acquisition(source.as_mut(), min_interval, retry, &tx, &thread_stop);
        debug!("acquisition thread for '{}' exiting", source.name());
    });
    Acquisition {
        rx,
        stop,
        handle: Some(handle),
    }
}

fn run_acquisition(
    source: &mut dyn LandmarkSource,
    min_interval: Duration,
    retry: Duration,
    tx: &Sender<AcquisitionEvent>,
    stop: &AtomicBool,
) {
    let mut throttle = Throttle::new(min_interval);
    let mut opened = false;
    let mut failed = false;

    while !stop.load(Ordering::SeqCst) {
        if !opened {
            match source.open() {
                Ok(()) => {
                    opened = true;
                    info!("landmark source '{}' opened", source.name());
                    if failed {
                        failed = false;
                        let _ = tx.send(AcquisitionEvent::Recovered);
                    }
                }
                Err(e) => {
                    error!("{e}; retrying in {retry:?}");
                    failed = true;
                    if tx.send(AcquisitionEvent::Failed(e.to_string())).is_err() {
                        return;
                    }
                    sleep_unless_stopped(retry, stop);
                    continue;
                }
            }
        }

        let wait = throttle.remaining(Instant::now());
        if !wait.is_zero() {
            sleep_unless_stopped(wait, stop);
            continue;
        }

        match source.poll() {
            Ok(Some(sample)) => {
                throttle.try_acquire(Instant::now());
                if tx.send(AcquisitionEvent::Sample(sample)).is_err() {
                    return;
                }
            }
            Ok(None) => sleep_unless_stopped(Duration::from_millis(2), stop),
            Err(AcquisitionError::Closed) => {
                info!("landmark source '{}' closed", source.name());
                let _ = tx.send(AcquisitionEvent::Closed);
                return;
            }
            Err(e) => {
                warn!("landmark source '{}': {e}; reopening", source.name());
                opened = false;
                failed = true;
                if tx.send(AcquisitionEvent::Failed(e.to_string())).is_err() {
                    return;
                }
                sleep_unless_stopped(retry, stop);
            }
        }
    }
}

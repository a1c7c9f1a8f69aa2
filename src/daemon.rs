//! Long-running mode: acquisition thread, fixed-period tick loop, control
//! socket, profile hot reload and signal handling.

use anyhow::Result;
use log::{debug, error, info, warn};
use notify::{Event, RecursiveMode, Watcher};
use serde::Serialize;
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
    },
    thread,
    time::{Duration, Instant},
};

use crate::config::ProfileStore;
use crate::ipc::{ControlServer, runtime};
use crate::landmarks::Sample;
use crate::observer::Observer;
use crate::session::{Session, TickOutput};
use crate::source::{
    Acquisition, AcquisitionEvent, LandmarkSource, ReplaySource, SimSource, spawn_acquisition,
};

/// Ticks each synthetic pose is held for.
const SIM_PHASE_FRAMES: u64 = 90;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    Sim,
    Replay(PathBuf),
}

impl SourceKind {
    pub fn build(&self) -> Box<dyn LandmarkSource> {
        match self {
            SourceKind::Sim => Box::new(SimSource::new(SIM_PHASE_FRAMES)),
            SourceKind::Replay(path) => Box::new(ReplaySource::new(path.clone())),
        }
    }

    pub fn label(&self) -> String {
        match self {
            SourceKind::Sim => "sim".to_string(),
            SourceKind::Replay(path) => format!("replay:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: SourceKind,
    /// Overrides `~/.config/handfield`.
    pub config_dir: Option<PathBuf>,
    /// Overrides `~/.local/run/handfield.sock`.
    pub socket: Option<PathBuf>,
    /// Skip installing SIGINT/SIGTERM handlers.
    pub no_signals: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            source: SourceKind::Sim,
            config_dir: None,
            socket: None,
            no_signals: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum AcquisitionStatus {
    Starting,
    Running,
    Failed(String),
    Closed,
}

/// What the control socket can see of the running daemon.
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub snapshot: Option<TickOutput>,
    pub acquisition: AcquisitionStatus,
    pub active_profile: String,
    pub profiles: Vec<String>,
    pub source: String,
}

pub type SharedStatus = Arc<Mutex<DaemonStatus>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMsg {
    Reload,
    UseProfile(String),
    Shutdown,
}

type SignalThread = (signal_hook::iterator::Handle, thread::JoinHandle<()>);

fn install_signal_handlers(stop: Arc<AtomicBool>) -> Result<SignalThread> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();
    let join = thread::spawn(move || {
        for sig in signals.forever() {
            info!("daemon: received signal {sig}, stopping");
            stop.store(true, Ordering::SeqCst);
        }
    });
    Ok((handle, join))
}

fn watch_profiles(
    store: &ProfileStore,
    tx: Sender<ControlMsg>,
) -> Option<notify::RecommendedWatcher> {
    let handler = move |res: notify::Result<Event>| match res {
        Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
            let _ = tx.send(ControlMsg::Reload);
        }
        Ok(_) => {}
        Err(e) => warn!("profile watch error: {e}"),
    };
    let mut watcher = match notify::recommended_watcher(handler) {
        Ok(w) => w,
        Err(e) => {
            warn!("profile hot reload disabled: {e}");
            return None;
        }
    };
    if let Err(e) = watcher.watch(&store.profiles_dir, RecursiveMode::NonRecursive) {
        warn!(
            "profile hot reload disabled for {}: {e}",
            store.profiles_dir.display()
        );
        return None;
    }
    debug!("watching {} for profile changes", store.profiles_dir.display());
    Some(watcher)
}

fn lock(shared: &SharedStatus) -> std::sync::MutexGuard<'_, DaemonStatus> {
    shared.lock().unwrap_or_else(|p| p.into_inner())
}

pub fn run(opts: RunOptions) -> Result<()> {
    let mut store = match &opts.config_dir {
        Some(dir) => ProfileStore::open_at(dir.clone())?,
        None => ProfileStore::load_or_install_default()?,
    };
    info!("daemon: active profile '{}'", store.active_name);

    let sock = match &opts.socket {
        Some(p) => p.clone(),
        None => runtime::socket_path()?,
    };
    let server = ControlServer::bind(&sock)?;

    let stop = Arc::new(AtomicBool::new(false));
    let signals = if opts.no_signals {
        None
    } else {
        Some(install_signal_handlers(stop.clone())?)
    };

    let shared: SharedStatus = Arc::new(Mutex::new(DaemonStatus {
        snapshot: None,
        acquisition: AcquisitionStatus::Starting,
        active_profile: store.active_name.clone(),
        profiles: store.list_profiles(),
        source: opts.source.label(),
    }));
    let (tx, rx) = mpsc::channel::<ControlMsg>();
    let _watcher = watch_profiles(&store, tx.clone());

    let acq_stop = Arc::new(AtomicBool::new(false));
    let mut acquisition =
        spawn_acquisition(opts.source.build(), &store.profile.acquisition, acq_stop);

    let mut session = Session::new(&store.profile);
    let mut observer = Observer::from_config(&store.profile.observer);
    let started = Instant::now();
    info!(
        "daemon: source '{}', {} objects, tick {} ms",
        opts.source.label(),
        session.field().objects().len(),
        store.profile.runtime.tick_ms
    );

    while !stop.load(Ordering::SeqCst) {
        let tick_start = Instant::now();
        let period = Duration::from_millis(store.profile.runtime.tick_ms);

        let latest = drain_acquisition(&acquisition, &shared);
        let status = lock(&shared).acquisition.clone();
        let input = tick_input(latest, &status);
        let out = session.tick(input.as_ref(), &observer, started.elapsed().as_secs_f32());
        lock(&shared).snapshot = Some(out);

        server.accept_pending(&shared, &tx);
        if handle_control(&rx, &mut store, &mut session, &mut observer, &shared) {
            stop.store(true, Ordering::SeqCst);
        }

        if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    info!("daemon: stopping");
    acquisition.stop();
    if let Some((handle, join)) = signals {
        handle.close();
        if join.join().is_err() {
            error!("signal thread panicked");
        }
    }
    info!("daemon: stopped");
    Ok(())
}

/// Pull every pending acquisition event; return the newest sample, if any.
fn drain_acquisition(acq: &Acquisition, shared: &SharedStatus) -> Option<Sample> {
    let mut latest = None;
    while let Ok(ev) = acq.rx.try_recv() {
        match ev {
            AcquisitionEvent::Sample(s) => {
                latest = Some(s);
                let mut st = lock(shared);
                if st.acquisition != AcquisitionStatus::Running {
                    st.acquisition = AcquisitionStatus::Running;
                }
            }
            AcquisitionEvent::Failed(reason) => {
                lock(shared).acquisition = AcquisitionStatus::Failed(reason);
            }
            AcquisitionEvent::Recovered => {
                info!("acquisition recovered");
                lock(shared).acquisition = AcquisitionStatus::Running;
            }
            AcquisitionEvent::Closed => {
                info!("acquisition closed; treating further ticks as no hand");
                lock(shared).acquisition = AcquisitionStatus::Closed;
            }
        }
    }
    latest
}

/// What the session sees this tick. A dead or finished source counts as
/// "no hand" so the grace period runs out instead of freezing the last state.
fn tick_input(latest: Option<Sample>, status: &AcquisitionStatus) -> Option<Sample> {
    match (latest, status) {
        (Some(sample), _) => Some(sample),
        (None, AcquisitionStatus::Failed(_) | AcquisitionStatus::Closed) => Some(Sample::NoHand),
        (None, AcquisitionStatus::Starting | AcquisitionStatus::Running) => None,
    }
}

/// Apply queued control messages. Returns true when shutdown was requested.
fn handle_control(
    rx: &Receiver<ControlMsg>,
    store: &mut ProfileStore,
    session: &mut Session,
    observer: &mut Observer,
    shared: &SharedStatus,
) -> bool {
    let mut reload = false;
    let mut shutdown = false;
    for msg in rx.try_iter() {
        match msg {
            // bursts of file events collapse into one reload
            ControlMsg::Reload => reload = true,
            ControlMsg::UseProfile(name) => match store.set_active(&name) {
                Ok(()) => {
                    info!("switched active profile to {}", store.active_name);
                    reload = false;
                    apply(store, session, observer, shared);
                }
                Err(e) => error!("use profile failed: {e}"),
            },
            ControlMsg::Shutdown => shutdown = true,
        }
    }
    if reload {
        match store.reload() {
            Ok(()) => {
                info!("profile '{}' reloaded", store.active_name);
                apply(store, session, observer, shared);
            }
            Err(e) => error!("reload failed, keeping last good profile: {e}"),
        }
    }
    shutdown
}

fn apply(
    store: &ProfileStore,
    session: &mut Session,
    observer: &mut Observer,
    shared: &SharedStatus,
) {
    session.apply_profile(&store.profile);
    *observer = Observer::from_config(&store.profile.observer);
    let mut st = lock(shared);
    st.active_profile = store.active_name.clone();
    st.profiles = store.list_profiles();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::ipc::server::client_request_at;
    use crate::landmarks::pose::{self, Shape};
    use glam::Vec2;
    use serde_json::json;
    use std::fs;

    fn temp_dir(tag: &str) -> PathBuf {
        let d = std::env::temp_dir().join(format!("handfield-daemon-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&d);
        fs::create_dir_all(&d).unwrap();
        d
    }

    fn status(acquisition: AcquisitionStatus) -> SharedStatus {
        Arc::new(Mutex::new(DaemonStatus {
            snapshot: None,
            acquisition,
            active_profile: "default".into(),
            profiles: vec![],
            source: "sim".into(),
        }))
    }

    #[test]
    fn acquisition_status_serializes_with_state_tag() {
        let v = serde_json::to_value(AcquisitionStatus::Failed("no camera".into())).unwrap();
        assert_eq!(v, json!({"state": "failed", "reason": "no camera"}));
        let v = serde_json::to_value(AcquisitionStatus::Running).unwrap();
        assert_eq!(v, json!({"state": "running"}));
    }

    #[test]
    fn source_labels() {
        assert_eq!(SourceKind::Sim.label(), "sim");
        assert_eq!(
            SourceKind::Replay(PathBuf::from("hands.jsonl")).label(),
            "replay:hands.jsonl"
        );
    }

    #[test]
    fn bad_profile_edit_keeps_last_good() {
        let dir = temp_dir("reload");
        let mut store = ProfileStore::open_at(dir.clone()).unwrap();
        let mut session = Session::new(&store.profile);
        let mut observer = Observer::from_config(&store.profile.observer);
        let shared = status(AcquisitionStatus::Running);
        let (tx, rx) = mpsc::channel();

        fs::write(dir.join("profiles/default.toml"), "[focus]\ncutoff = -3.0\n").unwrap();
        tx.send(ControlMsg::Reload).unwrap();
        tx.send(ControlMsg::Reload).unwrap();
        assert!(!handle_control(&rx, &mut store, &mut session, &mut observer, &shared));
        assert_eq!(store.profile.focus.cutoff, 12.0);

        fs::write(dir.join("profiles/default.toml"), "[focus]\ncutoff = 20.0\n").unwrap();
        tx.send(ControlMsg::Reload).unwrap();
        tx.send(ControlMsg::Shutdown).unwrap();
        assert!(handle_control(&rx, &mut store, &mut session, &mut observer, &shared));
        assert_eq!(store.profile.focus.cutoff, 20.0);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn use_profile_switches_and_publishes() {
        let dir = temp_dir("use");
        let mut store = ProfileStore::open_at(dir.clone()).unwrap();
        fs::write(
            dir.join("profiles/far.toml"),
            "[observer]\nposition = [0.0, 0.0, 30.0]\n",
        )
        .unwrap();
        let mut session = Session::new(&store.profile);
        let mut observer = Observer::from_config(&store.profile.observer);
        let shared = status(AcquisitionStatus::Running);
        let (tx, rx) = mpsc::channel();

        tx.send(ControlMsg::UseProfile("missing".into())).unwrap();
        tx.send(ControlMsg::UseProfile("far".into())).unwrap();
        handle_control(&rx, &mut store, &mut session, &mut observer, &shared);
        assert_eq!(store.active_name, "far");
        assert_eq!(observer.position.z, 30.0);
        let st = lock(&shared);
        assert_eq!(st.active_profile, "far");
        assert_eq!(st.profiles, vec!["default".to_string(), "far".to_string()]);
        drop(st);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn lost_source_releases_a_held_pinch() {
        let mut session = Session::new(&Profile::default());
        let obs = Observer::from_config(&Profile::default().observer);
        let pinch = Sample::Hand(pose::synthesize(Shape::Pinch, Vec2::splat(0.5)));
        let mut t = 0.0;
        for _ in 0..10 {
            session.tick(Some(&pinch), &obs, t);
            t += 0.016;
        }
        assert!(session.gesture().is_pinching);

        // still starting or running: nothing new means hold
        assert_eq!(tick_input(None, &AcquisitionStatus::Running), None);
        let out = session.tick(tick_input(None, &AcquisitionStatus::Running).as_ref(), &obs, t);
        assert!(out.gesture.is_pinching);

        for status in [AcquisitionStatus::Closed, AcquisitionStatus::Failed("gone".into())] {
            assert_eq!(tick_input(None, &status), Some(Sample::NoHand));
        }
        let mut last = None;
        for _ in 0..40 {
            t += 0.016;
            let input = tick_input(None, &AcquisitionStatus::Closed);
            last = Some(session.tick(input.as_ref(), &obs, t));
        }
        let out = last.unwrap();
        assert!(!out.gesture.has_hand);
        assert!(!out.gesture.is_pinching);
        assert!(!out.focus.selected);
    }

    #[test]
    fn finished_replay_resolves_to_no_hand() {
        let dir = temp_dir("eof");
        let sock = dir.join("ctl.sock");
        let rec = dir.join("pinch.jsonl");
        let pinch = Sample::Hand(pose::synthesize(Shape::Pinch, Vec2::splat(0.5)));
        let lines: String = (0..8).map(|_| pinch.to_json_line() + "\n").collect();
        fs::write(&rec, lines).unwrap();
        let opts = RunOptions {
            source: SourceKind::Replay(rec),
            config_dir: Some(dir.clone()),
            socket: Some(sock.clone()),
            no_signals: true,
        };
        let daemon = thread::spawn(move || run(opts));

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut saw_pinch = false;
        let status = loop {
            assert!(Instant::now() < deadline, "gesture never released");
            if let Ok(r) = client_request_at(&sock, json!({"op": "status"})) {
                let d = &r["data"];
                saw_pinch |= d["gesture"]["is_pinching"] == true;
                if d["acquisition"]["state"] == "closed" && d["gesture"]["has_hand"] == false {
                    break r;
                }
            }
            thread::sleep(Duration::from_millis(10));
        };
        assert!(saw_pinch);
        assert_eq!(status["data"]["focus"]["selected"], false);

        client_request_at(&sock, json!({"op": "shutdown"})).unwrap();
        daemon.join().unwrap().unwrap();
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn daemon_serves_snapshots_and_shuts_down() {
        let dir = temp_dir("run");
        let sock = dir.join("ctl.sock");
        let opts = RunOptions {
            source: SourceKind::Sim,
            config_dir: Some(dir.clone()),
            socket: Some(sock.clone()),
            no_signals: true,
        };
        let daemon = thread::spawn(move || run(opts));

        let deadline = Instant::now() + Duration::from_secs(10);
        let snapshot = loop {
            assert!(Instant::now() < deadline, "daemon never produced a snapshot");
            if let Ok(r) = client_request_at(&sock, json!({"op": "snapshot"})) {
                if r["ok"] == true {
                    break r;
                }
            }
            thread::sleep(Duration::from_millis(20));
        };
        assert_eq!(snapshot["data"]["transforms"].as_array().unwrap().len(), 160);

        let r = client_request_at(&sock, json!({"op": "status"})).unwrap();
        assert_eq!(r["data"]["source"], "sim");

        let r = client_request_at(&sock, json!({"op": "shutdown"})).unwrap();
        assert_eq!(r["ok"], true);
        daemon.join().unwrap().unwrap();
        assert!(!sock.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}

use serde_json::{Value, json};
use std::sync::mpsc::Sender;

use crate::daemon::{ControlMsg, SharedStatus};

fn ok(data: Value) -> Value {
    json!({"ok": true, "data": data})
}

fn fail(msg: impl Into<String>) -> Value {
    json!({"ok": false, "error": msg.into()})
}

/// Answer one control request. Queries read the shared status; commands are
/// forwarded to the tick loop, which owns the profile and session.
pub fn handle_request(req: &Value, shared: &SharedStatus, tx: &Sender<ControlMsg>) -> Value {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");
    let st = shared.lock().unwrap_or_else(|p| p.into_inner());

    match op {
        "status" => {
            let (tick, gesture, mode, focus) = match &st.snapshot {
                Some(s) => (
                    json!(s.tick),
                    json!(s.gesture),
                    json!(s.mode),
                    json!(s.focus),
                ),
                None => (Value::Null, Value::Null, Value::Null, Value::Null),
            };
            ok(json!({
                "active_profile": st.active_profile,
                "source": st.source,
                "acquisition": st.acquisition,
                "pid": std::process::id(),
                "tick": tick,
                "gesture": gesture,
                "mode": mode,
                "focus": focus,
            }))
        }
        "snapshot" => match &st.snapshot {
            Some(s) => ok(json!(s)),
            None => fail("no tick has run yet"),
        },
        "list" => ok(json!({"profiles": st.profiles, "active": st.active_profile})),
        "reload" => match tx.send(ControlMsg::Reload) {
            Ok(()) => ok(json!({"active_profile": st.active_profile})),
            Err(_) => fail("daemon is shutting down"),
        },
        "use" => {
            let name = req.get("profile").and_then(|v| v.as_str()).unwrap_or("");
            if name.trim().is_empty() {
                return fail("missing 'profile'");
            }
            match tx.send(ControlMsg::UseProfile(name.to_string())) {
                Ok(()) => ok(json!({"requested_profile": name})),
                Err(_) => fail("daemon is shutting down"),
            }
        }
        "shutdown" => {
            let _ = tx.send(ControlMsg::Shutdown);
            ok(json!("shutting down"))
        }
        _ => fail(format!("unknown op: {op}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::daemon::{AcquisitionStatus, DaemonStatus};
    use crate::observer::Observer;
    use crate::session::Session;
    use glam::Vec3;
    use std::sync::{Arc, Mutex, mpsc};

    fn shared() -> SharedStatus {
        Arc::new(Mutex::new(DaemonStatus {
            snapshot: None,
            acquisition: AcquisitionStatus::Starting,
            active_profile: "default".into(),
            profiles: vec!["default".into(), "wide".into()],
            source: "sim".into(),
        }))
    }

    #[test]
    fn status_before_first_tick() {
        let (tx, _rx) = mpsc::channel();
        let r = handle_request(&json!({"op": "status"}), &shared(), &tx);
        assert_eq!(r["ok"], true);
        assert_eq!(r["data"]["active_profile"], "default");
        assert_eq!(r["data"]["acquisition"]["state"], "starting");
        assert!(r["data"]["gesture"].is_null());
    }

    #[test]
    fn snapshot_after_tick() {
        let (tx, _rx) = mpsc::channel();
        let st = shared();
        let mut session = Session::new(&Profile::default());
        let obs = Observer::looking_at(Vec3::new(0.0, 0.0, 14.0), Vec3::ZERO);
        st.lock().unwrap().snapshot = Some(session.tick(None, &obs, 0.0));
        let r = handle_request(&json!({"op": "snapshot"}), &st, &tx);
        assert_eq!(r["ok"], true);
        assert_eq!(r["data"]["mode"], "compact");
        assert_eq!(r["data"]["stable"], "neutral");
        assert_eq!(r["data"]["gesture"]["pinch_amount"], 1.0);
    }

    #[test]
    fn commands_are_forwarded() {
        let (tx, rx) = mpsc::channel();
        let st = shared();
        handle_request(&json!({"op": "use", "profile": "wide"}), &st, &tx);
        handle_request(&json!({"op": "reload"}), &st, &tx);
        handle_request(&json!({"op": "shutdown"}), &st, &tx);
        let msgs: Vec<ControlMsg> = rx.try_iter().collect();
        assert_eq!(
            msgs,
            vec![
                ControlMsg::UseProfile("wide".into()),
                ControlMsg::Reload,
                ControlMsg::Shutdown
            ]
        );
    }

    #[test]
    fn unknown_op_and_missing_profile_fail() {
        let (tx, _rx) = mpsc::channel();
        let st = shared();
        assert_eq!(handle_request(&json!({"op": "dance"}), &st, &tx)["ok"], false);
        assert_eq!(handle_request(&json!({"op": "use"}), &st, &tx)["ok"], false);
    }
}

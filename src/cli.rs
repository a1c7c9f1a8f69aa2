use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{
    env,
    fs::File,
    io::{self, BufReader},
    path::PathBuf,
    process::Command,
};

use crate::config::ProfileStore;
use crate::daemon::{self, RunOptions, SourceKind};
use crate::ipc;
use crate::replay::{self, ReplayOptions};

fn source_from(sim: bool, replay: Option<PathBuf>) -> Result<SourceKind> {
    match (sim, replay) {
        (true, Some(_)) => Err(anyhow!("--sim and --replay are mutually exclusive")),
        (_, Some(path)) => Ok(SourceKind::Replay(path)),
        _ => Ok(SourceKind::Sim),
    }
}

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Flags first; free args are read afterwards.
    let daemon_mode = pargs.contains("--daemon");
    let help = pargs.contains("-h") || pargs.contains("--help");
    let sim = pargs.contains("--sim");
    let replay_path: Option<PathBuf> = pargs.opt_value_from_str("--replay")?;
    let every: Option<usize> = pargs.opt_value_from_str("--every")?;
    let with_transforms = pargs.contains("--transforms");

    // Hidden daemon mode (spawned by `start`)
    if daemon_mode {
        return daemon::run(RunOptions {
            source: source_from(sim, replay_path)?,
            ..RunOptions::default()
        });
    }

    if env::args().len() == 1 || help {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("start") => {
            let exe = std::env::current_exe()?;
            let mut cmd = Command::new(exe);
            cmd.arg("--daemon");
            if let Some(p) = &replay_path {
                cmd.arg("--replay").arg(p);
            }
            let child = cmd.spawn()?;
            println!("handfield: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("run") => daemon::run(RunOptions {
            source: source_from(sim, replay_path)?,
            ..RunOptions::default()
        }),

        Some("stop") => request(serde_json::json!({"op":"shutdown"})),
        Some("status") => request(serde_json::json!({"op":"status"})),
        Some("snapshot") => request(serde_json::json!({"op":"snapshot"})),
        Some("reload") => request(serde_json::json!({"op":"reload"})),
        Some("list") => request(serde_json::json!({"op":"list"})),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handfield use <profile_name>"))?;
            request(serde_json::json!({"op":"use","profile":name}))
        }

        Some("replay") => {
            let path: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handfield replay <file|-> [--every N]"))?;
            let store = ProfileStore::load_or_install_default()?;
            let opts = ReplayOptions {
                every: every.unwrap_or(1),
                transforms: with_transforms,
            };
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if path.as_os_str() == "-" {
                replay::run(&store.profile, io::stdin().lock(), &mut out, opts)?;
            } else {
                let f = File::open(&path)
                    .map_err(|e| anyhow!("cannot open {}: {e}", path.display()))?;
                replay::run(&store.profile, BufReader::new(f), &mut out, opts)?;
            }
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn request(req: serde_json::Value) -> Result<()> {
    let r = ipc::client_request(req)?;
    print_response(&r);
    Ok(())
}

fn print_help() {
    println!(
        r#"handfield - hand-gesture driven object field

USAGE:
  handfield help [command]                 Show general or command-specific help
  handfield start [--replay <file>]        Start the daemon in the background
  handfield run [--sim|--replay <file>]    Run the daemon in the foreground
  handfield stop                           Stop the daemon
  handfield status                         Show gesture, mode, focus and source state
  handfield snapshot                       Dump the latest tick, transforms included
  handfield reload                         Reload active profile
  handfield use <name>                     Switch active profile
  handfield list                           List profiles
  handfield replay <file|-> [--every N]    Run recorded landmarks offline

TIPS:
  - Profiles: ~/.config/handfield/profiles (edits are picked up live)
  - Active profile pointer: ~/.config/handfield/active
  - Landmark lines: a JSON array of 21 [x, y, z] points, or null for no hand
  - RUST_LOG=debug shows focus changes and source activity
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!(
            "usage: handfield start [--replay <file>]\nStarts the background daemon (synthetic hand unless --replay)."
        ),
        "run" => println!(
            "usage: handfield run [--sim|--replay <file>]\nRuns the daemon in the foreground until Ctrl-C or `handfield stop`."
        ),
        "stop" => println!("usage: handfield stop\nStops the running daemon."),
        "status" => println!(
            "usage: handfield status\nShows active profile, source, acquisition state, gesture, mode, focus, PID."
        ),
        "snapshot" => println!(
            "usage: handfield snapshot\nPrints the most recent tick including every object transform."
        ),
        "reload" => println!(
            "usage: handfield reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handfield use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handfield list\nLists available profiles and the active one."),
        "replay" => println!(
            "usage: handfield replay <file|-> [--every N] [--transforms]\nFeeds one landmark line per tick through a fresh session and prints JSON per tick."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_selection() {
        assert_eq!(source_from(false, None).unwrap(), SourceKind::Sim);
        assert_eq!(source_from(true, None).unwrap(), SourceKind::Sim);
        assert_eq!(
            source_from(false, Some(PathBuf::from("a.jsonl"))).unwrap(),
            SourceKind::Replay(PathBuf::from("a.jsonl"))
        );
        assert!(source_from(true, Some(PathBuf::from("a.jsonl"))).is_err());
    }
}

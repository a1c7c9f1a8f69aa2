use anyhow::{Result, anyhow};
use log::{error, info, warn};
use serde_json::Value;
use std::{
    io::{self, BufRead, BufReader, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::mpsc::Sender,
    thread,
};

use super::dispatch::handle_request;
use crate::daemon::{ControlMsg, SharedStatus};

/// Nonblocking control listener. The socket file is removed on drop.
pub struct ControlServer {
    listener: UnixListener,
    path: PathBuf,
}

impl ControlServer {
    pub fn bind(path: &Path) -> Result<Self> {
        if path.exists() {
            if UnixStream::connect(path).is_ok() {
                return Err(anyhow!(
                    "another daemon is already listening on {}",
                    path.display()
                ));
            }
            let _ = std::fs::remove_file(path);
        }
        let listener = UnixListener::bind(path)?;
        listener.set_nonblocking(true)?;
        info!("daemon: listening on {}", path.display());
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Accept every waiting client, each served on its own thread.
    pub fn accept_pending(&self, shared: &SharedStatus, tx: &Sender<ControlMsg>) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    let shared = shared.clone();
                    let tx = tx.clone();
                    thread::spawn(move || {
                        if let Err(e) = handle_client(stream, &shared, &tx) {
                            error!("ipc client error: {e}");
                        }
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) => {
                    warn!("ipc accept failed: {e}");
                    return;
                }
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn handle_client(
    mut stream: UnixStream,
    shared: &SharedStatus,
    tx: &Sender<ControlMsg>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let resp = match serde_json::from_str::<Value>(&line) {
        Ok(req) => handle_request(&req, shared, tx),
        Err(e) => serde_json::json!({"ok": false, "error": format!("bad request: {e}")}),
    };
    writeln!(stream, "{resp}")?;
    Ok(())
}

pub fn client_request(req: Value) -> Result<Value> {
    client_request_at(&super::runtime::socket_path()?, req)
}

pub fn client_request_at(sock: &Path, req: Value) -> Result<Value> {
    if !sock.exists() {
        return Err(anyhow!(
            "handfield daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(sock)?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: Value = serde_json::from_str(&resp)?;
    Ok(v)
}
